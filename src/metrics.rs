use lazy_static::lazy_static;
use prometheus::{IntCounter, IntGauge, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Discovery metrics
    pub static ref PROBES_ISSUED: IntCounter = IntCounter::new(
        "scan_probes_issued_total",
        "Total number of grid probe lookups issued"
    ).unwrap();

    pub static ref LOOKUP_MISSES: IntCounter = IntCounter::new(
        "scan_lookup_misses_total",
        "Total number of probe lookups that found no imagery"
    ).unwrap();

    pub static ref LOOKUP_FAILURES: IntCounter = IntCounter::new(
        "scan_lookup_failures_total",
        "Total number of probe lookups that failed in transport"
    ).unwrap();

    pub static ref PANOS_DISCOVERED: IntCounter = IntCounter::new(
        "scan_panoramas_discovered_total",
        "Total number of unique panoramas discovered"
    ).unwrap();

    pub static ref DEDUP_DROPS: IntCounter = IntCounter::new(
        "scan_dedup_drops_total",
        "Total number of lookup hits dropped as session duplicates"
    ).unwrap();

    pub static ref ACTIVE_REGIONS: IntGauge = IntGauge::new(
        "scan_active_regions",
        "Current number of user-drawn regions"
    ).unwrap();

    // Job metrics
    pub static ref JOBS_SUBMITTED: IntCounter = IntCounter::new(
        "jobs_submitted_total",
        "Total number of analysis jobs submitted"
    ).unwrap();

    pub static ref JOB_SUBMISSION_FAILURES: IntCounter = IntCounter::new(
        "job_submission_failures_total",
        "Total number of rejected job submissions"
    ).unwrap();

    // Normalizer metrics
    pub static ref DOCS_NORMALIZED: IntCounter = IntCounter::new(
        "result_documents_normalized_total",
        "Total number of realtime result documents normalized"
    ).unwrap();

    pub static ref SCHEMA_ANOMALIES: IntCounter = IntCounter::new(
        "result_schema_anomalies_total",
        "Total number of malformed fields defaulted during normalization"
    ).unwrap();

    pub static ref STATUS_REGRESSIONS: IntCounter = IntCounter::new(
        "result_status_regressions_total",
        "Total number of out-of-order status updates ignored after a terminal state"
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY.register(Box::new(PROBES_ISSUED.clone())).unwrap();
    REGISTRY.register(Box::new(LOOKUP_MISSES.clone())).unwrap();
    REGISTRY.register(Box::new(LOOKUP_FAILURES.clone())).unwrap();
    REGISTRY.register(Box::new(PANOS_DISCOVERED.clone())).unwrap();
    REGISTRY.register(Box::new(DEDUP_DROPS.clone())).unwrap();
    REGISTRY.register(Box::new(ACTIVE_REGIONS.clone())).unwrap();

    REGISTRY.register(Box::new(JOBS_SUBMITTED.clone())).unwrap();
    REGISTRY.register(Box::new(JOB_SUBMISSION_FAILURES.clone())).unwrap();

    REGISTRY.register(Box::new(DOCS_NORMALIZED.clone())).unwrap();
    REGISTRY.register(Box::new(SCHEMA_ANOMALIES.clone())).unwrap();
    REGISTRY.register(Box::new(STATUS_REGRESSIONS.clone())).unwrap();

    tracing::info!("Metrics registry initialized with {} collectors", REGISTRY.gather().len());
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
