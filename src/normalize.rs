//! Realtime result normalizer.
//!
//! Incoming per-point result documents arrive in an open-ended set of
//! upstream schemas: versioned status strings, structured or string-encoded
//! locations, and detection payloads under several legacy field names. This
//! module collapses all of them into the canonical `ScanPoint` model. One
//! malformed document must never abort the subscription, so every field
//! falls back to a safe default and logs instead of erroring.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::geo::LatLng;
use crate::metrics;
use crate::provider::DocChange;
use crate::state::{AiResult, DetectedObject, ScanPoint, ScanStatus, SpatialInfo};

lazy_static! {
    /// Decimal degrees with an optional trailing cardinal suffix,
    /// e.g. "49.2827 N" or "-122.88".
    static ref COORD_PART: Regex =
        Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*°?\s*([NSEWnsew])?\s*$").unwrap();
}

/// Collapse the upstream status vocabulary into the four canonical statuses:
/// exact match on terminal states, substring match on any in-progress
/// variant ("analyzing-v2" etc.), default Ready for anything unrecognized.
pub fn map_status(raw: Option<&str>) -> ScanStatus {
    match raw {
        Some("done") | Some("completed") => ScanStatus::Done,
        Some("error") | Some("failed") => ScanStatus::Error,
        Some(s) if s.contains("analyzing") => ScanStatus::Analyzing,
        _ => ScanStatus::Ready,
    }
}

/// Best-effort location parsing. Accepts a structured `{lat,lng}` /
/// `{latitude,longitude}` pair or a formatted degree string with cardinal
/// suffixes ("[49.2827 N, 122.8890 W]"). Malformed input falls back to
/// (0,0) with a warning; location is metadata, not safety-critical.
pub fn parse_location(value: Option<&Value>) -> LatLng {
    match value {
        Some(Value::Object(map)) => {
            let lat = map
                .get("lat")
                .or_else(|| map.get("latitude"))
                .and_then(coerce_f64);
            let lng = map
                .get("lng")
                .or_else(|| map.get("longitude"))
                .and_then(coerce_f64);
            match (lat, lng) {
                (Some(lat), Some(lng)) => LatLng::new(lat, lng),
                _ => location_fallback(value),
            }
        }
        Some(Value::String(s)) => parse_location_string(s).unwrap_or_else(|| location_fallback(value)),
        _ => location_fallback(value),
    }
}

fn location_fallback(value: Option<&Value>) -> LatLng {
    metrics::SCHEMA_ANOMALIES.inc();
    tracing::warn!("Unparseable location in result document: {:?}", value);
    LatLng::new(0.0, 0.0)
}

fn parse_location_string(s: &str) -> Option<LatLng> {
    let stripped = s.trim().trim_start_matches(['[', '(']).trim_end_matches([']', ')']);
    let mut parts = stripped.split(',');
    let lat = signed_coord(parts.next()?, 'S')?;
    let lng = signed_coord(parts.next()?, 'W')?;
    if parts.next().is_some() {
        return None;
    }
    Some(LatLng::new(lat, lng))
}

/// Parse one coordinate component, mapping the trailing cardinal letter to
/// sign (`negative_suffix` is S for latitude, W for longitude).
fn signed_coord(part: &str, negative_suffix: char) -> Option<f64> {
    let caps = COORD_PART.captures(part)?;
    let magnitude: f64 = caps.get(1)?.as_str().parse().ok()?;
    let suffix = caps
        .get(2)
        .and_then(|m| m.as_str().chars().next())
        .map(|c| c.to_ascii_uppercase());
    match suffix {
        Some(c) if c == negative_suffix => Some(-magnitude),
        _ => Some(magnitude),
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

/// The known legacy detection payload shapes. Structural field presence is
/// validated before reading; anything else falls through to Empty.
#[derive(Debug)]
enum ResultShape<'a> {
    /// Current schema: a nested list of detected objects.
    ObjectList(&'a Vec<Value>),
    /// Legacy pole-survey schema: a flat "poles" list.
    PoleList(&'a Vec<Value>),
    /// Oldest schema: a boolean "found" flag with separate keyword and
    /// confidence fields, no object list.
    FoundFlag {
        found: bool,
        keyword: Option<&'a str>,
        confidence: Option<f64>,
    },
    Empty,
}

fn classify(ai: &Value) -> ResultShape<'_> {
    if let Some(list) = ai
        .get("detected_objects")
        .or_else(|| ai.get("objects"))
        .and_then(Value::as_array)
    {
        return ResultShape::ObjectList(list);
    }
    if let Some(list) = ai.get("poles").and_then(Value::as_array) {
        return ResultShape::PoleList(list);
    }
    if let Some(found) = ai.get("found") {
        return ResultShape::FoundFlag {
            found: coerce_bool(found),
            keyword: ai.get("keyword").and_then(Value::as_str),
            confidence: ai.get("confidence").and_then(coerce_f64),
        };
    }
    ResultShape::Empty
}

/// Lenient per-object conversion. Missing ids are synthesized
/// deterministically from the pano id and list position so that normalizing
/// the same document twice yields an identical canonical point.
fn parse_object(value: &Value, pano_id: &str, idx: usize) -> DetectedObject {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-obj-{}", pano_id, idx));

    let label = value
        .get("label")
        .or_else(|| value.get("keyword"))
        .and_then(Value::as_str)
        .unwrap_or("object")
        .to_string();

    let confidence = value
        .get("confidence")
        .and_then(coerce_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let description = value
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let spatial = value.get("spatial").and_then(|s| {
        let heading = s.get("heading").and_then(coerce_f64)?;
        let distance = s.get("distance").and_then(coerce_f64).unwrap_or(0.0);
        let location = s.get("location").map(|loc| parse_location(Some(loc)));
        Some(SpatialInfo { heading, distance, location })
    });

    DetectedObject {
        id,
        label,
        confidence,
        description,
        spatial,
    }
}

/// Convert whichever legacy shape is present into the canonical detection
/// list. A bare found-flag with no object list synthesizes one placeholder
/// object so downstream code never special-cases "found but no objects".
fn normalize_detections(ai: &Value, pano_id: &str) -> Vec<DetectedObject> {
    match classify(ai) {
        ResultShape::ObjectList(list) | ResultShape::PoleList(list) => list
            .iter()
            .enumerate()
            .map(|(idx, v)| parse_object(v, pano_id, idx))
            .collect(),
        ResultShape::FoundFlag { found: true, keyword, confidence } => {
            vec![DetectedObject {
                id: format!("{}-match-0", pano_id),
                label: keyword.unwrap_or("match").to_string(),
                confidence: confidence.unwrap_or(1.0).clamp(0.0, 1.0),
                description: None,
                spatial: None,
            }]
        }
        ResultShape::FoundFlag { found: false, .. } | ResultShape::Empty => Vec::new(),
    }
}

/// Normalize one incremental result document into a canonical `ScanPoint`.
/// Returns None only when no panorama identifier can be recovered at all.
pub fn normalize_document(change: &DocChange) -> Option<ScanPoint> {
    let data = &change.data;

    let pano_id = data
        .get("panoId")
        .or_else(|| data.get("pano_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            if change.document_id.is_empty() {
                None
            } else {
                Some(change.document_id.clone())
            }
        })?;

    let status = map_status(data.get("status").and_then(Value::as_str));
    let location = parse_location(data.get("location"));
    let heading = data.get("heading").and_then(coerce_f64).unwrap_or(0.0);
    let error = data
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string);

    let ai_raw = data
        .get("aiResult")
        .or_else(|| data.get("aiResultRaw"))
        .or_else(|| data.get("ai_result"));

    let ai_result = match ai_raw {
        Some(ai) => {
            let objects = normalize_detections(ai, &pano_id);
            let summary = ai
                .get("summary")
                .or_else(|| ai.get("description"))
                .and_then(Value::as_str)
                .map(str::to_string);
            // total_count is always re-derived from the list; upstream count
            // fields are not trusted.
            AiResult::with_objects(summary, objects)
        }
        None => AiResult::default(),
    };

    metrics::DOCS_NORMALIZED.inc();

    Some(ScanPoint {
        pano_id,
        status,
        location,
        heading,
        ai_result,
        error,
    })
}

/// Merge a normalized document into the existing point. Terminal statuses
/// never regress: if the upstream re-emits an earlier status after Done or
/// Error, the terminal status wins and the anomaly is counted, while the
/// payload fields still update.
pub fn merge_point(existing: Option<&ScanPoint>, mut incoming: ScanPoint) -> ScanPoint {
    if let Some(existing) = existing {
        if existing.status.is_terminal() && !incoming.status.is_terminal() {
            metrics::STATUS_REGRESSIONS.inc();
            tracing::warn!(
                "Ignoring status regression for {}: {:?} after {:?}",
                incoming.pano_id,
                incoming.status,
                existing.status
            );
            incoming.status = existing.status;
        }
    }
    incoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChangeType;
    use serde_json::json;

    fn change(data: Value) -> DocChange {
        DocChange {
            document_id: "doc-1".to_string(),
            data,
            change_type: ChangeType::Modified,
        }
    }

    #[test]
    fn status_mapping_covers_versioned_variants() {
        assert_eq!(map_status(Some("done")), ScanStatus::Done);
        assert_eq!(map_status(Some("completed")), ScanStatus::Done);
        assert_eq!(map_status(Some("error")), ScanStatus::Error);
        assert_eq!(map_status(Some("failed")), ScanStatus::Error);
        assert_eq!(map_status(Some("analyzing")), ScanStatus::Analyzing);
        assert_eq!(map_status(Some("analyzing-v2")), ScanStatus::Analyzing);
        assert_eq!(map_status(Some("re-analyzing")), ScanStatus::Analyzing);
        assert_eq!(map_status(Some("queued")), ScanStatus::Ready);
        assert_eq!(map_status(None), ScanStatus::Ready);
    }

    #[test]
    fn location_parses_cardinal_suffix_string() {
        let loc = parse_location(Some(&json!("[49.2827 N, 122.8890 W]")));
        assert_eq!(loc, LatLng::new(49.2827, -122.8890));

        let loc = parse_location(Some(&json!("1.35 S, 103.82 E")));
        assert_eq!(loc, LatLng::new(-1.35, 103.82));
    }

    #[test]
    fn location_parses_structured_pairs() {
        let loc = parse_location(Some(&json!({"latitude": 1.5, "longitude": 2.5})));
        assert_eq!(loc, LatLng::new(1.5, 2.5));

        let loc = parse_location(Some(&json!({"lat": -3.0, "lng": "4.25"})));
        assert_eq!(loc, LatLng::new(-3.0, 4.25));
    }

    #[test]
    fn malformed_location_falls_back_to_origin() {
        assert_eq!(parse_location(None), LatLng::new(0.0, 0.0));
        assert_eq!(parse_location(Some(&Value::Null)), LatLng::new(0.0, 0.0));
        assert_eq!(parse_location(Some(&json!("not a place"))), LatLng::new(0.0, 0.0));
        assert_eq!(parse_location(Some(&json!({"lat": 1.0}))), LatLng::new(0.0, 0.0));
    }

    #[test]
    fn object_list_shape_normalizes() {
        let doc = change(json!({
            "panoId": "p1",
            "status": "done",
            "location": {"latitude": 1.0, "longitude": 2.0},
            "heading": 45,
            "aiResult": {
                "summary": "two hydrants",
                "detected_objects": [
                    {"id": "a", "label": "hydrant", "confidence": 0.92,
                     "spatial": {"heading": 120, "distance": 8.5}},
                    {"label": "hydrant", "confidence": 1.7}
                ],
                "total_count": 99
            }
        }));

        let point = normalize_document(&doc).unwrap();
        assert_eq!(point.status, ScanStatus::Done);
        assert_eq!(point.heading, 45.0);
        assert_eq!(point.ai_result.summary.as_deref(), Some("two hydrants"));
        assert_eq!(point.ai_result.detected_objects.len(), 2);
        // Count reconciled against the list, never the upstream field
        assert_eq!(point.ai_result.total_count, 2);
        // Confidence clamped, missing id synthesized deterministically
        assert_eq!(point.ai_result.detected_objects[1].confidence, 1.0);
        assert_eq!(point.ai_result.detected_objects[1].id, "p1-obj-1");
        let spatial = point.ai_result.detected_objects[0].spatial.as_ref().unwrap();
        assert_eq!(spatial.heading, 120.0);
        assert_eq!(spatial.distance, 8.5);
    }

    #[test]
    fn legacy_pole_list_shape_normalizes() {
        let doc = change(json!({
            "panoId": "p1",
            "status": "done",
            "aiResultRaw": {
                "description": "one pole visible",
                "poles": [{"label": "utility pole", "confidence": 0.6}]
            }
        }));

        let point = normalize_document(&doc).unwrap();
        assert_eq!(point.ai_result.detected_objects.len(), 1);
        assert_eq!(point.ai_result.detected_objects[0].label, "utility pole");
        assert_eq!(point.ai_result.summary.as_deref(), Some("one pole visible"));
    }

    #[test]
    fn found_flag_synthesizes_placeholder_object() {
        let doc = change(json!({
            "panoId": "p1",
            "status": "done",
            "aiResult": {"found": "true", "keyword": "mural", "confidence": 0.8}
        }));

        let point = normalize_document(&doc).unwrap();
        assert_eq!(point.ai_result.detected_objects.len(), 1);
        assert_eq!(point.ai_result.total_count, 1);
        assert_eq!(point.ai_result.detected_objects[0].label, "mural");
        assert_eq!(point.ai_result.detected_objects[0].confidence, 0.8);

        let not_found = change(json!({
            "panoId": "p1",
            "status": "done",
            "aiResult": {"found": false}
        }));
        let point = normalize_document(&not_found).unwrap();
        assert!(point.ai_result.detected_objects.is_empty());
        assert_eq!(point.ai_result.total_count, 0);
    }

    #[test]
    fn normalization_is_idempotent() {
        let data = json!({
            "panoId": "p1",
            "status": "done",
            "location": "[49.24 N, 122.88 W]",
            "aiResult": {
                "found": true,
                "detected_objects": [{"label": "sign", "confidence": 0.5}]
            }
        });
        let first = normalize_document(&change(data.clone())).unwrap();
        let second = normalize_document(&change(data)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn pano_id_falls_back_to_document_id() {
        let doc = change(json!({"status": "analyzing-v3"}));
        let point = normalize_document(&doc).unwrap();
        assert_eq!(point.pano_id, "doc-1");
        assert_eq!(point.status, ScanStatus::Analyzing);
        assert_eq!(point.location, LatLng::new(0.0, 0.0));
    }

    #[test]
    fn merge_refuses_terminal_regression() {
        let done = normalize_document(&change(json!({
            "panoId": "p1", "status": "done",
            "aiResult": {"detected_objects": [{"label": "sign", "confidence": 0.5}]}
        })))
        .unwrap();

        let stale = normalize_document(&change(json!({
            "panoId": "p1", "status": "analyzing"
        })))
        .unwrap();

        let merged = merge_point(Some(&done), stale);
        assert_eq!(merged.status, ScanStatus::Done);

        // Terminal-to-terminal transitions still apply
        let errored = normalize_document(&change(json!({
            "panoId": "p1", "status": "failed", "error": "pipeline crash"
        })))
        .unwrap();
        let merged = merge_point(Some(&done), errored);
        assert_eq!(merged.status, ScanStatus::Error);
        assert_eq!(merged.error.as_deref(), Some("pipeline crash"));
    }
}
