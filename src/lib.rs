pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod job;
pub mod marker;
pub mod metrics;
pub mod normalize;
pub mod provider;
pub mod region;
pub mod remote;
pub mod retry;
pub mod scanner;
pub mod state;
pub mod streetview;
pub mod sync;

pub use config::Config;
pub use error::ScanError;
pub use geo::{Bounds, GridConfig, LatLng};
pub use job::JobOrchestrator;
pub use marker::MarkerSync;
pub use region::{Region, RegionManager};
pub use scanner::Scanner;
pub use state::{ScanPoint, ScanState, ScanStatus};
pub use sync::ResultSync;
