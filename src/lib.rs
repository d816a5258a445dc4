pub mod config;
pub mod error;
pub mod index;
pub mod lockfile;
pub mod model;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod repo;
pub mod report;

pub use config::ScanConfig;
pub use error::ScanError;
pub use model::{CanonicalPackage, PackageRecord, ScanReport, Severity, VulnerabilityFinding};
pub use pipeline::Pipeline;
