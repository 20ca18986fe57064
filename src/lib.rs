pub mod aggregation;
pub mod categories;
pub mod classifier;
pub mod concentration;
pub mod config;
pub mod error;
pub mod flux;
pub mod infiltration;
pub mod mixing;
pub mod model;
pub mod risk_filter;
pub mod schema;
pub mod tables;

#[cfg(feature = "python")]
mod python;

pub use config::WorkflowSettings;
pub use error::RiskError;
pub use model::{RiskModel, RunOutcome, Stage, StageReport};
