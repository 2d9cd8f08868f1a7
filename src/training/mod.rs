//! Training run execution: hyperparameters, the learning callback, episode
//! metrics and the per-run description log.

pub mod desc_log;
pub mod hyperparameters;
pub mod metrics;
pub mod monitor;
pub mod trial;

pub use hyperparameters::Hyperparameters;
pub use monitor::TrainingMonitor;
pub use trial::{TrialExecutor, TrialRunner};
