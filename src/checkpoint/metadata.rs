use serde::{Deserialize, Serialize};

use crate::descriptor::PolicyKind;

/// Sidecar written next to every saved model as `<model stem>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Learning timestep at which the evaluation ran.
    pub timestep: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub policy: PolicyKind,
    /// Mean evaluation reward of the batch that produced this model.
    pub mean_reward: Option<f64>,
    /// True for the run's best-model file.
    pub best: bool,
}
