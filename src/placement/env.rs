use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::placement::Policy;

/// Indices of the per-agent feature vector that carry overlap measurements.
pub const OVERLAP_FEATURES: Range<usize> = 8..15;

/// Environment settings shared by every run of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Reward weight of the agent's own wirelength term.
    pub w: f64,
    /// Reward weight of the board HPWL term.
    pub hpwl: f64,
    /// Reward weight of the overlap term.
    pub o: f64,
    /// Steps per training episode.
    pub max_steps: u32,
    pub shuffle_training_idxs: bool,
    pub shuffle_evaluation_idxs: bool,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        EnvironmentSettings {
            w: 1.0,
            hpwl: 1.0,
            o: 1.0,
            max_steps: 200,
            shuffle_training_idxs: false,
            shuffle_evaluation_idxs: false,
        }
    }
}

/// Parameters for constructing one environment instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentParams {
    pub board: Option<PathBuf>,
    pub seed: u64,
    pub expl_noise: f64,
    /// Disable exploration noise on policy actions.
    pub deterministic: bool,
    pub max_steps: u32,
    pub w: f64,
    pub hpwl: f64,
    pub o: f64,
    pub shuffle_idxs: bool,
    pub log_dir: PathBuf,
}

impl EnvironmentParams {
    pub fn entries(&self) -> Vec<(String, String)> {
        vec![
            (
                "pcb_file".into(),
                self.board
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "None".into()),
            ),
            ("agent_expl_noise".into(), self.expl_noise.to_string()),
            ("deterministic".into(), self.deterministic.to_string()),
            ("max_steps".into(), self.max_steps.to_string()),
            ("w".into(), self.w.to_string()),
            ("o".into(), self.o.to_string()),
            ("hpwl".into(), self.hpwl.to_string()),
            ("seed".into(), self.seed.to_string()),
            ("log_dir".into(), self.log_dir.display().to_string()),
            ("shuffle_idxs".into(), self.shuffle_idxs.to_string()),
        ]
    }
}

/// What one agent reports after an environment step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentStep {
    pub observation: Vec<f64>,
    pub features: Vec<f64>,
    pub reward: f64,
    pub info: BTreeMap<String, f64>,
    pub done: bool,
}

impl AgentStep {
    /// Largest overlap feature of this agent; 0 means no overlap.
    pub fn overlap(&self) -> f64 {
        let end = OVERLAP_FEATURES.end.min(self.features.len());
        let start = OVERLAP_FEATURES.start.min(end);
        self.features[start..end]
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }
}

/// Cross-agent mean of one step's rewards; 0 when no agent reported.
pub fn mean_reward(steps: &[AgentStep]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }
    steps.iter().map(|s| s.reward).sum::<f64>() / steps.len() as f64
}

/// Records an episode for snapshots, videos and run logs.
pub trait Tracker {
    fn capture_snapshot(&mut self, path: &Path) -> Result<(), BackendError>;
    fn create_video(&mut self, path: &Path) -> Result<(), BackendError>;
    fn log_run_to_file(&mut self, dir: &Path, filename: &str, board: &str)
        -> Result<(), BackendError>;
    fn reset(&mut self);
}

/// A multi-agent component placement environment.
pub trait PlacementEnv {
    fn reset(&mut self) -> Result<(), BackendError>;

    /// Advance every agent by one step. One entry per agent.
    /// When `random` is set actions are sampled instead of taken from `policy`.
    fn step(&mut self, policy: &dyn Policy, random: bool) -> Result<Vec<AgentStep>, BackendError>;

    /// Half-perimeter wirelength of the current layout.
    fn calc_hpwl(&self) -> f64;

    fn tracker(&mut self) -> &mut dyn Tracker;

    fn write_current_board(&self, dir: &Path, filename: &str) -> Result<(), BackendError>;

    /// Replace each sub-placement's original node positions with the best
    /// positions found so far.
    fn commit_optimal_positions(&mut self);

    fn write_board(&self, dir: &Path, filename: &str) -> Result<(), BackendError>;

    /// Serialized board used in tracker run logs.
    fn board_representation(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_with_features(features: Vec<f64>) -> AgentStep {
        AgentStep {
            features,
            ..Default::default()
        }
    }

    #[test]
    fn test_overlap_uses_overlap_feature_slice() {
        let mut features = vec![9.0; 16];
        for f in &mut features[8..15] {
            *f = 0.0;
        }
        features[11] = 0.3;
        assert!((step_with_features(features).overlap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_overlap_of_short_feature_vector_is_zero() {
        assert_eq!(step_with_features(vec![1.0, 2.0]).overlap(), 0.0);
        assert_eq!(step_with_features(Vec::new()).overlap(), 0.0);
    }

    #[test]
    fn test_mean_reward_averages_agents() {
        let steps = vec![
            AgentStep {
                reward: 3.0,
                ..Default::default()
            },
            AgentStep {
                reward: -1.0,
                ..Default::default()
            },
        ];
        assert!((mean_reward(&steps) - 1.0).abs() < 1e-12);
        assert_eq!(mean_reward(&[]), 0.0);
    }

    #[test]
    fn test_overlap_of_truncated_overlap_block() {
        let mut features = vec![0.0; 10];
        features[9] = 0.25;
        assert!((step_with_features(features).overlap() - 0.25).abs() < 1e-12);
    }
}
