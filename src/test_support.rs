//! Scripted collaborators shared by unit tests.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::checkpoint::CheckpointMetadata;
use crate::error::BackendError;
use crate::placement::{
    AgentStep, EnvironmentParams, Learner, LearnerSetup, PlacementBackend, PlacementEnv, Policy,
    Tracker, OVERLAP_FEATURES,
};

/// Read the JSON sidecar written next to a saved model.
pub fn load_metadata(model_path: &Path) -> Result<CheckpointMetadata, Box<dyn std::error::Error>> {
    let json = fs::read_to_string(model_path.with_extension("json"))?;
    Ok(serde_json::from_str(&json)?)
}

/// Writes a marker file when saved.
pub struct FixedPolicy;

impl Policy for FixedPolicy {
    fn select_action(&self, _features: &[f64]) -> Vec<f64> {
        vec![0.0, 0.0]
    }

    fn save(&self, path: &Path) -> Result<(), BackendError> {
        fs::write(path, b"weights")?;
        Ok(())
    }
}

/// One scripted environment step.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub hpwl: f64,
    /// `(reward, overlap)` per agent.
    pub agents: Vec<(f64, f64)>,
    pub done: bool,
}

pub fn step(hpwl: f64, agents: &[(f64, f64)], done: bool) -> ScriptStep {
    ScriptStep {
        hpwl,
        agents: agents.to_vec(),
        done,
    }
}

fn agent_step(reward: f64, overlap: f64, done: bool) -> AgentStep {
    let mut features = vec![0.0; 16];
    features[OVERLAP_FEATURES.start] = overlap;
    AgentStep {
        observation: vec![0.0; 4],
        features,
        reward,
        info: Default::default(),
        done,
    }
}

struct FileTracker;

impl Tracker for FileTracker {
    fn capture_snapshot(&mut self, path: &Path) -> Result<(), BackendError> {
        fs::write(path, b"snapshot")?;
        Ok(())
    }

    fn create_video(&mut self, path: &Path) -> Result<(), BackendError> {
        fs::write(path, b"video")?;
        Ok(())
    }

    fn log_run_to_file(
        &mut self,
        dir: &Path,
        filename: &str,
        board: &str,
    ) -> Result<(), BackendError> {
        fs::write(dir.join(filename), board)?;
        Ok(())
    }

    fn reset(&mut self) {}
}

/// Replays the same script on every episode.
pub struct ScriptedEnv {
    script: Vec<ScriptStep>,
    cursor: usize,
    tracker: FileTracker,
    committed: bool,
}

impl PlacementEnv for ScriptedEnv {
    fn reset(&mut self) -> Result<(), BackendError> {
        self.cursor = 0;
        Ok(())
    }

    fn step(&mut self, _policy: &dyn Policy, _random: bool) -> Result<Vec<AgentStep>, BackendError> {
        let step = self
            .script
            .get(self.cursor)
            .ok_or_else(|| BackendError::Message("script exhausted".into()))?;
        self.cursor += 1;
        Ok(step
            .agents
            .iter()
            .map(|&(reward, overlap)| agent_step(reward, overlap, step.done))
            .collect())
    }

    fn calc_hpwl(&self) -> f64 {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.script.get(i))
            .map_or(0.0, |s| s.hpwl)
    }

    fn tracker(&mut self) -> &mut dyn Tracker {
        &mut self.tracker
    }

    fn write_current_board(&self, dir: &Path, filename: &str) -> Result<(), BackendError> {
        fs::write(dir.join(filename), format!("hpwl={}", self.calc_hpwl()))?;
        Ok(())
    }

    fn commit_optimal_positions(&mut self) {
        self.committed = true;
    }

    fn write_board(&self, dir: &Path, filename: &str) -> Result<(), BackendError> {
        fs::write(dir.join(filename), format!("committed={}", self.committed))?;
        Ok(())
    }

    fn board_representation(&self) -> String {
        "scripted board".to_string()
    }
}

/// Builds scripted environments and counts how many were built.
pub struct ScriptedBackend {
    pub script: Vec<ScriptStep>,
    pub built: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        ScriptedBackend {
            script,
            built: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PlacementBackend for ScriptedBackend {
    fn build_environment(
        &self,
        _params: &EnvironmentParams,
    ) -> Result<Box<dyn PlacementEnv>, BackendError> {
        self.built.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEnv {
            script: self.script.clone(),
            cursor: 0,
            tracker: FileTracker,
            committed: false,
        }))
    }

    fn build_learner(
        &self,
        _setup: LearnerSetup,
        _env: Box<dyn PlacementEnv>,
    ) -> Result<Box<dyn Learner>, BackendError> {
        Err(BackendError::Message("scripted backend has no learner".into()))
    }
}
