use std::fmt;
use std::path::Path;

use crate::descriptor::{Device, PolicyKind, ReplayBufferGrowth};
use crate::error::{BackendError, TrialError};
use crate::placement::{EnvironmentParams, PlacementEnv};
use crate::training::Hyperparameters;

/// A policy snapshot that can act and be persisted.
pub trait Policy {
    /// Deterministic action for one agent's feature vector.
    fn select_action(&self, features: &[f64]) -> Vec<f64>;

    fn save(&self, path: &Path) -> Result<(), BackendError>;
}

/// Printable description of a learner's networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Architecture {
    /// Actor network (TD3) or policy network (SAC).
    pub actor: String,
    pub critic: String,
    pub critic_target: String,
    pub activation: String,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Actor")?;
        writeln!(f, "{}\n", self.actor)?;
        writeln!(f, "Critic")?;
        writeln!(f, "{}\n", self.critic)?;
        writeln!(f, "Critic target")?;
        writeln!(f, "{}\n", self.critic_target)?;
        write!(f, "Activation function : {}", self.activation)
    }
}

/// A finished training episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub reward: f64,
    pub steps: u64,
}

/// Reported to the callback after every learning timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepProgress {
    /// 1-based count of learning timesteps taken so far.
    pub timestep: u64,
    pub episode: Option<EpisodeSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Hook invoked by a learner after each timestep.
pub trait TrainingCallback {
    fn on_step(
        &mut self,
        policy: &dyn Policy,
        progress: &StepProgress,
    ) -> Result<CallbackAction, TrialError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnSchedule {
    pub max_timesteps: u64,
    pub start_timesteps: u64,
    pub replay_growth: Option<ReplayBufferGrowth>,
}

/// An actor-critic learner bound to its training environment.
pub trait Learner {
    fn architecture(&self) -> Architecture;

    /// Fill the expert target buffer before learning begins.
    fn explore_for_expert_targets(&mut self, steps: u64) -> Result<(), BackendError>;

    /// Run the learning loop for up to `schedule.max_timesteps`, stopping
    /// early when the callback asks to.
    fn learn(
        &mut self,
        schedule: &LearnSchedule,
        callback: &mut dyn TrainingCallback,
    ) -> Result<(), TrialError>;
}

/// Everything a backend needs to build a learner.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerSetup {
    pub kind: PolicyKind,
    pub hyperparameters: Hyperparameters,
    pub device: Device,
    pub early_stopping: u64,
    pub seed: u64,
    /// Request deterministic compute kernels.
    pub deterministic: bool,
}

/// Factory for the environment and learner collaborators of a run.
pub trait PlacementBackend: Send + Sync {
    fn build_environment(
        &self,
        params: &EnvironmentParams,
    ) -> Result<Box<dyn PlacementEnv>, BackendError>;

    fn build_learner(
        &self,
        setup: LearnerSetup,
        env: Box<dyn PlacementEnv>,
    ) -> Result<Box<dyn Learner>, BackendError>;

    /// Dependency and build information for the description log.
    fn build_info(&self) -> String {
        String::new()
    }
}
