//! Interfaces of the placement environment and policy collaborators, plus a
//! small sandbox backend implementing them.

mod env;
mod policy;
pub mod sandbox;

pub use env::{
    mean_reward, AgentStep, EnvironmentParams, EnvironmentSettings, PlacementEnv, Tracker,
    OVERLAP_FEATURES,
};
pub use policy::{
    Architecture, CallbackAction, EpisodeSummary, LearnSchedule, Learner, LearnerSetup,
    PlacementBackend, Policy, StepProgress, TrainingCallback,
};
pub use sandbox::SandboxBackend;
