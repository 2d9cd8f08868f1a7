//! # PCB Placement Trials
//!
//! Runs batches of reinforcement-learning training trials for component
//! placement across a pool of worker processes, keeping the best models and
//! layouts each trial produces.
//!
//! ## Modules
//!
//! - [`seeding`]: Per-run seed generation and subsystem seed derivation
//! - [`descriptor`]: Immutable per-run configuration sent to workers
//! - [`orchestrator`]: Worker pool, worker processes and their wire protocol
//! - [`training`]: Trial execution, training monitor, hyperparameters
//! - [`evaluation`]: Evaluation rollouts, overlap bands, best-model selection
//! - [`checkpoint`]: Model persistence and metadata
//! - [`aggregate`]: Per-run results and batch summary
//! - [`placement`]: Environment and learner interfaces plus a sandbox backend
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: Structured error types

pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod evaluation;
pub mod orchestrator;
pub mod placement;
pub mod seeding;
pub mod training;

#[cfg(test)]
mod test_support;
