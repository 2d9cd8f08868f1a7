use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::descriptor::{Budgets, Device, PolicyKind, ReplayBufferGrowth, RunDescriptor, RunPaths};
use crate::error::ConfigError;
use crate::evaluation::EvaluationSettings;
use crate::placement::EnvironmentSettings;
use crate::seeding::SeedPolicy;

/// Batch-level settings: how many runs, on how many workers, with which seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub runs: usize,
    pub workers: usize,
    /// Runs buffered ahead of the workers. Defaults to the worker count.
    pub queue_capacity: Option<usize>,
    pub seeds: Option<Vec<u32>>,
    pub auto_seed: bool,
    /// Batch name used in every log directory. Defaults to the start time in
    /// seconds since the epoch.
    pub run_name: Option<String>,
    pub experiment: Option<String>,
    pub policy: PolicyKind,
    pub device: Device,
    pub replay_growth: Option<ReplayBufferGrowth>,
    pub verbose: u8,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            runs: 1,
            workers: 2,
            queue_capacity: None,
            seeds: None,
            auto_seed: false,
            run_name: None,
            experiment: None,
            policy: PolicyKind::Td3,
            device: Device::Cuda,
            replay_growth: None,
            verbose: 0,
        }
    }
}

/// Top-level experiment configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub batch: BatchConfig,
    pub budgets: Budgets,
    pub paths: RunPaths,
    pub environment: EnvironmentSettings,
    pub evaluation: EvaluationSettings,
}

impl ExperimentConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: ExperimentConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.runs == 0 {
            return Err(ConfigError::Validation("batch.runs must be > 0".into()));
        }
        if self.batch.workers == 0 {
            return Err(ConfigError::Validation("batch.workers must be > 0".into()));
        }
        if self.batch.queue_capacity == Some(0) {
            return Err(ConfigError::Validation(
                "batch.queue_capacity must be > 0".into(),
            ));
        }
        if self.budgets.evaluate_every == 0 {
            return Err(ConfigError::Validation(
                "budgets.evaluate_every must be > 0".into(),
            ));
        }

        let env = &self.environment;
        for (name, weight) in [("w", env.w), ("hpwl", env.hpwl), ("o", env.o)] {
            if weight < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "environment.{name} must be >= 0"
                )));
            }
        }
        if env.max_steps == 0 {
            return Err(ConfigError::Validation(
                "environment.max_steps must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a TOML string with all default values.
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&ExperimentConfig::default())?)
    }

    pub fn queue_capacity(&self) -> usize {
        self.batch.queue_capacity.unwrap_or(self.batch.workers)
    }

    pub fn seed_policy(&self) -> SeedPolicy {
        SeedPolicy::new(self.batch.runs, self.batch.seeds.clone(), self.batch.auto_seed)
    }

    /// One descriptor per run, seeds resolved through the seed policy.
    pub fn descriptors(&self, run_name: &str) -> Vec<RunDescriptor> {
        self.descriptors_with_seeds(run_name, self.seed_policy().resolve())
    }

    /// One descriptor per seed, indexed in order.
    pub fn descriptors_with_seeds(&self, run_name: &str, seeds: Vec<u32>) -> Vec<RunDescriptor> {
        seeds
            .into_iter()
            .enumerate()
            .map(|(run_index, seed)| RunDescriptor {
                run_index,
                run_name: run_name.to_string(),
                experiment: self.batch.experiment.clone(),
                seed,
                policy: self.batch.policy,
                paths: self.paths.clone(),
                budgets: self.budgets.clone(),
                environment: self.environment.clone(),
                evaluation: self.evaluation.clone(),
                device: self.batch.device,
                verbosity: self.batch.verbose,
                replay_growth: self.batch.replay_growth,
            })
            .collect()
    }
}
