use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Named learner hyperparameters, loadable from TOML.
///
/// Keys not listed here are kept in `extra` and passed through to the
/// learner and the description log untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Std-dev of the Gaussian noise added to policy actions.
    pub expl_noise: f64,
    pub learning_rate: f64,
    pub gamma: f64,
    pub tau: f64,
    pub batch_size: usize,
    pub buffer_size: usize,
    pub policy_noise: f64,
    pub noise_clip: f64,
    pub policy_freq: usize,
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            expl_noise: 0.1,
            learning_rate: 3e-4,
            gamma: 0.99,
            tau: 0.005,
            batch_size: 256,
            buffer_size: 1_000_000,
            policy_noise: 0.2,
            noise_clip: 0.5,
            policy_freq: 2,
            extra: BTreeMap::new(),
        }
    }
}

impl Hyperparameters {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let hp: Hyperparameters = toml::from_str(&content)?;
        hp.validate()?;
        Ok(hp)
    }

    /// Defaults when `path` is `None` or names a missing file.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                warn!(path = %p.display(), "hyperparameter file not found, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expl_noise < 0.0 {
            return Err(ConfigError::Validation("expl_noise must be >= 0".into()));
        }
        if self.policy_noise < 0.0 {
            return Err(ConfigError::Validation("policy_noise must be >= 0".into()));
        }
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::Validation("learning_rate must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::Validation("gamma must be in [0, 1]".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be > 0".into()));
        }
        Ok(())
    }

    /// `key -> value` pairs in a stable order for the description log.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            ("expl_noise".to_string(), self.expl_noise.to_string()),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
            ("gamma".to_string(), self.gamma.to_string()),
            ("tau".to_string(), self.tau.to_string()),
            ("batch_size".to_string(), self.batch_size.to_string()),
            ("buffer_size".to_string(), self.buffer_size.to_string()),
            ("policy_noise".to_string(), self.policy_noise.to_string()),
            ("noise_clip".to_string(), self.noise_clip.to_string()),
            ("policy_freq".to_string(), self.policy_freq.to_string()),
        ];
        entries.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.to_string())));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_path_gives_defaults() {
        let hp = Hyperparameters::load_or_default(None).unwrap();
        assert_eq!(hp, Hyperparameters::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let hp = Hyperparameters::load_or_default(Some(&dir.path().join("nope.toml"))).unwrap();
        assert!((hp.expl_noise - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_partial_file_keeps_extras() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hp.toml");
        std::fs::write(&path, "expl_noise = 0.3\nactor_layers = [400, 300]\n").unwrap();

        let hp = Hyperparameters::load_or_default(Some(&path)).unwrap();
        assert!((hp.expl_noise - 0.3).abs() < 1e-12);
        assert_eq!(hp.batch_size, 256);
        assert!(hp.extra.contains_key("actor_layers"));
        assert!(hp.entries().iter().any(|(k, _)| k == "actor_layers"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hp.toml");
        std::fs::write(&path, "expl_noise = = 1").unwrap();
        assert!(matches!(
            Hyperparameters::load_or_default(Some(&path)),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_validation_rejects_negative_noise() {
        let hp = Hyperparameters {
            expl_noise: -0.1,
            ..Default::default()
        };
        assert!(hp.validate().is_err());
    }
}
