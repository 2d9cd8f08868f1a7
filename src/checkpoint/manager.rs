use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::checkpoint::metadata::CheckpointMetadata;
use crate::descriptor::PolicyKind;
use crate::error::CheckpointError;
use crate::placement::Policy;

const PERIODIC_PREFIX: &str = "policy_";
const BEST_STEM: &str = "policy_best";

/// Saves the periodic `policy_<k>k` models and the single `policy_best`
/// model of one run.
pub struct ModelCheckpoints {
    model_dir: PathBuf,
    kind: PolicyKind,
}

impl ModelCheckpoints {
    pub fn new(model_dir: &Path, kind: PolicyKind) -> Result<Self, CheckpointError> {
        fs::create_dir_all(model_dir).map_err(|e| CheckpointError::CreateDir {
            path: model_dir.to_path_buf(),
            source: e,
        })?;
        Ok(ModelCheckpoints {
            model_dir: model_dir.to_path_buf(),
            kind,
        })
    }

    /// `policy_<timestep / 1000>k.<ext>`
    pub fn periodic_path(&self, timestep: u64) -> PathBuf {
        self.model_dir.join(format!(
            "{PERIODIC_PREFIX}{}k.{}",
            timestep / 1000,
            self.kind.model_extension()
        ))
    }

    pub fn best_path(&self) -> PathBuf {
        self.model_dir
            .join(format!("{BEST_STEM}.{}", self.kind.model_extension()))
    }

    pub fn save_periodic(
        &self,
        policy: &dyn Policy,
        timestep: u64,
        mean_reward: Option<f64>,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.periodic_path(timestep);
        self.save(policy, &path, timestep, mean_reward, false)?;
        Ok(path)
    }

    /// Overwrites the run's best model.
    pub fn save_best(
        &self,
        policy: &dyn Policy,
        timestep: u64,
        mean_reward: f64,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.best_path();
        self.save(policy, &path, timestep, Some(mean_reward), true)?;
        Ok(path)
    }

    fn save(
        &self,
        policy: &dyn Policy,
        path: &Path,
        timestep: u64,
        mean_reward: Option<f64>,
        best: bool,
    ) -> Result<(), CheckpointError> {
        policy
            .save(path)
            .map_err(|e| CheckpointError::ModelSave {
                path: path.to_path_buf(),
                source: e,
            })?;

        let metadata = CheckpointMetadata {
            timestep,
            timestamp: Utc::now().timestamp(),
            policy: self.kind,
            mean_reward,
            best,
        };
        fs::write(
            metadata_path(path),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        Ok(())
    }
}

fn metadata_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::test_support::{load_metadata, FixedPolicy};

    struct BrokenPolicy;

    impl Policy for BrokenPolicy {
        fn select_action(&self, _features: &[f64]) -> Vec<f64> {
            Vec::new()
        }

        fn save(&self, _path: &Path) -> Result<(), BackendError> {
            Err(BackendError::Message("device lost".into()))
        }
    }

    #[test]
    fn test_model_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let td3 = ModelCheckpoints::new(dir.path(), PolicyKind::Td3).unwrap();
        assert!(td3.periodic_path(250_000).ends_with("policy_250k.td3"));
        assert!(td3.periodic_path(999).ends_with("policy_0k.td3"));
        let sac = ModelCheckpoints::new(dir.path(), PolicyKind::Sac).unwrap();
        assert!(sac.best_path().ends_with("policy_best.sac"));
    }

    #[test]
    fn test_save_writes_model_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let models = ModelCheckpoints::new(&dir.path().join("models"), PolicyKind::Td3).unwrap();

        let path = models.save_best(&FixedPolicy, 5_000, 2.5).unwrap();
        assert!(path.exists());
        let meta = load_metadata(&path).unwrap();
        assert_eq!(meta.timestep, 5_000);
        assert_eq!(meta.mean_reward, Some(2.5));
        assert!(meta.best);
        assert_eq!(meta.policy, PolicyKind::Td3);
    }

    #[test]
    fn test_save_failure_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let models = ModelCheckpoints::new(dir.path(), PolicyKind::Sac).unwrap();
        let err = models.save_periodic(&BrokenPolicy, 0, None).unwrap_err();
        assert!(matches!(err, CheckpointError::ModelSave { .. }));
        assert!(err.to_string().contains("policy_0k.sac"));
    }
}
