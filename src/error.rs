use std::path::PathBuf;

/// Errors that can occur when loading configuration or hyperparameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Errors raised by the environment and policy collaborators.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to load board {path}: {reason}")]
    BoardLoad { path: PathBuf, reason: String },

    #[error("{0}")]
    Message(String),
}

/// Errors that can occur while persisting models, boards and logs.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to save model to {path}: {source}")]
    ModelSave {
        path: PathBuf,
        source: BackendError,
    },

    #[error("failed to write artifact {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        source: BackendError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that abort a single training run.
#[derive(Debug, thiserror::Error)]
pub enum TrialError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(std::io::Error),

    #[error("worker pipe error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed worker message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("worker replied for run {got} while running run {expected}")]
    RunMismatch { expected: usize, got: usize },

    #[error("worker process exited before replying (status: {0:?})")]
    Exited(Option<i32>),

    #[error("run {run_index} failed: {reason}")]
    RunFailed { run_index: usize, reason: String },
}

/// Errors reported by the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("job queue capacity must be > 0")]
    ZeroCapacity,

    #[error("all workers have exited; job queue is disconnected")]
    Disconnected,

    #[error("failed to start worker {worker}: {source}")]
    Spawn { worker: usize, source: WorkerError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("batch.runs must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "config validation error: batch.runs must be > 0"
        );
    }

    #[test]
    fn test_worker_error_display() {
        let err = WorkerError::RunFailed {
            run_index: 3,
            reason: "board file missing".to_string(),
        };
        assert_eq!(err.to_string(), "run 3 failed: board file missing");
    }

    #[test]
    fn test_trial_error_wraps_backend() {
        let err: TrialError = BackendError::Message("simulator diverged".into()).into();
        assert_eq!(err.to_string(), "backend error: simulator diverged");
    }

    #[test]
    fn test_pool_error_display() {
        assert_eq!(
            PoolError::NoWorkers.to_string(),
            "worker pool needs at least one worker"
        );
    }
}
