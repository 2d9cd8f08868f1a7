//! Model persistence: periodic and best policy files with JSON metadata.

pub mod manager;
pub mod metadata;

pub use manager::ModelCheckpoints;
pub use metadata::CheckpointMetadata;
