//! Periodic policy evaluation and best-artifact selection.

mod bands;
mod log;
mod record;
mod selector;

pub use bands::{
    BandRecord, BestLayoutBands, OverlapBand, HPWL_SENTINEL, ZERO_OVERLAP_EPSILON,
};
pub use log::EvaluationLog;
pub use record::BestRewardRecord;
pub use selector::{
    EvaluationReport, EvaluationSelector, EvaluationSettings, DEFAULT_EVALUATION_SEED,
};
