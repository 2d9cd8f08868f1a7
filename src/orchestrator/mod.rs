//! Fans run descriptors out to a pool of workers and gathers their results.

pub mod pool;
pub mod protocol;
pub mod worker;

pub use pool::{FailedRun, PoolReport, WorkerPool};
pub use protocol::{WorkerReply, WorkerRequest};
pub use worker::{serve, InProcessWorker, ProcessWorker, Worker};

use tracing::{info, warn};

use crate::descriptor::RunDescriptor;

/// Submit every descriptor in order, then shut the pool down and return
/// what came back. Runs that could not be queued because every worker had
/// already exited are listed as failed.
pub fn run_batch(mut pool: WorkerPool, descriptors: Vec<RunDescriptor>) -> PoolReport {
    let total = descriptors.len();
    info!(runs = total, workers = pool.worker_count(), "submitting batch");

    let mut unsubmitted = Vec::new();
    let mut queue = descriptors.into_iter();
    for descriptor in queue.by_ref() {
        let run_index = descriptor.run_index;
        if let Err(e) = pool.submit(descriptor) {
            warn!(run = run_index, error = %e, "stopping submission");
            unsubmitted.push(FailedRun {
                run_index,
                reason: e.to_string(),
            });
            break;
        }
    }
    unsubmitted.extend(queue.map(|d| FailedRun {
        run_index: d.run_index,
        reason: "not submitted: all workers have exited".to_string(),
    }));

    let mut report = pool.shutdown();
    report.failed.extend(unsubmitted);
    report
}
