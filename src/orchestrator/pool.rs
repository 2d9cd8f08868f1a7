use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::aggregate::TrialResult;
use crate::descriptor::RunDescriptor;
use crate::error::{PoolError, WorkerError};
use crate::orchestrator::worker::Worker;

enum Job {
    Run(RunDescriptor),
    /// One per worker at shutdown.
    Shutdown,
}

enum WorkerEvent {
    Completed(TrialResult),
    Failed(FailedRun),
}

/// A run that produced no result.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRun {
    pub run_index: usize,
    pub reason: String,
}

/// Everything the pool collected, in completion order.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub results: Vec<TrialResult>,
    pub failed: Vec<FailedRun>,
}

/// Fixed set of workers fed from a bounded job queue.
///
/// `submit` blocks while the queue is full. Results come back on a separate
/// unbounded channel and are drained by `shutdown`.
pub struct WorkerPool {
    jobs: SyncSender<Job>,
    events: Receiver<WorkerEvent>,
    handles: Vec<JoinHandle<()>>,
    submitted: Vec<usize>,
}

impl WorkerPool {
    /// Start `worker_count` workers with a queue capacity equal to the
    /// worker count.
    pub fn start<F>(worker_count: usize, spawn: F) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> Result<Box<dyn Worker>, WorkerError>,
    {
        Self::with_capacity(worker_count, worker_count, spawn)
    }

    pub fn with_capacity<F>(
        worker_count: usize,
        capacity: usize,
        mut spawn: F,
    ) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> Result<Box<dyn Worker>, WorkerError>,
    {
        if worker_count == 0 {
            return Err(PoolError::NoWorkers);
        }
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        let (job_tx, job_rx) = mpsc::sync_channel(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (event_tx, event_rx) = mpsc::channel();

        let mut pool = WorkerPool {
            jobs: job_tx,
            events: event_rx,
            handles: Vec::with_capacity(worker_count),
            submitted: Vec::new(),
        };

        for id in 0..worker_count {
            let launched = spawn(id).and_then(|worker| {
                let jobs = Arc::clone(&job_rx);
                let events = event_tx.clone();
                thread::Builder::new()
                    .name(format!("worker-{id}"))
                    .spawn(move || worker_loop(id, worker, jobs, events))
                    .map_err(WorkerError::Spawn)
            });
            match launched {
                Ok(handle) => pool.handles.push(handle),
                Err(source) => {
                    error!(worker = id, error = %source, "failed to start worker");
                    pool.abort();
                    return Err(PoolError::Spawn { worker: id, source });
                }
            }
        }

        info!(workers = worker_count, capacity, "worker pool started");
        Ok(pool)
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Queue a run, blocking while the queue is full.
    ///
    /// Fails with `Disconnected` once every worker has exited.
    pub fn submit(&mut self, descriptor: RunDescriptor) -> Result<(), PoolError> {
        let run_index = descriptor.run_index;
        self.jobs
            .send(Job::Run(descriptor))
            .map_err(|_| PoolError::Disconnected)?;
        self.submitted.push(run_index);
        debug!(run = run_index, "run queued");
        Ok(())
    }

    /// Send one shutdown sentinel per worker, wait for all of them and
    /// collect every reported outcome.
    ///
    /// Runs still queued when the last worker exited are reported as failed.
    pub fn shutdown(self) -> PoolReport {
        let WorkerPool {
            jobs,
            events,
            handles,
            mut submitted,
        } = self;

        for _ in &handles {
            if jobs.send(Job::Shutdown).is_err() {
                break;
            }
        }
        drop(jobs);

        for handle in handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!(thread = %name, "worker thread panicked");
            }
        }

        let mut report = PoolReport::default();
        for event in events.iter() {
            match event {
                WorkerEvent::Completed(result) => report.results.push(result),
                WorkerEvent::Failed(failed) => report.failed.push(failed),
            }
        }

        let reported = report
            .results
            .iter()
            .map(|r| r.run_index)
            .chain(report.failed.iter().map(|f| f.run_index));
        for run_index in reported {
            if let Some(pos) = submitted.iter().position(|&i| i == run_index) {
                submitted.swap_remove(pos);
            }
        }
        submitted.sort_unstable();
        for run_index in submitted {
            warn!(run = run_index, "run was queued but never executed");
            report.failed.push(FailedRun {
                run_index,
                reason: "queued but never executed: all workers have exited".to_string(),
            });
        }
        info!(
            completed = report.results.len(),
            failed = report.failed.len(),
            "worker pool stopped"
        );
        report
    }

    fn abort(self) {
        let WorkerPool { jobs, handles, .. } = self;
        // a disconnected queue stops every started worker
        drop(jobs);
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    id: usize,
    mut worker: Box<dyn Worker>,
    jobs: Arc<Mutex<Receiver<Job>>>,
    events: Sender<WorkerEvent>,
) {
    loop {
        let job = {
            let queue = match jobs.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            queue.recv()
        };
        let descriptor = match job {
            Ok(Job::Run(descriptor)) => descriptor,
            Ok(Job::Shutdown) | Err(_) => break,
        };

        let run_index = descriptor.run_index;
        debug!(worker = id, run = run_index, seed = descriptor.seed, "run started");
        match worker.execute(&descriptor) {
            Ok(result) => {
                info!(worker = id, "{result}");
                let _ = events.send(WorkerEvent::Completed(result));
            }
            Err(e) => {
                error!(worker = id, run = run_index, error = %e, "run failed; worker exiting");
                let _ = events.send(WorkerEvent::Failed(FailedRun {
                    run_index,
                    reason: e.to_string(),
                }));
                break;
            }
        }
    }

    if let Err(e) = worker.close() {
        warn!(worker = id, error = %e, "worker did not close cleanly");
    }
    debug!(worker = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::descriptor::tests::sample_descriptor;

    struct StubWorker {
        fail_on: Option<usize>,
        gate: Option<Receiver<()>>,
        closed: Arc<AtomicUsize>,
    }

    impl StubWorker {
        fn boxed(closed: &Arc<AtomicUsize>) -> Box<dyn Worker> {
            Box::new(StubWorker {
                fail_on: None,
                gate: None,
                closed: Arc::clone(closed),
            })
        }
    }

    impl Worker for StubWorker {
        fn execute(&mut self, descriptor: &RunDescriptor) -> Result<TrialResult, WorkerError> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            if self.fail_on == Some(descriptor.run_index) {
                return Err(WorkerError::RunFailed {
                    run_index: descriptor.run_index,
                    reason: "diverged".into(),
                });
            }
            Ok(TrialResult {
                run_index: descriptor.run_index,
                seed: descriptor.seed,
                best: None,
                best_mean: None,
            })
        }

        fn close(self: Box<Self>) -> Result<(), WorkerError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let closed = Arc::new(AtomicUsize::new(0));
        let err = WorkerPool::start(0, |_| Ok(StubWorker::boxed(&closed))).err();
        assert!(matches!(err, Some(PoolError::NoWorkers)));
        let err = WorkerPool::with_capacity(2, 0, |_| Ok(StubWorker::boxed(&closed))).err();
        assert!(matches!(err, Some(PoolError::ZeroCapacity)));
    }

    #[test]
    fn test_every_submitted_run_is_reported_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::start(3, |_| Ok(StubWorker::boxed(&closed))).unwrap();
        assert_eq!(pool.worker_count(), 3);
        for i in 0..7 {
            pool.submit(sample_descriptor(i, 100 + i as u32)).unwrap();
        }
        let report = pool.shutdown();

        assert_eq!(report.results.len(), 7);
        assert!(report.failed.is_empty());
        let indices: BTreeSet<usize> = report.results.iter().map(|r| r.run_index).collect();
        assert_eq!(indices, (0..7).collect());
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_shutdown_without_runs_stops_all_workers() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::start(2, |_| Ok(StubWorker::boxed(&closed))).unwrap();
        let report = pool.shutdown();
        assert!(report.results.is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_run_is_missing_from_results() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::start(2, |_| {
            Ok(Box::new(StubWorker {
                fail_on: Some(2),
                gate: None,
                closed: Arc::clone(&closed),
            }) as Box<dyn Worker>)
        })
        .unwrap();
        for i in 0..5 {
            pool.submit(sample_descriptor(i, i as u32 + 1)).unwrap();
        }
        let report = pool.shutdown();

        assert_eq!(report.results.len(), 4);
        assert!(report.results.iter().all(|r| r.run_index != 2));
        assert_eq!(
            report.failed,
            vec![FailedRun {
                run_index: 2,
                reason: "run 2 failed: diverged".into(),
            }]
        );
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_submit_fails_once_all_workers_are_gone() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::start(1, |_| {
            Ok(Box::new(StubWorker {
                fail_on: Some(0),
                gate: None,
                closed: Arc::clone(&closed),
            }) as Box<dyn Worker>)
        })
        .unwrap();
        pool.submit(sample_descriptor(0, 1)).unwrap();

        let mut outcome = Ok(());
        for i in 1..50 {
            outcome = pool.submit(sample_descriptor(i, 1));
            if outcome.is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(outcome, Err(PoolError::Disconnected)));

        let report = pool.shutdown();
        assert!(report.results.is_empty());
        assert_eq!(report.failed[0].run_index, 0);
        assert!(report.failed[1..]
            .iter()
            .all(|f| f.reason.starts_with("queued but never executed")));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_submit_blocks_while_queue_is_full() {
        let closed = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = mpsc::channel();
        let mut gate = Some(gate_rx);
        let mut pool = WorkerPool::with_capacity(1, 1, |_| {
            Ok(Box::new(StubWorker {
                fail_on: None,
                gate: gate.take(),
                closed: Arc::clone(&closed),
            }) as Box<dyn Worker>)
        })
        .unwrap();

        let opened = Arc::new(AtomicBool::new(false));
        let opener = {
            let opened = Arc::clone(&opened);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                opened.store(true, Ordering::SeqCst);
                for _ in 0..3 {
                    let _ = gate_tx.send(());
                }
            })
        };

        // one run executing, one queued, the third must wait for the gate
        pool.submit(sample_descriptor(0, 1)).unwrap();
        pool.submit(sample_descriptor(1, 2)).unwrap();
        pool.submit(sample_descriptor(2, 3)).unwrap();
        assert!(opened.load(Ordering::SeqCst));

        opener.join().unwrap();
        assert_eq!(pool.shutdown().results.len(), 3);
    }

    #[test]
    fn test_spawn_failure_stops_started_workers() {
        let closed = Arc::new(AtomicUsize::new(0));
        let err = WorkerPool::start(3, |id| {
            if id == 2 {
                Err(WorkerError::Exited(Some(1)))
            } else {
                Ok(StubWorker::boxed(&closed))
            }
        })
        .err();
        assert!(matches!(err, Some(PoolError::Spawn { worker: 2, .. })));
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }
}
