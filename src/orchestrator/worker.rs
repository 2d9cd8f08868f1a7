use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::aggregate::TrialResult;
use crate::descriptor::RunDescriptor;
use crate::error::WorkerError;
use crate::orchestrator::protocol::{read_message, write_message, WorkerReply, WorkerRequest};
use crate::training::TrialRunner;

/// Executes runs for the pool, one at a time.
pub trait Worker: Send {
    fn execute(&mut self, descriptor: &RunDescriptor) -> Result<TrialResult, WorkerError>;

    /// Release the worker after its last run.
    fn close(self: Box<Self>) -> Result<(), WorkerError>;
}

/// Runs trials on the calling thread.
pub struct InProcessWorker {
    runner: Arc<dyn TrialRunner>,
}

impl InProcessWorker {
    pub fn new(runner: Arc<dyn TrialRunner>) -> Self {
        InProcessWorker { runner }
    }
}

impl Worker for InProcessWorker {
    fn execute(&mut self, descriptor: &RunDescriptor) -> Result<TrialResult, WorkerError> {
        self.runner
            .run(descriptor)
            .map_err(|e| WorkerError::RunFailed {
                run_index: descriptor.run_index,
                reason: e.to_string(),
            })
    }

    fn close(self: Box<Self>) -> Result<(), WorkerError> {
        Ok(())
    }
}

/// A long-lived child process speaking the worker protocol.
///
/// The child is a freshly spawned program image, never a fork of the parent,
/// so it owns its own RNG and device state.
pub struct ProcessWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessWorker {
    pub fn spawn(mut command: Command) -> Result<Self, WorkerError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = command.spawn().map_err(WorkerError::Spawn)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => {
                debug!(pid = child.id(), "worker process started");
                Ok(ProcessWorker {
                    child,
                    stdin,
                    stdout: BufReader::new(stdout),
                })
            }
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                Err(WorkerError::Spawn(io::Error::other(
                    "worker process pipes unavailable",
                )))
            }
        }
    }
}

impl Worker for ProcessWorker {
    fn execute(&mut self, descriptor: &RunDescriptor) -> Result<TrialResult, WorkerError> {
        let request = WorkerRequest::Run {
            descriptor: descriptor.clone(),
        };
        write_message(&mut self.stdin, &request)?;
        match read_message::<_, WorkerReply>(&mut self.stdout)? {
            Some(reply) => reply.into_outcome(descriptor.run_index),
            None => {
                let status = self.child.wait()?;
                Err(WorkerError::Exited(status.code()))
            }
        }
    }

    fn close(self: Box<Self>) -> Result<(), WorkerError> {
        let ProcessWorker {
            mut child,
            mut stdin,
            stdout,
        } = *self;
        // the child may already be gone after a failed run
        if let Err(e) = write_message(&mut stdin, &WorkerRequest::Shutdown) {
            debug!(error = %e, "shutdown not delivered");
        }
        drop(stdin);
        drop(stdout);
        let status = child.wait()?;
        if !status.success() {
            warn!(pid = child.id(), code = ?status.code(), "worker process exited with failure");
        }
        Ok(())
    }
}

/// Child side of the protocol: answer `Run` requests until `Shutdown` or end
/// of input. A failed run is reported and then ends the worker.
pub fn serve<R: BufRead, W: Write>(
    runner: &dyn TrialRunner,
    mut input: R,
    mut output: W,
) -> Result<usize, WorkerError> {
    let mut completed = 0;
    while let Some(request) = read_message::<_, WorkerRequest>(&mut input)? {
        let descriptor = match request {
            WorkerRequest::Shutdown => {
                debug!(completed, "shutdown received");
                break;
            }
            WorkerRequest::Run { descriptor } => descriptor,
        };

        let run_index = descriptor.run_index;
        match runner.run(&descriptor) {
            Ok(result) => {
                write_message(&mut output, &WorkerReply::Completed { result })?;
                completed += 1;
            }
            Err(e) => {
                let reason = e.to_string();
                error!(run = run_index, error = %reason, "run failed");
                write_message(
                    &mut output,
                    &WorkerReply::Failed {
                        run_index,
                        reason: reason.clone(),
                    },
                )?;
                return Err(WorkerError::RunFailed { run_index, reason });
            }
        }
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::descriptor::tests::sample_descriptor;
    use crate::error::{BackendError, TrialError};

    struct EchoRunner;

    impl TrialRunner for EchoRunner {
        fn run(&self, descriptor: &RunDescriptor) -> Result<TrialResult, TrialError> {
            if descriptor.seed == 0 {
                return Err(BackendError::Message("board missing".into()).into());
            }
            Ok(TrialResult {
                run_index: descriptor.run_index,
                seed: descriptor.seed,
                best: None,
                best_mean: None,
            })
        }
    }

    fn requests(items: &[WorkerRequest]) -> Cursor<Vec<u8>> {
        let mut buf = Vec::new();
        for item in items {
            write_message(&mut buf, item).unwrap();
        }
        Cursor::new(buf)
    }

    fn replies(output: Vec<u8>) -> Vec<WorkerReply> {
        let mut cursor = Cursor::new(output);
        let mut out = Vec::new();
        while let Some(reply) = read_message(&mut cursor).unwrap() {
            out.push(reply);
        }
        out
    }

    fn run(run_index: usize, seed: u32) -> WorkerRequest {
        WorkerRequest::Run {
            descriptor: sample_descriptor(run_index, seed),
        }
    }

    #[test]
    fn test_serve_answers_each_run_until_shutdown() {
        let input = requests(&[run(0, 11), run(1, 22), WorkerRequest::Shutdown, run(2, 33)]);
        let mut output = Vec::new();
        let completed = serve(&EchoRunner, input, &mut output).unwrap();
        assert_eq!(completed, 2);

        let replies = replies(output);
        assert_eq!(replies.len(), 2);
        assert!(matches!(
            &replies[1],
            WorkerReply::Completed { result } if result.seed == 22
        ));
    }

    #[test]
    fn test_serve_stops_at_end_of_input() {
        let mut output = Vec::new();
        assert_eq!(serve(&EchoRunner, requests(&[run(0, 1)]), &mut output).unwrap(), 1);
    }

    #[test]
    fn test_serve_reports_failure_and_exits() {
        let input = requests(&[run(5, 0), run(6, 66)]);
        let mut output = Vec::new();
        let err = serve(&EchoRunner, input, &mut output).unwrap_err();
        assert!(matches!(err, WorkerError::RunFailed { run_index: 5, .. }));

        let replies = replies(output);
        assert_eq!(replies.len(), 1);
        assert!(matches!(
            &replies[0],
            WorkerReply::Failed { run_index: 5, reason } if reason.contains("board missing")
        ));
    }

    #[test]
    fn test_in_process_worker_maps_failures() {
        let mut worker = InProcessWorker::new(Arc::new(EchoRunner));
        assert!(worker.execute(&sample_descriptor(0, 9)).is_ok());
        let err = worker.execute(&sample_descriptor(3, 0)).unwrap_err();
        assert!(matches!(err, WorkerError::RunFailed { run_index: 3, .. }));
        Box::new(worker).close().unwrap();
    }

    #[test]
    fn test_spawn_of_missing_program_fails() {
        let command = Command::new("/nonexistent/placement-worker");
        assert!(matches!(
            ProcessWorker::spawn(command),
            Err(WorkerError::Spawn(_))
        ));
    }
}
