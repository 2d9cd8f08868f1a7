//! Messages exchanged between the parent and a worker process.
//!
//! One JSON object per line: requests on the child's stdin, replies on its
//! stdout.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::aggregate::TrialResult;
use crate::descriptor::RunDescriptor;
use crate::error::WorkerError;

/// Parent to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Run { descriptor: RunDescriptor },
    /// No more work; the worker exits without replying.
    Shutdown,
}

/// Worker to parent, one per `Run` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    Completed { result: TrialResult },
    Failed { run_index: usize, reason: String },
}

impl WorkerReply {
    pub fn run_index(&self) -> usize {
        match self {
            WorkerReply::Completed { result } => result.run_index,
            WorkerReply::Failed { run_index, .. } => *run_index,
        }
    }

    /// Outcome of run `expected`. A reply naming another run means the
    /// worker is out of step with the parent.
    pub fn into_outcome(self, expected: usize) -> Result<TrialResult, WorkerError> {
        let got = self.run_index();
        if got != expected {
            return Err(WorkerError::RunMismatch { expected, got });
        }
        match self {
            WorkerReply::Completed { result } => Ok(result),
            WorkerReply::Failed { run_index, reason } => {
                Err(WorkerError::RunFailed { run_index, reason })
            }
        }
    }
}

pub fn write_message<W: Write, T: Serialize>(out: &mut W, message: &T) -> Result<(), WorkerError> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Next message, skipping blank lines. `None` at end of stream.
pub fn read_message<R: BufRead, T: DeserializeOwned>(input: &mut R) -> Result<Option<T>, WorkerError> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(Some(serde_json::from_str(trimmed)?));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::descriptor::tests::sample_descriptor;

    #[test]
    fn test_request_wire_format() {
        let mut buf = Vec::new();
        write_message(&mut buf, &WorkerRequest::Shutdown).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{\"type\":\"shutdown\"}\n");
    }

    #[test]
    fn test_messages_read_in_order_across_blank_lines() {
        let mut buf = Vec::new();
        let run = WorkerRequest::Run {
            descriptor: sample_descriptor(4, 44),
        };
        write_message(&mut buf, &run).unwrap();
        buf.extend_from_slice(b"\n\n");
        write_message(&mut buf, &WorkerRequest::Shutdown).unwrap();

        let mut input = Cursor::new(buf);
        let first: Option<WorkerRequest> = read_message(&mut input).unwrap();
        let second: Option<WorkerRequest> = read_message(&mut input).unwrap();
        let end: Option<WorkerRequest> = read_message(&mut input).unwrap();
        assert_eq!(first, Some(run));
        assert_eq!(second, Some(WorkerRequest::Shutdown));
        assert_eq!(end, None);
    }

    #[test]
    fn test_garbage_is_a_protocol_error() {
        let mut input = Cursor::new(b"not json\n".to_vec());
        let msg: Result<Option<WorkerReply>, _> = read_message(&mut input);
        assert!(matches!(msg, Err(WorkerError::Protocol(_))));
    }

    #[test]
    fn test_reply_for_another_run_is_rejected() {
        let result = TrialResult {
            run_index: 3,
            seed: 33,
            best: None,
            best_mean: None,
        };
        let completed = WorkerReply::Completed { result };
        assert_eq!(completed.clone().into_outcome(3).unwrap().seed, 33);
        assert!(matches!(
            completed.into_outcome(1),
            Err(WorkerError::RunMismatch { expected: 1, got: 3 })
        ));

        let failed = WorkerReply::Failed {
            run_index: 2,
            reason: "diverged".into(),
        };
        assert!(matches!(
            failed.clone().into_outcome(2),
            Err(WorkerError::RunFailed { run_index: 2, .. })
        ));
        assert!(matches!(
            failed.into_outcome(0),
            Err(WorkerError::RunMismatch { expected: 0, got: 2 })
        ));
    }
}
