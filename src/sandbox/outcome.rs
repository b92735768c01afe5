//! Request/response shapes and assembly of the single result type.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};
use crate::sandbox::fault::UserFault;
use crate::sandbox::limits::IsolationLevel;
use crate::sandbox::policy::Violation;
use crate::sandbox::runner::RawOutput;

/// Exit code reported when no real process exit status applies.
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// A submission as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Python source to run.
    pub code: String,
}

impl ExecutionRequest {
    /// Longest submission, in characters, a caller should forward.
    pub const MAX_CODE_CHARS: usize = 10_000;

    /// Create a request.
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// Reject submissions longer than `max` characters.
    pub fn check_length(&self, max: usize) -> Result<()> {
        let len = self.code.chars().count();
        if len > max {
            return Err(SandboxError::RequestTooLarge { len, max });
        }
        Ok(())
    }
}

/// Which terminal state an execution ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The static checker refused the source; nothing ran.
    Rejected,
    /// The child exited on its own, with any exit code.
    Completed,
    /// The wall-clock deadline fired and the process tree was killed.
    TimedOut,
    /// The engine could not launch or isolate the child.
    InternalFailure,
}

/// Diagnostics about an execution that are not part of the wire format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionMetadata {
    /// Terminal state, set by the constructor that assembled the outcome.
    pub kind: Option<OutcomeKind>,
    /// Wall-clock time spent in the engine.
    pub duration: Duration,
    /// Isolation the child ran under; `None` when nothing was spawned.
    pub isolation: Option<IsolationLevel>,
    /// Whether stdout hit the output ceiling.
    pub stdout_truncated: bool,
    /// Whether stderr hit the output ceiling.
    pub stderr_truncated: bool,
    /// Pid of the child that completed.
    pub pid: Option<u32>,
}

/// Result of one submission, in the shape callers relay verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Governed stdout.
    pub stdout: String,
    /// Governed stderr.
    pub stderr: String,
    /// Child exit code, or [`SENTINEL_EXIT_CODE`].
    pub exit_code: i32,
    /// Whether the wall-clock deadline fired.
    pub timed_out: bool,
    /// Why the code did not run (or did not finish); `None` on completion.
    pub error: Option<String>,
    /// Engine-side details.
    #[serde(skip)]
    pub metadata: ExecutionMetadata,
}

impl ExecutionOutcome {
    fn empty(kind: OutcomeKind, error: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: SENTINEL_EXIT_CODE,
            timed_out: kind == OutcomeKind::TimedOut,
            error: Some(error),
            metadata: ExecutionMetadata {
                kind: Some(kind),
                ..ExecutionMetadata::default()
            },
        }
    }

    /// The static checker found at least one violation.
    pub fn rejected(violations: &[Violation]) -> Self {
        let error = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Self::empty(OutcomeKind::Rejected, error)
    }

    /// The child exited; apply the output ceiling to both streams.
    pub fn completed(raw: RawOutput, max_output_bytes: usize) -> Self {
        let (stdout, stdout_truncated) = raw.stdout.govern(max_output_bytes);
        let (stderr, stderr_truncated) = raw.stderr.govern(max_output_bytes);
        Self {
            stdout,
            stderr,
            exit_code: raw.exit_code,
            timed_out: false,
            error: None,
            metadata: ExecutionMetadata {
                kind: Some(OutcomeKind::Completed),
                isolation: Some(raw.isolation),
                stdout_truncated,
                stderr_truncated,
                pid: raw.pid,
                ..ExecutionMetadata::default()
            },
        }
    }

    /// The wall-clock deadline fired; partial output is discarded.
    pub fn timed_out(limit: Duration) -> Self {
        Self::empty(
            OutcomeKind::TimedOut,
            format!("Execution timed out ({} limit)", format_limit(limit)),
        )
    }

    /// The engine failed for reasons unrelated to the submitted code.
    pub fn internal_failure(err: &SandboxError) -> Self {
        Self::empty(OutcomeKind::InternalFailure, format!("Execution error: {err}"))
    }

    /// Record how long the engine spent on this submission.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.metadata.duration = duration;
        self
    }

    /// Which terminal state produced this outcome.
    ///
    /// Outcomes decoded from the wire carry no metadata; for those a rejection
    /// cannot be told apart from an internal failure and is reported as the
    /// latter.
    pub fn kind(&self) -> OutcomeKind {
        self.metadata.kind.unwrap_or(match (&self.error, self.timed_out) {
            (None, _) => OutcomeKind::Completed,
            (Some(_), true) => OutcomeKind::TimedOut,
            (Some(_), false) => OutcomeKind::InternalFailure,
        })
    }

    /// Check if the submission ran to completion with exit code 0.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }

    /// The exception the submission raised, if stderr contains one.
    pub fn user_fault(&self) -> Option<UserFault> {
        if self.kind() != OutcomeKind::Completed || self.exit_code == 0 {
            return None;
        }
        UserFault::from_stderr(&self.stderr)
    }
}

/// Render a limit as `10s` for whole seconds, `500ms` otherwise.
fn format_limit(limit: Duration) -> String {
    if limit.subsec_nanos() == 0 {
        format!("{}s", limit.as_secs())
    } else {
        format!("{}ms", limit.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::io::BoundedCapture;
    use crate::sandbox::policy::Policy;

    #[test]
    fn test_rejected_shape() {
        let violations = Policy::default().validate("import os\nimport sys");
        let outcome = ExecutionOutcome::rejected(&violations);

        assert_eq!(outcome.stdout, "");
        assert_eq!(outcome.exit_code, SENTINEL_EXIT_CODE);
        assert!(!outcome.timed_out);
        assert_eq!(
            outcome.error.as_deref(),
            Some(
                "Blocked import: 'os' is not allowed (line 1)\n\
                 Blocked import: 'sys' is not allowed (line 2)"
            )
        );
        assert_eq!(outcome.kind(), OutcomeKind::Rejected);
    }

    #[test]
    fn test_completed_governs_each_stream_independently() {
        let mut stdout = BoundedCapture::new(8);
        stdout.push(b"0123456789abcdef");
        let mut stderr = BoundedCapture::new(8);
        stderr.push(b"short");

        let raw = RawOutput {
            stdout: stdout.finish(),
            stderr: stderr.finish(),
            exit_code: 3,
            isolation: IsolationLevel::Full,
            pid: Some(42),
        };
        let outcome = ExecutionOutcome::completed(raw, 8);

        assert!(outcome.stdout.starts_with("01234567\n... (output truncated"));
        assert_eq!(outcome.stderr, "short");
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.error.is_none());
        assert!(outcome.metadata.stdout_truncated);
        assert!(!outcome.metadata.stderr_truncated);
        assert_eq!(outcome.kind(), OutcomeKind::Completed);
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_timed_out_names_limit() {
        let outcome = ExecutionOutcome::timed_out(Duration::from_secs(10));
        assert_eq!(outcome.error.as_deref(), Some("Execution timed out (10s limit)"));
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, SENTINEL_EXIT_CODE);
        assert_eq!(outcome.kind(), OutcomeKind::TimedOut);

        let outcome = ExecutionOutcome::timed_out(Duration::from_millis(250));
        assert_eq!(outcome.error.as_deref(), Some("Execution timed out (250ms limit)"));
    }

    #[test]
    fn test_internal_failure_wraps_error() {
        let err = SandboxError::Spawn(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        ));
        let outcome = ExecutionOutcome::internal_failure(&err);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Execution error: failed to launch interpreter: No such file or directory")
        );
        assert_eq!(outcome.kind(), OutcomeKind::InternalFailure);
    }

    #[test]
    fn test_wire_format() {
        let outcome = ExecutionOutcome {
            stdout: "hello\n".into(),
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
            error: None,
            metadata: ExecutionMetadata::default(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "stdout": "hello\n",
                "stderr": "",
                "exit_code": 0,
                "timed_out": false,
                "error": null
            })
        );

        let request: ExecutionRequest = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(request.code, "print(1)");
    }

    #[test]
    fn test_request_length() {
        let request = ExecutionRequest::new("é".repeat(10));
        assert!(request.check_length(10).is_ok());
        assert!(matches!(
            request.check_length(9),
            Err(SandboxError::RequestTooLarge { len: 10, max: 9 })
        ));
    }

    #[test]
    fn test_user_fault_only_for_failed_completion() {
        let mut stderr = BoundedCapture::new(1024);
        stderr.push(b"Traceback (most recent call last):\n  File \"<user>\", line 1, in <module>\nZeroDivisionError: division by zero\n");
        let raw = RawOutput {
            stderr: stderr.finish(),
            exit_code: 1,
            ..RawOutput::default()
        };
        let outcome = ExecutionOutcome::completed(raw, 1024);
        let fault = outcome.user_fault().unwrap();
        assert_eq!(fault.exception_type, "ZeroDivisionError");

        assert!(ExecutionOutcome::timed_out(Duration::from_secs(1)).user_fault().is_none());
    }
}
