//! Core execution pipeline for the Python sandbox.
//!
//! Every submission passes through the same three stages: the static policy
//! check, a disposable interpreter process, and governed assembly of the
//! result. Each stage can end the pipeline, and each ending produces an
//! [`ExecutionOutcome`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::{Result, SandboxError};
use crate::sandbox::cache::TtlCache;
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::outcome::{ExecutionOutcome, ExecutionRequest};
use crate::sandbox::policy::Violation;
use crate::sandbox::probe::{probe_interpreter, InterpreterStatus};
use crate::sandbox::runner::{ChildLauncher, Launcher};

/// A sandboxed Python execution engine.
///
/// Cheap to share: the configuration is immutable and held behind an `Arc`,
/// and every call to [`execute`](Self::execute) uses its own process and
/// scratch directory, so concurrent executions do not interfere.
#[derive(Clone)]
pub struct PythonSandbox {
    config: Arc<SandboxConfig>,
    launcher: Arc<dyn Launcher>,
}

impl std::fmt::Debug for PythonSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonSandbox")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PythonSandbox {
    /// Create a new Python sandbox with the given configuration.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let launcher = Arc::new(ChildLauncher::new(Arc::clone(&config)));
        Ok(Self { config, launcher })
    }

    /// Create a sandbox that runs accepted code through `launcher`.
    pub fn with_launcher(config: SandboxConfig, launcher: Arc<dyn Launcher>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            launcher,
        })
    }

    /// The configuration this sandbox was built with.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run only the static check.
    pub fn validate(&self, code: &str) -> Vec<Violation> {
        self.config.policy.validate(code)
    }

    /// Execute Python code in the sandbox.
    ///
    /// Never fails: rejections, timeouts and engine faults are all reported
    /// through the returned outcome.
    pub async fn execute(&self, code: &str) -> ExecutionOutcome {
        let started = Instant::now();

        let violations = self.validate(code);
        if !violations.is_empty() {
            debug!(violations = violations.len(), "submission rejected");
            return ExecutionOutcome::rejected(&violations).with_duration(started.elapsed());
        }
        debug!(bytes = code.len(), "submission accepted");

        let outcome = match self.launcher.launch(code).await {
            Ok(raw) => {
                let outcome = ExecutionOutcome::completed(raw, self.config.max_output_bytes);
                info!(
                    exit_code = outcome.exit_code,
                    stdout_truncated = outcome.metadata.stdout_truncated,
                    stderr_truncated = outcome.metadata.stderr_truncated,
                    isolation = ?outcome.metadata.isolation,
                    "execution finished"
                );
                outcome
            }
            Err(SandboxError::Timeout(limit)) => {
                warn!(?limit, "execution timed out, process tree killed");
                ExecutionOutcome::timed_out(limit)
            }
            Err(e) => {
                error!(error = %e, "execution failed");
                ExecutionOutcome::internal_failure(&e)
            }
        };
        outcome.with_duration(started.elapsed())
    }

    /// Execute a caller request.
    ///
    /// Requests over [`ExecutionRequest::MAX_CODE_CHARS`] are turned away
    /// before validation, as an internal failure naming the limit.
    pub async fn handle(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        if let Err(e) = request.check_length(ExecutionRequest::MAX_CODE_CHARS) {
            debug!(error = %e, "request refused");
            return ExecutionOutcome::internal_failure(&e);
        }
        self.execute(&request.code).await
    }

    /// Whether the interpreter is reachable, probing only when `cache` is stale.
    ///
    /// Only successful probes are cached; an unavailable interpreter is
    /// probed again on the next call.
    pub async fn interpreter_status(
        &self,
        cache: &mut TtlCache<InterpreterStatus>,
    ) -> InterpreterStatus {
        let now = Instant::now();
        if let Some(status) = cache.get(now) {
            return status.clone();
        }
        let status = probe_interpreter(&self.config).await;
        if status.available {
            debug!(ttl = ?cache.ttl(), "interpreter status cached");
            cache.store(status.clone(), now);
        } else {
            cache.invalidate();
        }
        status
    }
}
