//! One disposable interpreter process per accepted submission.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::error::{Result, SandboxError};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::env::scrubbed_host_environment;
use crate::sandbox::io::{BoundedCapture, Captured};
use crate::sandbox::limits::{self, IsolationLevel, LimitStrategy};
use crate::sandbox::outcome::SENTINEL_EXIT_CODE;

/// Script passed with `-c`. The submission arrives on stdin and runs in a
/// fresh namespace so nothing the bootstrap imported is visible to it.
const BOOTSTRAP: &str = r#"import sys
source = sys.stdin.read()
del sys
exec(compile(source, "<user>", "exec"), {"__name__": "__main__"})
"#;

/// What a finished child process produced.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    /// Captured stdout, bounded to the output ceiling.
    pub stdout: Captured,
    /// Captured stderr, bounded to the output ceiling.
    pub stderr: Captured,
    /// Exit code, or the negated signal number if the child was killed.
    pub exit_code: i32,
    /// Whether resource ceilings were installed.
    pub isolation: IsolationLevel,
    /// Process id of the child.
    pub pid: Option<u32>,
}

/// Runs already-validated source somewhere isolated.
///
/// Implementations return `Err(SandboxError::Timeout)` when the wall-clock
/// deadline fires and any other error for launch failures.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Execute `source` and collect its output.
    async fn launch(&self, source: &str) -> Result<RawOutput>;
}

/// Callback invoked with the pid of every spawned child.
pub type SpawnHook = Arc<dyn Fn(u32) + Send + Sync>;

/// Launches the configured Python interpreter as a child process.
pub struct ChildLauncher {
    config: Arc<SandboxConfig>,
    strategy: Arc<dyn LimitStrategy>,
    spawn_hook: Option<SpawnHook>,
}

impl fmt::Debug for ChildLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildLauncher")
            .field("interpreter", &self.config.interpreter)
            .field("strategy", &self.strategy.name())
            .field("spawn_hook", &self.spawn_hook.is_some())
            .finish()
    }
}

impl ChildLauncher {
    /// Create a launcher using the platform's best ceiling strategy.
    pub fn new(config: Arc<SandboxConfig>) -> Self {
        Self::with_strategy(config, limits::detect())
    }

    /// Create a launcher with an explicit ceiling strategy.
    pub fn with_strategy(config: Arc<SandboxConfig>, strategy: Arc<dyn LimitStrategy>) -> Self {
        Self {
            config,
            strategy,
            spawn_hook: None,
        }
    }

    /// Register a callback that observes every spawned pid.
    pub fn on_spawn(mut self, hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.spawn_hook = Some(Arc::new(hook));
        self
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut command = Command::new(&self.config.interpreter);
        command
            .arg("-c")
            .arg(BOOTSTRAP)
            .current_dir(workdir)
            .env_clear()
            .envs(scrubbed_host_environment(&self.config.env_allowlist))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout can take down every descendant.
        // SAFETY: setpgid is async-signal-safe.
        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                use nix::unistd::{setpgid, Pid};
                setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
                Ok(())
            });
        }

        command
    }
}

#[async_trait]
impl Launcher for ChildLauncher {
    async fn launch(&self, source: &str) -> Result<RawOutput> {
        let scratch = tempfile::Builder::new()
            .prefix("drill-sandbox-")
            .tempdir_in(&self.config.scratch_root)
            .map_err(SandboxError::ScratchDir)?;

        let (mut child, isolation) = {
            let mut command = self.command(scratch.path());
            let isolation = self.strategy.install(&mut command, &self.config.ceilings);
            if isolation == IsolationLevel::Degraded {
                warn!(
                    strategy = self.strategy.name(),
                    "resource ceilings unavailable, running with degraded isolation"
                );
            }
            (command.spawn().map_err(SandboxError::Spawn)?, isolation)
        };
        let pid = child.id();
        if let (Some(hook), Some(pid)) = (&self.spawn_hook, pid) {
            hook(pid);
        }
        debug!(?pid, workdir = %scratch.path().display(), "interpreter spawned");

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::ExecutionFailed("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::ExecutionFailed("stderr was not captured".into()))?;
        let limit = self.config.max_output_bytes;

        let run = async {
            let (fed, out, err) = tokio::join!(
                feed_stdin(stdin, source),
                BoundedCapture::new(limit).drain(stdout),
                BoundedCapture::new(limit).drain(stderr),
            );
            fed?;
            let status = child.wait().await?;
            Ok::<_, SandboxError>((out?, err?, status))
        };
        let result = tokio::time::timeout(self.config.timeout, run).await;

        let output = match result {
            Ok(Ok((stdout, stderr, status))) => RawOutput {
                stdout,
                stderr,
                exit_code: exit_code(status),
                isolation,
                pid,
            },
            Ok(Err(e)) => {
                kill_tree(&mut child, pid).await;
                return Err(e);
            }
            Err(_) => {
                kill_tree(&mut child, pid).await;
                return Err(SandboxError::Timeout(self.config.timeout));
            }
        };

        if let Err(e) = scratch.close() {
            warn!(error = %e, "failed to remove scratch directory");
        }
        Ok(output)
    }
}

/// Write the submission to the child's stdin and close it.
async fn feed_stdin(stdin: Option<ChildStdin>, source: &str) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(source.as_bytes()).await {
        // The child exited before reading everything; its status says why.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// SIGKILL the child's whole process group, then reap the child.
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
            if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                debug!(pgid, error = %e, "killpg failed");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already gone");
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(SENTINEL_EXIT_CODE)
}
