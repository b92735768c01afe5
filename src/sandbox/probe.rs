//! Interpreter reachability probe.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::sandbox::config::SandboxConfig;
use crate::sandbox::env::scrubbed_host_environment;

const PROBE_SCRIPT: &str = "import sys; print('.'.join(map(str, sys.version_info[:3])))";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the configured interpreter can be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterpreterStatus {
    /// The interpreter ran the probe script successfully.
    pub available: bool,
    /// Reported `major.minor.micro` version.
    pub version: Option<String>,
    /// Why the probe failed.
    pub detail: Option<String>,
}

impl InterpreterStatus {
    fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            available: false,
            version: None,
            detail: Some(detail.into()),
        }
    }
}

/// Resolve `program` against the host `PATH` the way a shell would.
///
/// Paths containing a separator are checked as given.
pub fn find_on_path(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Start the interpreter with the sandbox's scrubbed environment and ask it
/// for its version.
pub async fn probe_interpreter(config: &SandboxConfig) -> InterpreterStatus {
    if find_on_path(&config.interpreter).is_none() {
        return InterpreterStatus::unavailable(format!(
            "{} not found",
            config.interpreter.display()
        ));
    }

    let output = Command::new(&config.interpreter)
        .arg("-c")
        .arg(PROBE_SCRIPT)
        .env_clear()
        .envs(scrubbed_host_environment(&config.env_allowlist))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let status = match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => InterpreterStatus {
            available: true,
            version: Some(String::from_utf8_lossy(&output.stdout).trim().to_string()),
            detail: None,
        },
        Ok(Ok(output)) => InterpreterStatus::unavailable(format!(
            "probe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )),
        Ok(Err(e)) => InterpreterStatus::unavailable(format!("failed to start: {e}")),
        Err(_) => InterpreterStatus::unavailable("probe timed out"),
    };
    debug!(available = status.available, version = ?status.version, "interpreter probed");
    status
}
