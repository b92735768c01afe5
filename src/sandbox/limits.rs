//! OS resource ceilings for the child interpreter.
//!
//! Ceilings are installed by a [`LimitStrategy`]. On Linux the [`Rlimits`]
//! strategy calls `setrlimit` in the child between fork and exec; elsewhere
//! [`Unsupported`] installs nothing and reports degraded isolation, so the
//! wall-clock timeout and environment scrubbing are the only layers left.

use std::fmt;
use std::sync::Arc;

use tokio::process::Command;

/// Upper bounds applied to the child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCeilings {
    /// CPU time in seconds (`RLIMIT_CPU`).
    pub cpu_seconds: u64,
    /// Address space in bytes (`RLIMIT_AS`).
    pub max_memory: u64,
    /// Open file descriptors (`RLIMIT_NOFILE`).
    pub max_open_files: u64,
    /// Processes the child may create (`RLIMIT_NPROC`). Always zero by default.
    pub max_processes: u64,
}

impl Default for ResourceCeilings {
    fn default() -> Self {
        Self {
            cpu_seconds: 5,
            max_memory: 128 * 1024 * 1024, // 128MB
            max_open_files: 16,
            max_processes: 0,
        }
    }
}

/// How much OS-level protection an execution actually received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// All resource ceilings were installed.
    #[default]
    Full,
    /// No ceiling primitive was available; only timeout and env scrubbing apply.
    Degraded,
}

/// A way of applying [`ResourceCeilings`] to a command before it is spawned.
pub trait LimitStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Arrange for `ceilings` to be applied to the child and report the
    /// resulting isolation level.
    fn install(&self, command: &mut Command, ceilings: &ResourceCeilings) -> IsolationLevel;
}

/// `setrlimit`-based ceilings (Linux).
#[derive(Debug, Clone, Copy, Default)]
pub struct Rlimits;

impl LimitStrategy for Rlimits {
    fn name(&self) -> &'static str {
        "rlimit"
    }

    #[cfg(target_os = "linux")]
    fn install(&self, command: &mut Command, ceilings: &ResourceCeilings) -> IsolationLevel {
        let ceilings = *ceilings;
        // SAFETY: the hook runs between fork and exec and only calls
        // setrlimit, which is async-signal-safe. A failure aborts the spawn.
        unsafe {
            command.pre_exec(move || apply_rlimits(&ceilings).map_err(std::io::Error::from));
        }
        IsolationLevel::Full
    }

    #[cfg(not(target_os = "linux"))]
    fn install(&self, _command: &mut Command, _ceilings: &ResourceCeilings) -> IsolationLevel {
        IsolationLevel::Degraded
    }
}

#[cfg(target_os = "linux")]
fn apply_rlimits(ceilings: &ResourceCeilings) -> nix::Result<()> {
    use nix::sys::resource::{setrlimit, Resource};

    setrlimit(Resource::RLIMIT_CPU, ceilings.cpu_seconds, ceilings.cpu_seconds)?;
    setrlimit(Resource::RLIMIT_AS, ceilings.max_memory, ceilings.max_memory)?;
    setrlimit(
        Resource::RLIMIT_NOFILE,
        ceilings.max_open_files,
        ceilings.max_open_files,
    )?;
    setrlimit(
        Resource::RLIMIT_NPROC,
        ceilings.max_processes,
        ceilings.max_processes,
    )?;
    Ok(())
}

/// Installs nothing; used where no ceiling primitive exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl LimitStrategy for Unsupported {
    fn name(&self) -> &'static str {
        "none"
    }

    fn install(&self, _command: &mut Command, _ceilings: &ResourceCeilings) -> IsolationLevel {
        IsolationLevel::Degraded
    }
}

/// Pick the best strategy for the current platform.
pub fn detect() -> Arc<dyn LimitStrategy> {
    if cfg!(target_os = "linux") {
        Arc::new(Rlimits)
    } else {
        Arc::new(Unsupported)
    }
}
