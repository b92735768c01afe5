//! # Drill Sandbox
//!
//! Runs untrusted Python snippets submitted by learners and returns what they
//! printed, without letting them touch the host.
//!
//! Every submission goes through the same pipeline:
//!
//! - **Static check**: the source is parsed (never executed) and rejected if
//!   it imports a module outside the allow-list, references a blocked builtin
//!   such as `eval` or `open`, or reaches for introspection attributes like
//!   `__globals__`
//! - **Disposable process**: accepted code runs in a fresh `python3` child with
//!   a scrubbed environment, a throwaway working directory and OS resource
//!   ceilings (CPU time, address space, open files, child processes)
//! - **Wall-clock deadline**: the whole process group is killed when the
//!   timeout fires
//! - **Output ceiling**: each stream is cut at a byte budget with a visible
//!   marker
//!
//! ## Example
//!
//! ```rust,no_run
//! use drill_sandbox::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SandboxConfig::builder()
//!         .timeout(Duration::from_secs(5))
//!         .max_memory(64 * 1024 * 1024)
//!         .build();
//!
//!     let sandbox = PythonSandbox::new(config)?;
//!     let outcome = sandbox.execute("print(1 + 1)").await;
//!
//!     assert_eq!(outcome.stdout.trim(), "2");
//!     assert!(outcome.is_success());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Security Model
//!
//! The static check is a first filter, not a boundary: Python offers too many
//! indirect routes to dangerous objects for a syntax-level check to close
//! them all. The process-level restrictions are what actually contain code
//! that slips through. The check applies to submitted source only: allowed
//! libraries such as `numpy` still use `os` and friends internally.
//!
//! 1. **Policy check**: obvious escapes are refused before anything runs
//! 2. **Environment scrubbing**: only allow-listed variables reach the child
//! 3. **Resource ceilings**: `setrlimit` in the child before `exec` on Linux;
//!    elsewhere execution proceeds with [`IsolationLevel::Degraded`], which is
//!    logged and reported in [`ExecutionMetadata`]
//! 4. **Process-group kill**: a timeout takes down every descendant

pub mod error;
pub mod prelude;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use error::{Result, SandboxError};
pub use sandbox::cache::TtlCache;
pub use sandbox::config::{SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::PythonSandbox;
pub use sandbox::fault::UserFault;
pub use sandbox::limits::{IsolationLevel, ResourceCeilings};
pub use sandbox::outcome::{
    ExecutionMetadata, ExecutionOutcome, ExecutionRequest, OutcomeKind, SENTINEL_EXIT_CODE,
};
pub use sandbox::policy::{Policy, Violation, ViolationKind};
pub use sandbox::probe::InterpreterStatus;
pub use sandbox::runner::{ChildLauncher, Launcher, RawOutput};
