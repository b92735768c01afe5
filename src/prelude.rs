//! Prelude module for convenient imports.

pub use crate::error::{Result, SandboxError};
pub use crate::sandbox::{
    config::SandboxConfig,
    executor::PythonSandbox,
    outcome::{ExecutionOutcome, ExecutionRequest, OutcomeKind},
    policy::Policy,
};
