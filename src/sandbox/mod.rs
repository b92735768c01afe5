//! Sandbox module containing all execution-related components.

pub mod cache;
pub mod config;
pub mod env;
pub mod executor;
pub mod fault;
pub mod io;
pub mod limits;
pub mod outcome;
pub mod policy;
pub mod probe;
pub mod runner;
