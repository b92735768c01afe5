//! Example of configuring the policy and loading settings from the
//! environment.
//!
//! Run with: cargo run --example policy_and_config
//!
//! Note: Requires python3 on PATH

use std::time::Duration;
use drill_sandbox::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Policy and Configuration Example ===\n");

    // Static check only, nothing is executed
    println!("--- Validating without running ---");
    let policy = Policy::default();
    for violation in policy.validate("import os\nx = eval\nprint(x.__globals__)") {
        println!("  {} [{:?}]", violation, violation.kind);
    }

    // Extend the defaults for a course that teaches the time module
    println!("\n--- Extended policy ---");
    let config = SandboxConfig::builder()
        .policy(Policy::default().allow_module("time").block_callable("print"))
        .timeout(Duration::from_secs(5))
        .build();
    let sandbox = PythonSandbox::new(config)?;
    let outcome = sandbox.execute("import time\nprint(time.time() > 0)").await;
    println!("error: {:?}", outcome.error);
    let outcome = sandbox.execute("import time\nx = time.monotonic()").await;
    println!("kind: {:?}, exit_code: {}", outcome.kind(), outcome.exit_code);

    // Environment-driven configuration, e.g. SANDBOX_TIMEOUT_SECS=3
    println!("\n--- From environment ---");
    match SandboxConfig::from_env() {
        Ok(config) => {
            println!("timeout: {:?}", config.timeout);
            println!("max_output_bytes: {}", config.max_output_bytes);
            println!("env_allowlist: {:?}", config.env_allowlist);
            println!("interpreter: {}", config.interpreter.display());
        }
        Err(e) => eprintln!("invalid configuration: {}", e),
    }

    // Requests as they arrive from a web caller
    println!("\n--- JSON request ---");
    let request: ExecutionRequest = serde_json::from_str(r#"{"code": "print(sum(range(10)))"}"#)
        .map_err(|e| SandboxError::Config(e.to_string()))?;
    let outcome = PythonSandbox::new(SandboxConfig::default())?.handle(&request).await;
    println!("stdout: {}", outcome.stdout.trim());

    Ok(())
}
