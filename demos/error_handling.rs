//! Example demonstrating error handling patterns.
//!
//! This example shows the four ways an execution can end:
//! - Rejected by the policy check
//! - Completed, including with a Python exception
//! - Timed out
//! - Internal failure of the engine
//!
//! Run with: cargo run --example error_handling
//!
//! Note: Requires python3 on PATH

use std::time::Duration;
use drill_sandbox::prelude::*;

fn report(outcome: &ExecutionOutcome) {
    println!("kind: {:?}", outcome.kind());
    println!("exit_code: {}", outcome.exit_code);
    println!("timed_out: {}", outcome.timed_out);
    if let Some(error) = &outcome.error {
        println!("error:\n{}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Error Handling Example ===\n");

    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(2))
        .build();
    let sandbox = PythonSandbox::new(config)?;

    // Example 1: Python exception
    println!("--- Test 1: Python ValueError ---");
    {
        let outcome = sandbox.execute("int('not a number')").await;
        report(&outcome);
        println!("stderr:\n{}", outcome.stderr);

        if let Some(fault) = outcome.user_fault() {
            println!("\nParsed exception:");
            println!("  Type: {}", fault.exception_type);
            println!("  Message: {}", fault.message);
            if let Some(tb) = fault.traceback {
                println!("  Has traceback: {} lines", tb.lines().count());
            }
        }
    }

    // Example 2: Policy rejection, several violations at once
    println!("\n--- Test 2: Policy rejection ---");
    {
        let code = "import subprocess\nf = open('/etc/passwd')\nprint(f.__class__.__mro__)";
        report(&sandbox.execute(code).await);
    }

    // Example 3: Syntax error
    println!("\n--- Test 3: Syntax error ---");
    report(&sandbox.execute("def broken(:\n    pass").await);

    // Example 4: Timeout
    println!("\n--- Test 4: Timeout ---");
    report(&sandbox.execute("while True:\n    pass").await);

    // Example 5: Internal failure
    println!("\n--- Test 5: Missing interpreter ---");
    {
        let config = SandboxConfig::builder()
            .interpreter("/nonexistent/python3")
            .build();
        let broken = PythonSandbox::new(config)?;
        report(&broken.execute("print('never runs')").await);
    }

    // Example 6: Configuration error
    println!("\n--- Test 6: Invalid configuration ---");
    match PythonSandbox::new(SandboxConfig::builder().max_output_bytes(0).build()) {
        Ok(_) => println!("unexpectedly accepted"),
        Err(e) => println!("rejected: {}", e),
    }

    Ok(())
}
