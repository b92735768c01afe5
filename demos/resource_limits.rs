//! Example of the OS resource ceilings applied to every child.
//!
//! Run with: cargo run --example resource_limits
//!
//! Note: Requires python3 on PATH. Ceilings are only enforced on Linux;
//! elsewhere outcomes report degraded isolation.

use std::time::Duration;
use drill_sandbox::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Resource Limits Example ===\n");

    let config = SandboxConfig::builder()
        .cpu_seconds(1)
        .max_memory(64 * 1024 * 1024)
        .max_open_files(16)
        .timeout(Duration::from_secs(5))
        .max_output_bytes(200)
        .build();
    println!("Ceilings: {:?}\n", config.ceilings);
    let sandbox = PythonSandbox::new(config)?;

    // Memory ceiling
    println!("--- Memory: allocate 256MB ---");
    let outcome = sandbox.execute("data = bytearray(256 * 1024 * 1024)\nprint(len(data))").await;
    println!("isolation: {:?}", outcome.metadata.isolation);
    println!("exit_code: {}", outcome.exit_code);
    println!("stderr tail: {}", outcome.stderr.lines().last().unwrap_or(""));

    // CPU ceiling fires before the wall-clock timeout
    println!("\n--- CPU: busy loop ---");
    let outcome = sandbox.execute("while True:\n    pass").await;
    println!("exit_code: {} (negative means killed by signal)", outcome.exit_code);
    println!("timed_out: {}", outcome.timed_out);

    // With a generous CPU ceiling the wall-clock deadline fires instead
    println!("\n--- Wall clock: busy loop, 30s CPU allowance ---");
    let patient = PythonSandbox::new(
        SandboxConfig::builder()
            .cpu_seconds(30)
            .timeout(Duration::from_secs(2))
            .build(),
    )?;
    let outcome = patient.execute("while True:\n    pass").await;
    println!("kind: {:?}", outcome.kind());
    println!("error: {:?}", outcome.error);

    // Output ceiling
    println!("\n--- Output: print 1000 characters ---");
    let outcome = sandbox.execute("print('x' * 1000)").await;
    println!("stdout ({} bytes):\n{}", outcome.stdout.len(), outcome.stdout);
    println!("truncated: {}", outcome.metadata.stdout_truncated);

    Ok(())
}
