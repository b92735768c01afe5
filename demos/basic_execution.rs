//! Basic example of executing Python code in the sandbox.
//!
//! Run with: cargo run --example basic_execution
//!
//! Note: Requires python3 on PATH

use std::time::Duration;
use drill_sandbox::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Configure the sandbox
    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .max_memory(64 * 1024 * 1024) // 64MB
        .build();

    println!("Creating sandbox with config: {:?}", config);

    let sandbox = PythonSandbox::new(config)?;

    // Execute simple arithmetic
    println!("\n=== Test 1: Simple arithmetic ===");
    let outcome = sandbox.execute("print(1 + 1)").await;
    println!("stdout: {}", outcome.stdout);
    println!("stderr: {}", outcome.stderr);
    println!("exit_code: {}", outcome.exit_code);
    println!("duration: {:?}", outcome.metadata.duration);
    println!("isolation: {:?}", outcome.metadata.isolation);
    if let Some(error) = &outcome.error {
        eprintln!("Error: {}", error);
        eprintln!("Make sure python3 is installed and on PATH");
    }

    // Execute with a loop
    println!("\n=== Test 2: Loop execution ===");
    let code = r#"
for i in range(5):
    print(f"Count: {i}")
"#;
    let outcome = sandbox.execute(code).await;
    println!("stdout:\n{}", outcome.stdout);
    println!("exit_code: {}", outcome.exit_code);

    // Test error handling
    println!("\n=== Test 3: Python error ===");
    let outcome = sandbox.execute("raise ValueError('test error')").await;
    println!("stderr:\n{}", outcome.stderr);
    println!("exit_code: {}", outcome.exit_code);

    // Wire format as a web caller would relay it
    println!("\n=== Test 4: JSON response ===");
    let outcome = sandbox.execute("print('hello')").await;
    println!("{}", serde_json::to_string_pretty(&outcome).unwrap_or_default());

    Ok(())
}
