//! Example of concurrent Python code execution.
//!
//! One sandbox is shared across tasks; each execution gets its own process
//! and scratch directory.
//!
//! Run with: cargo run --example concurrent_execution
//!
//! Note: Requires python3 on PATH

use std::time::{Duration, Instant};
use drill_sandbox::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Concurrent Execution Example ===\n");

    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(10))
        .build();
    let sandbox = PythonSandbox::new(config)?;

    // Define some Python tasks to run concurrently
    let tasks = vec![
        (
            "Task 1",
            "print(sum([i**2 for i in range(100)]))",
            "Sum of squares",
        ),
        (
            "Task 2",
            "print(len([x for x in range(1000) if x % 3 == 0]))",
            "Count divisible by 3",
        ),
        (
            "Task 3",
            "print(''.join([chr(65 + i % 26) for i in range(50)]))",
            "Generate letters",
        ),
        (
            "Task 4",
            "import math\nprint(math.factorial(20))",
            "Factorial",
        ),
        (
            "Task 5",
            "import os\nprint(os.getcwd())",
            "Rejected import",
        ),
    ];

    let start = Instant::now();
    let mut handles = Vec::new();

    for (name, code, description) in tasks {
        let sandbox = sandbox.clone();
        handles.push(tokio::spawn(async move {
            let outcome = sandbox.execute(code).await;
            (name, description, outcome)
        }));
    }

    for handle in handles {
        match handle.await {
            Ok((name, description, outcome)) => {
                println!("{} ({}):", name, description);
                match &outcome.error {
                    None => println!("  stdout: {}", outcome.stdout.trim()),
                    Some(error) => println!("  error: {}", error),
                }
                println!("  kind: {:?}, took {:?}", outcome.kind(), outcome.metadata.duration);
            }
            Err(e) => eprintln!("Task panicked: {}", e),
        }
    }

    println!("\nAll tasks finished in {:?}", start.elapsed());
    Ok(())
}
