//! Drill Sandbox command-line runner
//!
//! Reads one execution request, runs it through the sandbox and prints the
//! outcome as JSON on stdout. Logs go to stderr.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use drill_sandbox::{ExecutionRequest, PythonSandbox, SandboxConfig, TtlCache};
use tracing::info;

/// Run an untrusted Python snippet inside the drill sandbox
#[derive(Parser, Debug)]
#[command(name = "drill-sandbox")]
#[command(about = "Run untrusted Python snippets under policy and resource limits")]
#[command(version)]
struct Args {
    /// Treat input as Python source instead of a JSON request
    #[arg(long)]
    raw: bool,

    /// Read input from a file instead of stdin
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Report whether the interpreter is reachable and exit
    #[arg(long)]
    probe: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "drill_sandbox=info,warn".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

fn read_input(args: &Args) -> anyhow::Result<String> {
    match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("failed to read stdin")?;
            Ok(input)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    let config = SandboxConfig::from_env().context("invalid sandbox configuration")?;
    let sandbox = PythonSandbox::new(config)?;

    if args.probe {
        let mut cache = TtlCache::new(std::time::Duration::ZERO);
        let status = sandbox.interpreter_status(&mut cache).await;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let input = read_input(&args)?;
    let request = if args.raw {
        ExecutionRequest::new(input)
    } else {
        serde_json::from_str(&input).context("input is not a valid execution request")?
    };

    let outcome = sandbox.handle(&request).await;
    info!(
        kind = ?outcome.kind(),
        duration_ms = outcome.metadata.duration.as_millis() as u64,
        "request handled"
    );
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
