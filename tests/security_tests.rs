//! Security tests to verify sandbox isolation.
//!
//! The first group checks that the static policy turns away escape attempts
//! before any process exists. The rest run real submissions through a host
//! `python3` and are skipped when none is installed.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use drill_sandbox::prelude::*;
use drill_sandbox::sandbox::io::truncation_marker;
use drill_sandbox::sandbox::probe::find_on_path;
use drill_sandbox::{ChildLauncher, IsolationLevel, Launcher, RawOutput, SENTINEL_EXIT_CODE};

/// Launcher that records every launch and never starts a process.
#[derive(Default)]
struct SpyLauncher {
    launches: AtomicUsize,
}

#[async_trait]
impl Launcher for SpyLauncher {
    async fn launch(&self, _source: &str) -> Result<RawOutput> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(RawOutput::default())
    }
}

fn spy_sandbox() -> (PythonSandbox, Arc<SpyLauncher>) {
    let spy = Arc::new(SpyLauncher::default());
    let sandbox =
        PythonSandbox::with_launcher(SandboxConfig::default(), Arc::clone(&spy) as Arc<dyn Launcher>)
            .unwrap();
    (sandbox, spy)
}

fn python_available() -> bool {
    if find_on_path(Path::new("python3")).is_some() {
        return true;
    }
    eprintln!("Skipping: no python3 on PATH");
    false
}

/// Helper to create a test sandbox config.
fn test_config() -> SandboxConfig {
    SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .build()
}

/// Escape attempts are refused without creating a process.
#[tokio::test]
async fn test_escape_attempts_never_spawn() {
    let (sandbox, spy) = spy_sandbox();
    let attempts = [
        "import os\nos.system('id')",
        "import subprocess",
        "from os import path",
        "import socket",
        "import ctypes",
        "import pickle",
        "eval('1+1')",
        "exec('print(1)')",
        "__import__('os')",
        "open('/etc/passwd').read()",
        "e = eval\ne('1')",
        "().__class__.__bases__[0].__subclasses__()",
        "(lambda: 0).__globals__",
        "getattr(print, 'x')",
        "print('__builtins__')",
        "breakpoint()",
    ];

    for code in attempts {
        let outcome = sandbox.execute(code).await;
        assert_eq!(outcome.kind(), OutcomeKind::Rejected, "not rejected: {code:?}");
        assert_eq!(outcome.exit_code, SENTINEL_EXIT_CODE);
        assert!(!outcome.timed_out);
        assert!(outcome.stdout.is_empty() && outcome.stderr.is_empty());
    }
    assert_eq!(spy.launches.load(Ordering::SeqCst), 0);
}

/// Rejection diagnostics name the offending construct and its line.
#[tokio::test]
async fn test_rejection_messages() {
    let (sandbox, _) = spy_sandbox();

    let outcome = sandbox.execute("x = 1\nimport os").await;
    assert_eq!(
        outcome.error.as_deref(),
        Some("Blocked import: 'os' is not allowed (line 2)")
    );

    let outcome = sandbox.execute("eval('1+1')").await;
    assert_eq!(
        outcome.error.as_deref(),
        Some("Blocked builtin: 'eval()' is not allowed (line 1)")
    );

    let outcome = sandbox.execute("def f(:\n    pass").await;
    let error = outcome.error.unwrap();
    assert!(error.starts_with("SyntaxError: "), "{error}");
    assert!(error.ends_with("(line 1)"), "{error}");
}

/// Allowed modules pass the check and reach the launcher.
#[tokio::test]
async fn test_allowed_code_reaches_launcher() {
    let (sandbox, spy) = spy_sandbox();
    let outcome = sandbox
        .execute("import math\nfrom collections import Counter\nprint(math.pi)")
        .await;

    assert_eq!(outcome.kind(), OutcomeKind::Completed);
    assert_eq!(spy.launches.load(Ordering::SeqCst), 1);
}

/// Plain output is passed through untouched.
#[tokio::test]
async fn test_hello_passthrough() {
    if !python_available() {
        return;
    }
    let sandbox = PythonSandbox::new(test_config()).unwrap();
    let outcome = sandbox.execute("print('hello')").await;

    assert_eq!(outcome.stdout, "hello\n");
    assert_eq!(outcome.stderr, "");
    assert_eq!(outcome.exit_code, 0);
    assert!(!outcome.timed_out);
    assert!(outcome.error.is_none());
}

/// An exception in user code is a completed run, not an engine error.
#[tokio::test]
async fn test_user_exception_is_completed() {
    if !python_available() {
        return;
    }
    let sandbox = PythonSandbox::new(test_config()).unwrap();
    let outcome = sandbox.execute("print('before')\n1 / 0").await;

    assert_eq!(outcome.kind(), OutcomeKind::Completed);
    assert_eq!(outcome.stdout, "before\n");
    assert_ne!(outcome.exit_code, 0);
    assert!(outcome.error.is_none());
    assert!(outcome.stderr.contains("ZeroDivisionError"));

    let fault = outcome.user_fault().unwrap();
    assert_eq!(fault.exception_type, "ZeroDivisionError");
}

/// Output past the ceiling is cut at exactly the ceiling plus the marker.
#[tokio::test]
async fn test_output_truncation_is_exact() {
    if !python_available() {
        return;
    }
    let sandbox = PythonSandbox::new(test_config()).unwrap();
    let outcome = sandbox.execute("print('x' * 20000)").await;

    let expected = format!("{}{}", "x".repeat(10_000), truncation_marker(10_000));
    assert_eq!(outcome.stdout, expected);
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.metadata.stdout_truncated);
    assert!(!outcome.metadata.stderr_truncated);
}

/// Infinite loops are killed at the deadline and the process is gone.
#[tokio::test]
async fn test_infinite_loop_timeout() {
    if !python_available() {
        return;
    }
    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(1))
        .cpu_seconds(30)
        .build();
    let pids = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&pids);
    let launcher = ChildLauncher::new(Arc::new(config.clone()))
        .on_spawn(move |pid| seen.lock().unwrap().push(pid));
    let sandbox = PythonSandbox::with_launcher(config, Arc::new(launcher)).unwrap();

    let outcome = sandbox.execute("print('started')\nwhile True:\n    pass").await;

    assert!(outcome.timed_out);
    assert_eq!(outcome.exit_code, SENTINEL_EXIT_CODE);
    assert_eq!(outcome.error.as_deref(), Some("Execution timed out (1s limit)"));
    assert!(outcome.stdout.is_empty(), "partial output must be discarded");

    let pids = pids.lock().unwrap().clone();
    assert_eq!(pids.len(), 1);

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let pid = Pid::from_raw(i32::try_from(pids[0]).unwrap());
        assert_eq!(kill(pid, None), Err(Errno::ESRCH), "child still alive");
    }
}

/// Processes started by the submission die with it at the deadline.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_descendants() {
    use drill_sandbox::sandbox::limits::Unsupported;
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if !python_available() || find_on_path(Path::new("sleep")).is_none() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(2))
        .scratch_root(root.path())
        .build();
    // No ceilings, so the process limit cannot stop the spawn.
    let launcher = ChildLauncher::with_strategy(Arc::new(config), Arc::new(Unsupported));

    let code = "import os, subprocess\n\
                p = subprocess.Popen(['sleep', '60'])\n\
                with open(os.path.join('..', 'grandchild.pid'), 'w') as f:\n    \
                f.write(str(p.pid))\n\
                while True:\n    pass";
    let err = launcher.launch(code).await.unwrap_err();
    assert!(err.is_timeout(), "{err}");

    let pid_file = root.path().join("grandchild.pid");
    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    // Once killed it is either reaped or left as a zombie under init.
    let dead = || {
        if kill(Pid::from_raw(pid), None) == Err(Errno::ESRCH) {
            return true;
        }
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.trim_start().chars().next()
            })
            .map_or(true, |state| state == 'Z')
    };
    let mut waited = Duration::ZERO;
    while !dead() && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    assert!(dead(), "grandchild {pid} outlived the timeout");
}

/// Host secrets never reach the child, even for code that bypasses the
/// policy check.
#[tokio::test]
async fn test_environment_is_scrubbed() {
    if !python_available() {
        return;
    }
    std::env::set_var("DRILL_SANDBOX_TEST_SECRET", "hunter2");

    let config = Arc::new(test_config());
    let launcher = ChildLauncher::new(Arc::clone(&config));
    let raw = launcher
        .launch("import os\nfor key in sorted(os.environ):\n    print(key)")
        .await
        .unwrap();
    let outcome = ExecutionOutcome::completed(raw, config.max_output_bytes);

    // Set by the interpreter (C locale coercion) or by a shell wrapper such
    // as a pyenv shim in front of it.
    const INTERPRETER_SET: [&str; 5] = ["LC_CTYPE", "PWD", "OLDPWD", "SHLVL", "_"];

    assert_eq!(outcome.exit_code, 0, "{}", outcome.stderr);
    for key in outcome.stdout.lines() {
        assert!(
            config.env_allowlist.iter().any(|allowed| allowed == key)
                || INTERPRETER_SET.contains(&key),
            "unexpected variable in child: {key}"
        );
    }
    assert!(!outcome.stdout.contains("DRILL_SANDBOX_TEST_SECRET"));
}

/// The child starts in an empty scratch directory that is removed afterwards.
#[tokio::test]
async fn test_scratch_directory_is_disposable() {
    if !python_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .scratch_root(root.path())
        .build();
    let launcher = ChildLauncher::new(Arc::new(config));
    let raw = launcher
        .launch("import os\nprint(os.listdir('.'))\nopen('left-behind.txt', 'w').write('x')")
        .await
        .unwrap();

    assert_eq!(raw.exit_code, 0);
    assert_eq!(raw.stdout.bytes, b"[]\n");
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

/// Memory allocations beyond the address-space ceiling fail inside Python.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_memory_ceiling() {
    if !python_available() {
        return;
    }
    let sandbox = PythonSandbox::new(test_config()).unwrap();
    let outcome = sandbox.execute("x = bytearray(512 * 1024 * 1024)").await;

    assert_eq!(outcome.metadata.isolation, Some(IsolationLevel::Full));
    assert_ne!(outcome.exit_code, 0);
    assert!(!outcome.timed_out);
    assert!(outcome.stderr.contains("MemoryError"), "{}", outcome.stderr);
}

/// Burning CPU past the CPU ceiling kills the child before the deadline.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cpu_ceiling() {
    if !python_available() {
        return;
    }
    let config = SandboxConfig::builder()
        .cpu_seconds(1)
        .timeout(Duration::from_secs(20))
        .build();
    let sandbox = PythonSandbox::new(config).unwrap();
    let outcome = sandbox.execute("while True:\n    pass").await;

    assert!(!outcome.timed_out);
    assert!(outcome.error.is_none());
    assert!(outcome.exit_code < 0, "expected signal exit, got {}", outcome.exit_code);
}
