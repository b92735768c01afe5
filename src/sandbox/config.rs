//! Sandbox configuration with builder pattern.
//!
//! A [`SandboxConfig`] is built once at startup, either programmatically or
//! from the process environment, and is read-only afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SandboxError};
use crate::sandbox::limits::ResourceCeilings;
use crate::sandbox::policy::Policy;

/// Host environment variables forwarded into the child by default.
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "PYTHONPATH",
    "VIRTUAL_ENV",
    "PYTHONHASHSEED",
];

/// Configuration for the Python sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Allow/deny sets the static checker enforces.
    pub policy: Policy,
    /// OS-level ceilings applied to the child before it runs any code.
    pub ceilings: ResourceCeilings,
    /// Maximum wall-clock time before the process tree is killed.
    pub timeout: Duration,
    /// Maximum bytes kept per output stream.
    pub max_output_bytes: usize,
    /// Names of host environment variables the child may see.
    pub env_allowlist: Vec<String>,
    /// Interpreter executable, resolved through the child's `PATH`.
    pub interpreter: PathBuf,
    /// Directory under which per-invocation scratch directories are created.
    pub scratch_root: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            ceilings: ResourceCeilings::default(),
            timeout: Duration::from_secs(10),
            max_output_bytes: 10_000,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            interpreter: PathBuf::from("python3"),
            scratch_root: std::env::temp_dir(),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Build a configuration from the process environment.
    ///
    /// Recognised variables: `SANDBOX_CPU_SECONDS`, `SANDBOX_MEMORY_BYTES`,
    /// `SANDBOX_MAX_OPEN_FILES`, `SANDBOX_TIMEOUT_SECS`,
    /// `SANDBOX_MAX_OUTPUT_BYTES`, `SANDBOX_ENV_ALLOWLIST` (comma separated),
    /// `SANDBOX_PYTHON` and `SANDBOX_SCRATCH_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| -> Result<Option<u64>> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
                    SandboxError::Config(format!("{key}={raw:?} is not a number: {e}"))
                }),
            }
        };

        let mut builder = SandboxConfig::builder();
        if let Some(secs) = parse("SANDBOX_CPU_SECONDS")? {
            builder = builder.cpu_seconds(secs);
        }
        if let Some(bytes) = parse("SANDBOX_MEMORY_BYTES")? {
            builder = builder.max_memory(bytes);
        }
        if let Some(files) = parse("SANDBOX_MAX_OPEN_FILES")? {
            builder = builder.max_open_files(files);
        }
        if let Some(secs) = parse("SANDBOX_TIMEOUT_SECS")? {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(bytes) = parse("SANDBOX_MAX_OUTPUT_BYTES")? {
            let bytes = usize::try_from(bytes)
                .map_err(|_| SandboxError::Config("SANDBOX_MAX_OUTPUT_BYTES is too large".into()))?;
            builder = builder.max_output_bytes(bytes);
        }
        if let Some(list) = lookup("SANDBOX_ENV_ALLOWLIST") {
            builder = builder.env_allowlist(
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty()),
            );
        }
        if let Some(python) = lookup("SANDBOX_PYTHON") {
            builder = builder.interpreter(python);
        }
        if let Some(dir) = lookup("SANDBOX_SCRATCH_DIR") {
            builder = builder.scratch_root(dir);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make every execution fail.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(SandboxError::Config("timeout must be greater than zero".into()));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::Config(
                "max_output_bytes must be greater than zero".into(),
            ));
        }
        if self.interpreter.as_os_str().is_empty() {
            return Err(SandboxError::Config("interpreter path is empty".into()));
        }
        Ok(())
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    policy: Option<Policy>,
    cpu_seconds: Option<u64>,
    max_memory: Option<u64>,
    max_open_files: Option<u64>,
    timeout: Option<Duration>,
    max_output_bytes: Option<usize>,
    env_allowlist: Option<Vec<String>>,
    interpreter: Option<PathBuf>,
    scratch_root: Option<PathBuf>,
}

impl SandboxConfigBuilder {
    /// Replace the allow/deny policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the CPU-time ceiling in seconds.
    pub fn cpu_seconds(mut self, secs: u64) -> Self {
        self.cpu_seconds = Some(secs);
        self
    }

    /// Set the address-space ceiling in bytes.
    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Set the open file descriptor ceiling.
    pub fn max_open_files(mut self, files: u64) -> Self {
        self.max_open_files = Some(files);
        self
    }

    /// Set the wall-clock timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the per-stream output ceiling in bytes.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Replace the environment allow-list.
    pub fn env_allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_allowlist = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Set the interpreter executable.
    pub fn interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(path.into());
        self
    }

    /// Set the directory scratch directories are created in.
    pub fn scratch_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(path.into());
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        let ceilings = ResourceCeilings {
            cpu_seconds: self.cpu_seconds.unwrap_or(default.ceilings.cpu_seconds),
            max_memory: self.max_memory.unwrap_or(default.ceilings.max_memory),
            max_open_files: self.max_open_files.unwrap_or(default.ceilings.max_open_files),
            ..default.ceilings
        };
        SandboxConfig {
            policy: self.policy.unwrap_or(default.policy),
            ceilings,
            timeout: self.timeout.unwrap_or(default.timeout),
            max_output_bytes: self.max_output_bytes.unwrap_or(default.max_output_bytes),
            env_allowlist: self.env_allowlist.unwrap_or(default.env_allowlist),
            interpreter: self.interpreter.unwrap_or(default.interpreter),
            scratch_root: self.scratch_root.unwrap_or(default.scratch_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_output_bytes, 10_000);
        assert_eq!(config.ceilings.cpu_seconds, 5);
        assert_eq!(config.ceilings.max_memory, 128 * 1024 * 1024);
        assert_eq!(config.ceilings.max_processes, 0);
        assert!(config.env_allowlist.iter().any(|name| name == "PATH"));
    }

    #[test]
    fn test_builder() {
        let config = SandboxConfig::builder()
            .timeout(Duration::from_secs(2))
            .max_memory(64 * 1024 * 1024)
            .max_output_bytes(512)
            .env_allowlist(["PATH"])
            .build();

        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.ceilings.max_memory, 64 * 1024 * 1024);
        assert_eq!(config.ceilings.cpu_seconds, 5);
        assert_eq!(config.max_output_bytes, 512);
        assert_eq!(config.env_allowlist, vec!["PATH".to_string()]);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("SANDBOX_TIMEOUT_SECS", "3"),
            ("SANDBOX_MAX_OUTPUT_BYTES", "2048"),
            ("SANDBOX_ENV_ALLOWLIST", "PATH, LANG,,"),
            ("SANDBOX_PYTHON", "/usr/bin/python3"),
        ]
        .into_iter()
        .collect();

        let config =
            SandboxConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_output_bytes, 2048);
        assert_eq!(config.env_allowlist, vec!["PATH".to_string(), "LANG".to_string()]);
        assert_eq!(config.interpreter, PathBuf::from("/usr/bin/python3"));
        assert_eq!(config.ceilings.cpu_seconds, 5);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = SandboxConfig::from_lookup(|key| {
            (key == "SANDBOX_CPU_SECONDS").then(|| "five".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));

        let err = SandboxConfig::from_lookup(|key| {
            (key == "SANDBOX_TIMEOUT_SECS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }
}
