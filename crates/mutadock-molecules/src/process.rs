//! External engine invocation with explicit timeouts.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Timeout for `--help` capability probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether a backend executable answered its capability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => f.write_str("available"),
            Self::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },
}

/// Captured result of one finished external run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Last non-empty stderr line, or the exit code when stderr is silent.
    pub fn failure_summary(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

/// A named executable, run one call at a time.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    executable: PathBuf,
}

impl ExternalTool {
    pub fn new<P: AsRef<Path>>(executable: P) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn display_name(&self) -> String {
        self.executable.display().to_string()
    }

    /// Run to completion or kill the child once `timeout` elapses.
    pub async fn run<I, S>(&self, args: I, timeout: Duration) -> Result<ProcessOutput, RunError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {:?}", command.as_std());

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(result) => result.map_err(|source| RunError::Spawn {
                program: self.display_name(),
                source,
            })?,
            Err(_) => {
                return Err(RunError::TimedOut {
                    program: self.display_name(),
                    secs: timeout.as_secs(),
                })
            }
        };

        Ok(ProcessOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Invoke `--help`. Any exit status counts as available, only a missing
    /// executable or a hang does not.
    pub async fn probe(&self, timeout: Duration) -> Availability {
        match self.run(["--help"], timeout).await {
            Ok(_) => {
                debug!("{} is available", self.display_name());
                Availability::Available
            }
            Err(e) => {
                debug!("{} is unavailable: {}", self.display_name(), e);
                Availability::Unavailable(e.to_string())
            }
        }
    }
}
