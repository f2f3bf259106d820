//! One bounded run of an external program.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use dd_core::{Error, Result};
use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// What a finished run left behind.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: ExitStatus,
    pub stdout: String,
    /// MP4Box reports progress and errors here.
    pub stderr: String,
}

impl RunOutput {
    /// Last non-empty stderr line, which is where MP4Box puts its reason
    /// for failing.
    pub fn last_error_line(&self) -> Option<&str> {
        self.stderr.lines().map(str::trim).rev().find(|l| !l.is_empty())
    }
}

/// Program, arguments, working directory and deadline for one run.
///
/// Stdin is closed and both output streams are captured. A run that outlives
/// its deadline is killed.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run inside `dir`, so relative output names land there.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    fn display_name(&self) -> String {
        match self.program.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => self.program.display().to_string(),
        }
    }

    /// Run to completion. A spawn failure, a non-zero exit and an elapsed
    /// deadline are all [`Error::Tool`].
    pub async fn run(&self) -> Result<RunOutput> {
        let name = self.display_name();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        tracing::debug!(tool = %name, args = ?self.args, cwd = ?self.cwd, "running");
        let child = command
            .spawn()
            .map_err(|e| Error::tool(&name, format!("could not start: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::tool(&name, format!("lost track of process: {e}"))),
            Err(_) => {
                return Err(Error::tool(
                    &name,
                    format!("killed after {}s", self.timeout.as_secs_f64()),
                ))
            }
        };

        let out = RunOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !out.status.success() {
            let reason = out.last_error_line().unwrap_or("no diagnostic output");
            return Err(Error::tool(&name, format!("{}: {reason}", out.status)));
        }
        Ok(out)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = Invocation::new("sh")
            .args(["-c", "pwd; echo progress >&2"])
            .current_dir(dir.path())
            .run()
            .await
            .unwrap();
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(out.stdout.trim(), cwd.to_string_lossy());
        assert_eq!(out.last_error_line(), Some("progress"));
    }

    #[tokio::test]
    async fn unknown_program_cannot_start() {
        let err = Invocation::new("dvrdash-no-such-tool").run().await.unwrap_err();
        assert!(err.to_string().contains("could not start"), "{err}");
    }

    #[tokio::test]
    async fn failure_reports_last_stderr_line() {
        let err = Invocation::new("sh")
            .args(["-c", "echo 'Importing' >&2; echo 'Error opening file' >&2; exit 3"])
            .run()
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Error opening file"), "{msg}");
        assert!(!msg.contains("Importing"), "{msg}");
    }

    #[tokio::test]
    async fn deadline_kills_the_run() {
        let err = Invocation::new("sleep")
            .arg("10")
            .timeout(Duration::from_millis(100))
            .run()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("killed after"), "{err}");
    }
}
