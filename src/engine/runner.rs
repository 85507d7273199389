//! Collaborator process runner.
//!
//! Runs engine command-line tools with:
//! - `kill_on_drop(true)` so abandoned children are reaped.
//! - A stdout size cap: the child is killed once it writes more than the
//!   limit and `AppError::PayloadTooLarge` is returned.
//! - A wall-clock timeout after which the child is killed.
//! - An optional mock directory that serves `dummy.<program>.txt` instead
//!   of spawning anything.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::{GlobalConfig, MAX_OUTPUT_LIMIT_MB};
use crate::{AppError, Result};

const READ_CHUNK: usize = 8 * 1024;

/// One collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name, resolved through `PATH`.
    pub program: String,
    /// Arguments after the optional `-w <work_dir>` prefix.
    pub args: Vec<String>,
    /// Prefix the arguments with `-w <work_dir>`.
    pub with_work_dir: bool,
    /// Output limit in MiB overriding the runner default, clamped to 1..=10.
    pub output_limit_mb: Option<u64>,
}

impl Invocation {
    /// Engine tool call with the work dir prefix.
    #[must_use]
    pub fn engine<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
            with_work_dir: true,
            output_limit_mb: None,
        }
    }

    /// Override the output limit.
    #[must_use]
    pub fn with_limit_mb(mut self, limit_mb: u64) -> Self {
        self.output_limit_mb = Some(limit_mb);
        self
    }
}

/// Captured result of a finished child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the child was ended by a signal.
    pub code: Option<i32>,
    /// Standard output, decoded lossily.
    pub stdout: String,
    /// Standard error, decoded lossily.
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the child exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes collaborator programs against one AFD work dir.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    work_dir: PathBuf,
    timeout: Duration,
    output_limit_mb: u64,
    mock_dir: Option<PathBuf>,
}

impl ToolRunner {
    /// Runner configured from the global settings.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            work_dir: config.afd_work_dir.clone(),
            timeout: Duration::from_secs(config.exec.timeout_seconds),
            output_limit_mb: config.exec.output_limit_mb,
            mock_dir: config.exec.mock_dir.clone(),
        }
    }

    /// Runner with explicit settings.
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration, output_limit_mb: u64) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout,
            output_limit_mb,
            mock_dir: None,
        }
    }

    /// Serve canned outputs from `mock_dir` instead of spawning.
    #[must_use]
    pub fn with_mock_dir(mut self, mock_dir: Option<PathBuf>) -> Self {
        self.mock_dir = mock_dir;
        self
    }

    /// Work dir passed to engine tools.
    #[must_use]
    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }

    /// Run `invocation` and capture its output, whatever the exit status.
    ///
    /// # Errors
    ///
    /// - `AppError::Exec` if the program cannot be spawned or times out.
    /// - `AppError::PayloadTooLarge` if stdout exceeds the limit.
    /// - `AppError::NotFound` in mock mode when no canned output exists.
    pub async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        if let Some(mock_dir) = &self.mock_dir {
            let path = mock_dir.join(format!("dummy.{}.txt", invocation.program));
            debug!(program = %invocation.program, path = %path.display(), "mock command");
            let bytes = tokio::fs::read(&path).await.map_err(|err| {
                AppError::NotFound(format!("mock output {}: {err}", path.display()))
            })?;
            return Ok(ToolOutput {
                code: Some(0),
                stdout: String::from_utf8_lossy(&bytes).into_owned(),
                stderr: String::new(),
            });
        }

        let limit_mb = invocation
            .output_limit_mb
            .unwrap_or(self.output_limit_mb)
            .clamp(1, MAX_OUTPUT_LIMIT_MB);
        let limit = usize::try_from(limit_mb)
            .unwrap_or(1)
            .saturating_mul(1024 * 1024);

        let mut cmd = Command::new(&invocation.program);
        if invocation.with_work_dir {
            cmd.arg("-w").arg(&self.work_dir);
        }
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(program = %invocation.program, args = ?invocation.args, "exec");

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Exec(format!("failed to spawn {}: {err}", invocation.program))
        })?;

        match tokio::time::timeout(self.timeout, collect(&mut child, limit)).await {
            Ok(Ok(output)) => {
                debug!(program = %invocation.program, code = ?output.code, "exec finished");
                Ok(output)
            }
            Ok(Err(err)) => {
                warn!(program = %invocation.program, %err, "killing collaborator");
                child.kill().await.ok();
                Err(err)
            }
            Err(_elapsed) => {
                child.kill().await.ok();
                Err(AppError::Exec(format!(
                    "{} timed out after {:?}",
                    invocation.program, self.timeout
                )))
            }
        }
    }

    /// Run `invocation` and require exit status 0.
    ///
    /// # Errors
    ///
    /// Everything [`Self::run`] returns, plus `AppError::Exec` carrying the
    /// child's stderr on a non-zero exit.
    pub async fn run_checked(&self, invocation: &Invocation) -> Result<ToolOutput> {
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(AppError::Exec(format!(
                "{} exited with {:?}: {}",
                invocation.program,
                output.code,
                output.stderr.trim()
            )))
        }
    }
}

async fn collect(child: &mut Child, limit: usize) -> Result<ToolOutput> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Exec("failed to capture stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Exec("failed to capture stderr".into()))?;

    let (out, err) = tokio::join!(read_limited(stdout, limit), read_limited(stderr, limit));
    let out = out?;
    let err = err.unwrap_or_default();

    let status = child
        .wait()
        .await
        .map_err(|err| AppError::Exec(format!("failed to wait for child: {err}")))?;

    Ok(ToolOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&out).into_owned(),
        stderr: String::from_utf8_lossy(&err).into_owned(),
    })
}

async fn read_limited<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|err| AppError::Exec(format!("failed to read child output: {err}")))?;
        if n == 0 {
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > limit {
            return Err(AppError::PayloadTooLarge(
                "Too much data! Reduce with filter.".into(),
            ));
        }
    }
}
