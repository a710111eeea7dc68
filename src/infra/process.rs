//! External process execution
//!
//! Runs child processes with their output streamed line by line into the log,
//! and keeps the combined output for callers that need to parse it.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::ProcessError;

/// Exit status and combined output of a finished process
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal)
    pub code: i32,
    /// stdout and stderr lines in arrival order
    pub output: String,
}

impl CommandOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Script interpreters by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Python script
    Python,
    /// Bash script
    Shell,
}

impl ScriptKind {
    /// Detect the kind of a script from its extension
    pub fn detect(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") => Some(Self::Python),
            Some("sh") => Some(Self::Shell),
            _ => None,
        }
    }
}

/// Spawns child processes with a shared environment
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    python: String,
    envs: Vec<(String, String)>,
}

impl ProcessRunner {
    /// Create a runner using `python` for Python scripts
    pub fn new(python: impl Into<String>, envs: Vec<(String, String)>) -> Self {
        Self {
            python: python.into(),
            envs,
        }
    }

    /// Python interpreter
    pub fn python(&self) -> &str {
        &self.python
    }

    /// Build a command carrying the shared environment
    pub fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }

    /// Run a program to completion, streaming its output to the log
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, ProcessError> {
        tracing::debug!("Running: {program} {}", args.join(" "));
        let mut cmd = self.command(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ProcessError::Spawn {
            program: program.to_string(),
            error: e.to_string(),
        })?;

        let io_err = |error: String| ProcessError::Io {
            program: program.to_string(),
            error,
        };
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_err("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_err("stderr not captured".to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let readers = [
            tokio::spawn(forward_lines(stdout, tx.clone())),
            tokio::spawn(forward_lines(stderr, tx)),
        ];

        let mut output = String::new();
        while let Some(line) = rx.recv().await {
            tracing::info!("{}", line.trim_end());
            output.push_str(&line);
            output.push('\n');
        }
        for reader in readers {
            reader
                .await
                .map_err(|e| io_err(e.to_string()))?
                .map_err(|e| io_err(e.to_string()))?;
        }

        let status = child.wait().await.map_err(|e| io_err(e.to_string()))?;
        Ok(CommandOutput {
            code: status.code().unwrap_or(-1),
            output,
        })
    }

    /// Run a program and fail on a non-zero exit status
    pub async fn run_checked(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, ProcessError> {
        let result = self.run(program, args, cwd).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(ProcessError::Failed {
                program: program.to_string(),
                code: result.code,
                output: result.output,
            })
        }
    }

    /// Run a Python or shell script
    ///
    /// Returns `Ok(None)` when the file type is not a supported script.
    pub async fn run_script(&self, script: &Path) -> Result<Option<CommandOutput>, ProcessError> {
        let program = match ScriptKind::detect(script) {
            Some(ScriptKind::Python) => self.python.clone(),
            Some(ScriptKind::Shell) => "bash".to_string(),
            None => return Ok(None),
        };
        let args = vec![script.display().to_string()];
        self.run(&program, &args, script.parent()).await.map(Some)
    }
}

/// Send each line of `reader` to `tx`, decoding invalid UTF-8 lossily
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']).to_string();
        if tx.send(line).is_err() {
            break;
        }
    }
    Ok(())
}
