//! Where finalized content goes.
//!
//! An [`OutputSink`] prints to stdout, saves files and runs shell
//! commands. The controller renders the templates; the sink only moves
//! bytes.

use crate::errors::ScrError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Receives finalized content.
#[async_trait]
pub trait OutputSink: Send + Sync + Debug {
    /// Writes `data` to standard output.
    async fn print(&self, data: &[u8]) -> Result<(), ScrError>;

    /// Writes `data` to the file at `path`, creating parent directories.
    ///
    /// Fails if the file exists and `overwrite` is false.
    async fn save(&self, path: &Path, data: &[u8], overwrite: bool) -> Result<(), ScrError>;

    /// Runs `command` through the shell, feeding it `stdin`.
    ///
    /// The command's output is echoed when `print_output` is set and
    /// discarded otherwise.
    async fn shell(&self, command: &str, stdin: Option<&[u8]>, print_output: bool) -> Result<(), ScrError>;
}

/// The shipped [`OutputSink`]: stdout, the file system and `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardOutputSink;

impl StandardOutputSink {
    /// Creates the sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputSink for StandardOutputSink {
    async fn print(&self, data: &[u8]) -> Result<(), ScrError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(data).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn save(&self, path: &Path, data: &[u8], overwrite: bool) -> Result<(), ScrError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                ScrError::Output(format!("file '{}' already exists", path.display()))
            }
            _ => ScrError::Output(format!("failed to open '{}': {e}", path.display())),
        })?;
        file.write_all(data).await?;
        file.flush().await?;
        debug!(path = %path.display(), bytes = data.len(), "saved content");
        Ok(())
    }

    async fn shell(&self, command: &str, stdin: Option<&[u8]>, print_output: bool) -> Result<(), ScrError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(if print_output { Stdio::piped() } else { Stdio::null() })
            .spawn()
            .map_err(|e| ScrError::Output(format!("failed to run '{command}': {e}")))?;

        let input = child.stdin.take();
        let output = child.stdout.take();
        let feed = async {
            if let (Some(mut pipe), Some(data)) = (input, stdin) {
                pipe.write_all(data).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let drain = async {
            let mut buf = Vec::new();
            if let Some(mut pipe) = output {
                pipe.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let ((), echoed) = futures::try_join!(feed, drain)?;
        let status = child.wait().await?;
        if print_output {
            self.print(&echoed).await?;
        }
        if !status.success() {
            return Err(ScrError::Output(format!("command '{command}' exited with {status}")));
        }
        Ok(())
    }
}
