//! The pluggable process-spawning capability.

use async_trait::async_trait;

/// The result of running one argv to completion.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// The process's exit code. Platforms without a meaningful code (killed
    /// by signal) should report `-1`.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

/// Spawns a composed argv and waits for it to finish.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `argv[0]` with `argv[1..]` as arguments, capturing output fully.
    async fn run(&self, argv: &[String]) -> std::io::Result<ProcessOutput>;
}

/// A [`ProcessRunner`] that spawns a real child process via [`tokio::process`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RealProcessRunner;

#[async_trait]
impl ProcessRunner for RealProcessRunner {
    async fn run(&self, argv: &[String]) -> std::io::Result<ProcessOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv")
        })?;

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await?;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
