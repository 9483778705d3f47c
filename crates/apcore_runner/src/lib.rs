//! Execution of the installer/uninstaller command composed for a package.
//!
//! [`Runner`] never decides whether an install *should* happen; it only
//! turns a [`PackageDescriptor`] plus a local artifact path into an argv,
//! and either runs it through a [`ProcessRunner`] or, in dry-run mode,
//! returns what it would have run.

mod compose;
mod process;

use std::path::Path;

use apcore_catalog::PackageDescriptor;
use thiserror::Error;

pub use compose::{compose_install_argv, compose_uninstall_argv};
pub use process::{ProcessOutput, ProcessRunner, RealProcessRunner};

/// The outcome of one [`Runner::install`]/[`Runner::uninstall`] call.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The argv that was (or, in dry-run mode, would have been) executed.
    pub argv: Vec<String>,
    /// The process's exit code. Always `0` in dry-run mode.
    pub exit_code: i32,
    /// Captured standard output. Always empty in dry-run mode.
    pub stdout: Vec<u8>,
    /// Captured standard error. Always empty in dry-run mode.
    pub stderr: Vec<u8>,
}

/// Everything that can keep a [`Runner`] call from succeeding.
#[derive(Debug, Error)]
pub enum RunError {
    /// The installer process ran and returned a non-zero exit code.
    #[error("installer exited with code {exit_code}")]
    InstallerFailed {
        /// The exit code reported.
        exit_code: i32,
        /// Captured standard error, for diagnostics.
        stderr: Vec<u8>,
    },

    /// No uninstall command could be composed for this package.
    #[error("{app_id}: no uninstall command is available")]
    UninstallUnsupported {
        /// The package that cannot be uninstalled this way.
        app_id: String,
    },

    /// The process could not be spawned at all.
    #[error("failed to spawn installer process: {0}")]
    Spawn(std::io::Error),
}

/// Composes and, unless in dry-run mode, executes installer invocations.
pub struct Runner<'a> {
    process_runner: &'a dyn ProcessRunner,
    dry_run: bool,
}

impl<'a> Runner<'a> {
    /// Builds a runner. `dry_run` should default to `true` on non-Windows
    /// hosts and wherever a host has not explicitly opted into real
    /// installer execution.
    pub fn new(process_runner: &'a dyn ProcessRunner, dry_run: bool) -> Self {
        Self {
            process_runner,
            dry_run,
        }
    }

    /// Whether this runner will actually spawn processes.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Installs `descriptor` using the verified artifact at `path`.
    pub async fn install(
        &self,
        descriptor: &PackageDescriptor,
        path: &Path,
    ) -> Result<RunResult, RunError> {
        let argv = compose_install_argv(descriptor, path);
        self.execute(argv).await
    }

    /// Uninstalls `descriptor`. `path` is the previously installed artifact,
    /// when one was recorded; MSI uninstalls require it.
    pub async fn uninstall(
        &self,
        descriptor: &PackageDescriptor,
        path: Option<&Path>,
    ) -> Result<RunResult, RunError> {
        let argv = compose_uninstall_argv(descriptor, path)?;
        self.execute(argv).await
    }

    async fn execute(&self, argv: Vec<String>) -> Result<RunResult, RunError> {
        if self.dry_run {
            tracing::debug!(?argv, "dry run, not spawning");
            return Ok(RunResult {
                argv,
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }

        let output = self
            .process_runner
            .run(&argv)
            .await
            .map_err(RunError::Spawn)?;

        if output.exit_code != 0 {
            return Err(RunError::InstallerFailed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok(RunResult {
            argv,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apcore_catalog::Catalog;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeProcessRunner {
        exit_code: i32,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ProcessRunner for FakeProcessRunner {
        async fn run(&self, argv: &[String]) -> std::io::Result<ProcessOutput> {
            self.seen.lock().unwrap().push(argv.to_vec());
            Ok(ProcessOutput {
                exit_code: self.exit_code,
                stdout: b"ok".to_vec(),
                stderr: Vec::new(),
            })
        }
    }

    fn descriptor() -> PackageDescriptor {
        let json = format!(
            r#"[{{"app_id": "a", "name": "A", "version": "1",
                 "uri": "file:///pkgs/a.exe", "installer_kind": "exe",
                 "sha256": "{}", "vetted_domains": [], "dependencies": [],
                 "silent_args": ["/S"]}}]"#,
            "0".repeat(64)
        );
        let cat = Catalog::load_str(&json, &PathBuf::from("/catalogs")).unwrap();
        cat.get("a").unwrap().clone()
    }

    #[tokio::test]
    async fn dry_run_never_spawns_and_reports_zero() {
        let process_runner = FakeProcessRunner {
            exit_code: 1,
            seen: Mutex::new(Vec::new()),
        };
        let runner = Runner::new(&process_runner, true);
        let result = runner
            .install(&descriptor(), Path::new("/tmp/a.exe"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.is_empty());
        assert!(process_runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_as_installer_failed() {
        let process_runner = FakeProcessRunner {
            exit_code: 3,
            seen: Mutex::new(Vec::new()),
        };
        let runner = Runner::new(&process_runner, false);
        let err = runner
            .install(&descriptor(), Path::new("/tmp/a.exe"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::InstallerFailed { exit_code: 3, .. }));
    }

    #[tokio::test]
    async fn successful_install_runs_the_composed_argv() {
        let process_runner = FakeProcessRunner {
            exit_code: 0,
            seen: Mutex::new(Vec::new()),
        };
        let runner = Runner::new(&process_runner, false);
        let result = runner
            .install(&descriptor(), Path::new("/tmp/a.exe"))
            .await
            .unwrap();
        assert_eq!(result.argv, vec!["/tmp/a.exe", "/S"]);
        assert_eq!(process_runner.seen.lock().unwrap().len(), 1);
    }
}
