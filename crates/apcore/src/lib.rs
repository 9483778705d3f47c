//! The single entry point composing Catalog, State Store, Fetcher, Verifier,
//! Runner, and Planner into install/uninstall/status operations.
//!
//! [`Manager`] owns the catalog handle, the state store, and the download
//! root for the lifetime of a session. It never converts a collaborator's
//! error into something else; it only wraps it with the `app_id` of the
//! step that failed.

mod config;
mod error;

pub use apcore_catalog::{Catalog, CatalogError, InstallerKind, PackageDescriptor, PackageUri};
pub use apcore_fetch::{FetchError, HttpClient, ReqwestHttpClient};
pub use apcore_plan::{InstallPlan, PlanAction, PlanStep, PlanWarning, WarningKind};
pub use apcore_runner::{ProcessRunner, RealProcessRunner, RunError, RunResult};
pub use apcore_state::{InstallRecord, StateStoreError};
pub use apcore_verify::{
    AuthenticodeBackend, NoopAuthenticodeBackend, SignatureStatus, VerifyError,
};
pub use config::Config;
pub use error::Error;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use apcore_runner::Runner;
use apcore_state::StateStore;
use chrono::Utc;

/// Which [`InstallRecord`]s [`Manager::status`] should return.
///
/// Grounded on the one-or-all query shape a status command commonly takes
/// (report on a single package, or dump the whole installed set).
pub enum StatusQuery<'a> {
    /// The record for one package, if installed.
    One(&'a str),
    /// Every installed package.
    All,
}

/// Composes the rest of the core into install/uninstall/status operations.
pub struct Manager {
    catalog: Catalog,
    state: Mutex<StateStore>,
    config: Config,
    http_client: Box<dyn HttpClient>,
    process_runner: Box<dyn ProcessRunner>,
    authenticode_backend: Box<dyn AuthenticodeBackend>,
}

impl Manager {
    /// Opens a manager with production platform adapters: a real `reqwest`
    /// HTTP client, real child-process spawning, and no Authenticode
    /// checking (hosts that need one supply their own via
    /// [`Manager::with_adapters`]).
    pub fn open(catalog: Catalog, config: Config) -> Result<Self, Error> {
        Self::with_adapters(
            catalog,
            config,
            Box::new(ReqwestHttpClient::default()),
            Box::new(RealProcessRunner),
            Box::new(NoopAuthenticodeBackend),
        )
    }

    /// Opens a manager with explicit platform capability adapters, for hosts
    /// that need a custom transport, sandboxed process execution, or a real
    /// Authenticode backend — and for tests, which substitute fakes.
    pub fn with_adapters(
        catalog: Catalog,
        config: Config,
        http_client: Box<dyn HttpClient>,
        process_runner: Box<dyn ProcessRunner>,
        authenticode_backend: Box<dyn AuthenticodeBackend>,
    ) -> Result<Self, Error> {
        let state = StateStore::open(config.state_file.clone())?;
        Ok(Self {
            catalog,
            state: Mutex::new(state),
            config,
            http_client,
            process_runner,
            authenticode_backend,
        })
    }

    /// Every descriptor in the catalog, in declaration order.
    pub fn list_available(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.catalog.list()
    }

    /// Builds a dependency-ordered plan for installing `app_id`. Pure: reads
    /// the catalog and the current state store contents, mutates neither.
    pub fn build_install_plan(&self, app_id: &str) -> InstallPlan {
        let state = self.state.lock().unwrap();
        apcore_plan::plan(app_id, &self.catalog, &state)
    }

    /// Fetches `app_id`'s installer artifact into the download directory,
    /// without verifying or running it.
    pub async fn download(&self, app_id: &str) -> Result<PathBuf, Error> {
        let descriptor = self.lookup(app_id)?;
        apcore_fetch::fetch(descriptor, &self.config.download_dir, self.http_client.as_ref())
            .await
            .map_err(|source| Error::Fetch {
                app_id: app_id.to_string(),
                source,
            })
    }

    /// Installs `app_id` and every dependency the plan says needs it,
    /// fetching, verifying, and running each in dependency order.
    ///
    /// Aborts immediately on the first failing step; no record is written
    /// for that step, and steps already committed earlier in the call stay
    /// committed (no rollback).
    pub async fn install(&self, app_id: &str) -> Result<(InstallRecord, RunResult), Error> {
        let plan = self.build_install_plan(app_id);
        if !plan.is_executable() {
            return Err(Error::PlanBlocked {
                app_id: app_id.to_string(),
                warnings: plan.warnings,
            });
        }

        if let Some(confirm) = &self.config.request_confirmation {
            let prompt = format!(
                "install {} step(s) to bring {app_id:?} up to date?",
                plan.install_count()
            );
            if !confirm(&prompt) {
                return Err(Error::ConfirmationDeclined {
                    app_id: app_id.to_string(),
                });
            }
        }

        let runner = Runner::new(self.process_runner.as_ref(), self.config.default_dry_run);

        let mut completed: HashSet<String> = {
            let state = self.state.lock().unwrap();
            state.list().map(|r| r.app_id.clone()).collect()
        };
        let mut target_result: Option<(InstallRecord, RunResult)> = None;

        for step in &plan.steps {
            if step.action != PlanAction::Install {
                if step.action == PlanAction::Skip {
                    completed.insert(step.app_id.clone());
                }
                continue;
            }

            let descriptor = self.catalog.get(&step.app_id)?;

            let path = apcore_fetch::fetch(
                descriptor,
                &self.config.download_dir,
                self.http_client.as_ref(),
            )
            .await
            .map_err(|source| Error::Fetch {
                app_id: step.app_id.clone(),
                source,
            })?;

            let verified = apcore_verify::verify(
                descriptor,
                &path,
                &self.config.verify_config(),
                self.authenticode_backend.as_ref(),
            )
            .await
            .map_err(|source| Error::Verify {
                app_id: step.app_id.clone(),
                source,
            })?;

            let run_result = runner
                .install(descriptor, &path)
                .await
                .map_err(|source| Error::Run {
                    app_id: step.app_id.clone(),
                    source,
                })?;

            let dependencies_installed: Vec<String> = descriptor
                .dependencies
                .iter()
                .filter(|dep| completed.contains(*dep))
                .cloned()
                .collect();
            let record = InstallRecord {
                app_id: descriptor.app_id.clone(),
                version: descriptor.version.clone(),
                installer_path: path,
                installed_at: Utc::now(),
                dependencies_installed,
                hash_verified: verified.sha256,
                signature_verified: verified.authenticode.is_some(),
            };

            if !runner.is_dry_run() {
                let mut state = self.state.lock().unwrap();
                state.mark_installed(record.clone())?;
            }
            completed.insert(step.app_id.clone());

            if step.app_id == app_id {
                target_result = Some((record, run_result));
            }
        }

        if let Some(result) = target_result {
            return Ok(result);
        }

        // The target's own step was `Skip`: it was already installed at the
        // catalog version, so its existing record is the answer.
        let state = self.state.lock().unwrap();
        let record = state
            .get(app_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                app_id: app_id.to_string(),
            })?;
        Ok((
            record,
            RunResult {
                argv: Vec::new(),
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
        ))
    }

    /// Uninstalls `app_id`, refusing if any currently installed package
    /// still declares it as a dependency.
    pub async fn uninstall(&self, app_id: &str) -> Result<RunResult, Error> {
        let descriptor = self.lookup(app_id)?;

        let dependents: Vec<String> = {
            let state = self.state.lock().unwrap();
            state
                .list()
                .filter(|r| r.dependencies_installed.iter().any(|d| d == app_id))
                .map(|r| r.app_id.clone())
                .collect()
        };
        if !dependents.is_empty() {
            return Err(Error::DependencyHeld {
                app_id: app_id.to_string(),
                dependents,
            });
        }

        if let Some(confirm) = &self.config.request_confirmation {
            if !confirm(&format!("uninstall {app_id:?}?")) {
                return Err(Error::ConfirmationDeclined {
                    app_id: app_id.to_string(),
                });
            }
        }

        let installer_path = {
            let state = self.state.lock().unwrap();
            state.get(app_id).map(|r| r.installer_path.clone())
        };

        let runner = Runner::new(self.process_runner.as_ref(), self.config.default_dry_run);
        let run_result = runner
            .uninstall(descriptor, installer_path.as_deref())
            .await
            .map_err(|source| Error::Run {
                app_id: app_id.to_string(),
                source,
            })?;

        if !runner.is_dry_run() {
            let mut state = self.state.lock().unwrap();
            state.mark_uninstalled(app_id)?;
        }

        Ok(run_result)
    }

    /// Reports installation state for one package or every installed package.
    pub fn status(&self, query: StatusQuery<'_>) -> Vec<InstallRecord> {
        let state = self.state.lock().unwrap();
        match query {
            StatusQuery::One(app_id) => state.get(app_id).cloned().into_iter().collect(),
            StatusQuery::All => state.list().cloned().collect(),
        }
    }

    fn lookup(&self, app_id: &str) -> Result<&PackageDescriptor, Error> {
        self.catalog.get(app_id).map_err(|_| Error::NotFound {
            app_id: app_id.to_string(),
        })
    }
}
