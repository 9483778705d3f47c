use apcore_catalog::CatalogError;
use apcore_fetch::FetchError;
use apcore_plan::PlanWarning;
use apcore_runner::RunError;
use apcore_state::StateStoreError;
use apcore_verify::VerifyError;
use thiserror::Error;

/// Everything that can keep a [`crate::Manager`] operation from succeeding.
///
/// Fetcher, Verifier, and Runner failures bubble up verbatim, wrapped only
/// with the `app_id` of the step that produced them; the Manager itself
/// never reinterprets their meaning.
#[derive(Debug, Error)]
pub enum Error {
    /// The catalog itself could not be loaded or indexed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The requested `app_id` is not present in the catalog.
    #[error("{app_id} is not present in the catalog")]
    NotFound {
        /// The package that could not be found.
        app_id: String,
    },

    /// The plan for `app_id` contains a blocked step and cannot be executed.
    #[error("plan for {app_id} cannot be executed: {warnings:?}")]
    PlanBlocked {
        /// The package whose plan is blocked.
        app_id: String,
        /// Every warning collected while building the plan.
        warnings: Vec<PlanWarning>,
    },

    /// Fetching the installer artifact for `app_id` failed.
    #[error("{app_id}: {source}")]
    Fetch {
        /// The package whose fetch step failed.
        app_id: String,
        /// The underlying fetch failure.
        #[source]
        source: FetchError,
    },

    /// Verifying the fetched artifact for `app_id` failed.
    #[error("{app_id}: {source}")]
    Verify {
        /// The package whose verification step failed.
        app_id: String,
        /// The underlying verification failure.
        #[source]
        source: VerifyError,
    },

    /// Running the installer/uninstaller for `app_id` failed.
    #[error("{app_id}: {source}")]
    Run {
        /// The package whose run step failed.
        app_id: String,
        /// The underlying run failure.
        #[source]
        source: RunError,
    },

    /// Reading or writing the state store failed.
    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    /// `app_id` is still listed as a dependency of an installed package.
    #[error("cannot uninstall {app_id}: still required by {dependents:?}")]
    DependencyHeld {
        /// The package whose uninstall was refused.
        app_id: String,
        /// The installed packages that still depend on it.
        dependents: Vec<String>,
    },

    /// The host's confirmation callback declined the operation.
    #[error("{app_id}: operation was not confirmed")]
    ConfirmationDeclined {
        /// The package the declined operation concerned.
        app_id: String,
    },
}
