//! Host-provided configuration.
//!
//! The core never reads a configuration file itself; a host builds a
//! [`Config`] programmatically, typically starting from [`Config::for_app`].

use std::path::PathBuf;
use std::sync::Arc;

use apcore_verify::{SignatureStatus, VerifyConfig};

/// Everything a [`crate::Manager`] needs that isn't the catalog itself.
#[derive(Clone)]
pub struct Config {
    /// Where fetched installer artifacts are cached.
    pub download_dir: PathBuf,
    /// Where installation records are persisted.
    pub state_file: PathBuf,
    /// Whether installers are composed but not executed, by default.
    pub default_dry_run: bool,
    /// Whether a platform code-signing check is required before running an installer.
    pub require_authenticode: bool,
    /// Signature statuses tolerated when `require_authenticode` is set.
    pub acceptable_signature_statuses: Vec<SignatureStatus>,
    /// Invoked with a human-readable prompt before a destructive operation;
    /// `None` means no confirmation is requested.
    pub request_confirmation: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("download_dir", &self.download_dir)
            .field("state_file", &self.state_file)
            .field("default_dry_run", &self.default_dry_run)
            .field("require_authenticode", &self.require_authenticode)
            .field(
                "acceptable_signature_statuses",
                &self.acceptable_signature_statuses,
            )
            .field(
                "request_confirmation",
                &self.request_confirmation.is_some(),
            )
            .finish()
    }
}

impl Config {
    /// The default configuration for an application named `app_name`, rooted
    /// under the current user's home directory: `~/.<app_name>/downloads`
    /// and `~/.<app_name>/installed.json`. Dry-run defaults to on everywhere
    /// except Windows, since these installers only make sense there.
    pub fn for_app(app_name: &str) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let root = home.join(format!(".{app_name}"));
        Self {
            download_dir: root.join("downloads"),
            state_file: root.join("installed.json"),
            default_dry_run: !cfg!(target_os = "windows"),
            require_authenticode: false,
            acceptable_signature_statuses: vec![SignatureStatus::Valid],
            request_confirmation: None,
        }
    }

    pub(crate) fn verify_config(&self) -> VerifyConfig {
        VerifyConfig {
            require_authenticode: self.require_authenticode,
            acceptable_signature_statuses: self.acceptable_signature_statuses.clone(),
        }
    }
}
