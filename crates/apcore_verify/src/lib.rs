//! Hash, HMAC, and Authenticode verification of a fetched installer artifact.
//!
//! [`verify`] never modifies the file at `path`; it only reads it, in up to
//! three stages, stopping at the first stage that fails.

mod authenticode;

use std::path::{Path, PathBuf};

use apcore_catalog::PackageDescriptor;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use authenticode::{
    AuthenticodeBackend, AuthenticodeError, AuthenticodeReport, CertificateSummary,
    NoopAuthenticodeBackend, SignatureStatus,
};

/// Policy governing the Authenticode stage.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Whether a platform signature check is requested at all. When `false`
    /// the Authenticode stage is skipped entirely and every status is
    /// tolerated.
    pub require_authenticode: bool,
    /// Statuses accepted when `require_authenticode` is `true`. Defaults to
    /// `{Valid}` only.
    pub acceptable_signature_statuses: Vec<SignatureStatus>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            require_authenticode: false,
            acceptable_signature_statuses: vec![SignatureStatus::Valid],
        }
    }
}

/// The result of a successful [`verify`] call.
#[derive(Debug, Clone)]
pub struct VerifiedArtifact {
    /// The path that was verified.
    pub path: PathBuf,
    /// The sha256 digest that was recomputed and matched.
    pub sha256: String,
    /// Whether an HMAC signature was checked (and matched).
    pub hmac_verified: bool,
    /// The Authenticode report, if the stage ran.
    pub authenticode: Option<AuthenticodeReport>,
}

/// Everything that can cause [`verify`] to fail.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The file's on-disk sha256 did not match the descriptor.
    #[error("sha256 mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The digest the descriptor declared.
        expected: String,
        /// The digest actually computed.
        actual: String,
    },

    /// The HMAC signature did not verify, or was malformed base64.
    #[error("HMAC signature invalid: {0}")]
    SignatureInvalid(String),

    /// The Authenticode stage produced a status outside the acceptable set.
    #[error("code signing check rejected the artifact: {0:?}")]
    CodeSigningRejected(SignatureStatus),

    /// The artifact could not be read from disk.
    #[error("failed to read artifact {0:?}: {1}")]
    Io(PathBuf, String),
}

/// Runs every applicable verification stage against `path` for `descriptor`.
pub async fn verify(
    descriptor: &PackageDescriptor,
    path: &Path,
    config: &VerifyConfig,
    backend: &dyn AuthenticodeBackend,
) -> Result<VerifiedArtifact, VerifyError> {
    let sha256 = hash_stage(descriptor, path)?;
    let hmac_verified = hmac_stage(descriptor, path)?;
    let authenticode = authenticode_stage(descriptor, path, config, backend).await?;

    Ok(VerifiedArtifact {
        path: path.to_path_buf(),
        sha256,
        hmac_verified,
        authenticode,
    })
}

fn hash_stage(descriptor: &PackageDescriptor, path: &Path) -> Result<String, VerifyError> {
    let bytes =
        fs_err::read(path).map_err(|e| VerifyError::Io(path.to_path_buf(), e.to_string()))?;
    let actual = hex::encode(Sha256::digest(&bytes));
    if actual != descriptor.sha256 {
        return Err(VerifyError::HashMismatch {
            expected: descriptor.sha256.clone(),
            actual,
        });
    }
    Ok(actual)
}

type HmacSha256 = Hmac<Sha256>;

fn hmac_stage(descriptor: &PackageDescriptor, path: &Path) -> Result<bool, VerifyError> {
    let Some(hmac_spec) = &descriptor.hmac else {
        return Ok(false);
    };

    let key = base64::engine::general_purpose::STANDARD
        .decode(&hmac_spec.key_b64)
        .map_err(|e| VerifyError::SignatureInvalid(format!("bad base64 key: {e}")))?;
    let signature = base64::engine::general_purpose::STANDARD
        .decode(&hmac_spec.signature_b64)
        .map_err(|e| VerifyError::SignatureInvalid(format!("bad base64 signature: {e}")))?;

    let bytes =
        fs_err::read(path).map_err(|e| VerifyError::Io(path.to_path_buf(), e.to_string()))?;

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| VerifyError::SignatureInvalid(format!("invalid HMAC key: {e}")))?;
    mac.update(&bytes);

    // `verify_slice` is constant-time: it never short-circuits on the first
    // differing byte, so signatures that differ early and signatures that
    // differ late take the same time to reject.
    mac.verify_slice(&signature)
        .map_err(|_| VerifyError::SignatureInvalid("HMAC does not match".to_string()))?;

    Ok(true)
}

async fn authenticode_stage(
    descriptor: &PackageDescriptor,
    path: &Path,
    config: &VerifyConfig,
    backend: &dyn AuthenticodeBackend,
) -> Result<Option<AuthenticodeReport>, VerifyError> {
    use apcore_catalog::InstallerKind;

    if !config.require_authenticode {
        return Ok(None);
    }
    if !matches!(
        descriptor.installer_kind,
        InstallerKind::Msi | InstallerKind::Exe
    ) {
        return Ok(None);
    }

    let report = match backend.check(path, descriptor.installer_kind).await {
        Ok(report) => report,
        Err(AuthenticodeError::Unsupported) => {
            // The configured host explicitly requires a check; a backend
            // that cannot perform one must not be silently trusted.
            return Err(VerifyError::CodeSigningRejected(SignatureStatus::Untrusted));
        }
    };

    if !config
        .acceptable_signature_statuses
        .contains(&report.status)
    {
        return Err(VerifyError::CodeSigningRejected(report.status));
    }

    Ok(Some(report))
}
