//! The pluggable Authenticode signature-checking capability.
//!
//! The core never links against a specific code-signing implementation.
//! Hosts supply an [`AuthenticodeBackend`]; [`NoopAuthenticodeBackend`] is
//! provided for non-Windows development and for hosts that have not wired
//! up a real backend yet.

use std::path::Path;

use apcore_catalog::InstallerKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// The outcome of a platform code-signing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureStatus {
    /// The signature chains to a trusted root and is currently valid.
    Valid,
    /// The signature is present but does not verify.
    Invalid,
    /// The artifact carries no signature at all.
    Unsigned,
    /// The signing certificate has expired.
    Expired,
    /// The signing certificate has been revoked.
    Revoked,
    /// The signature does not chain to a trusted root.
    Untrusted,
}

/// A human-readable summary of the certificate backing a signature check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// The certificate subject (commonly the publisher name).
    pub subject: String,
    /// The certificate issuer (commonly the certificate authority).
    pub issuer: String,
    /// Hex SHA-1 or SHA-256 thumbprint of the certificate.
    pub thumbprint: String,
    /// Start of the certificate's validity period.
    pub valid_from: DateTime<Utc>,
    /// End of the certificate's validity period.
    pub valid_to: DateTime<Utc>,
}

/// The result of one [`AuthenticodeBackend::check`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticodeReport {
    /// The tagged outcome of the check.
    pub status: SignatureStatus,
    /// Certificate details, when a signature (valid or not) was present.
    pub certificate: Option<CertificateSummary>,
}

/// Raised by a backend that cannot perform a check at all.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticodeError {
    /// This backend has no way to check code signatures on the current
    /// platform (e.g. a non-Windows host, or a stub wired up for tests).
    #[error("Authenticode checking is not supported by this backend")]
    Unsupported,
}

/// A pluggable platform code-signing checker.
///
/// Implementations are expected to be thin wrappers around a platform API
/// (`WinVerifyTrust` on Windows); the core ships none itself.
#[async_trait]
pub trait AuthenticodeBackend: Send + Sync {
    /// Checks the signature on the artifact at `path`.
    async fn check(
        &self,
        path: &Path,
        kind: InstallerKind,
    ) -> Result<AuthenticodeReport, AuthenticodeError>;
}

/// An [`AuthenticodeBackend`] that never performs a check.
///
/// Used as the default on non-Windows hosts and in tests; always returns
/// [`AuthenticodeError::Unsupported`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuthenticodeBackend;

#[async_trait]
impl AuthenticodeBackend for NoopAuthenticodeBackend {
    async fn check(
        &self,
        _path: &Path,
        _kind: InstallerKind,
    ) -> Result<AuthenticodeReport, AuthenticodeError> {
        Err(AuthenticodeError::Unsupported)
    }
}
