//! Retrieval of installer bytes named by a [`PackageDescriptor`]'s URI.
//!
//! [`fetch`] never trusts the network or the local filesystem more than it
//! has to: `http://` sources are refused outright, `https://` hosts must
//! appear in the descriptor's `vetted_domains`, and whatever ends up on disk
//! is hashed while it is written so a truncated or substituted download is
//! caught before it replaces a good cache entry.

mod hashing_writer;
mod http_client;

use std::path::{Path, PathBuf};

use apcore_catalog::{PackageDescriptor, PackageUri};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use http_client::{HttpClient, ReqwestHttpClient};

use hashing_writer::HashingWriter;

/// Everything that can keep [`fetch`] from producing a verified local file.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The descriptor names a plain `http://` source; never dereferenced.
    #[error("{app_id}: refusing to fetch over unencrypted http")]
    UnsupportedScheme {
        /// The package the refusal applies to.
        app_id: String,
    },

    /// The descriptor's `https://` host is not in `vetted_domains`.
    #[error("{app_id}: host {host} is not a vetted domain")]
    UnvettedDomain {
        /// The package the refusal applies to.
        app_id: String,
        /// The host that was rejected.
        host: String,
    },

    /// A `file:` source does not exist on disk.
    #[error("{app_id}: local source {path:?} does not exist")]
    LocalSourceMissing {
        /// The package the refusal applies to.
        app_id: String,
        /// The missing path.
        path: PathBuf,
    },

    /// The transfer itself failed partway through; nothing was left behind.
    #[error("{app_id}: fetch failed: {source}")]
    FetchFailed {
        /// The package the failure applies to.
        app_id: String,
        /// The underlying I/O or transport error.
        source: std::io::Error,
    },

    /// The bytes that arrived do not hash to the descriptor's `sha256`.
    #[error("{app_id}: sha256 mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The package the mismatch applies to.
        app_id: String,
        /// The digest the descriptor declared.
        expected: String,
        /// The digest actually computed.
        actual: String,
    },
}

/// Fetches `descriptor`'s installer bytes into `download_dir`, returning the
/// local path once its contents are confirmed to match `descriptor.sha256`.
///
/// If a file already sits at the deterministic cache path for this package
/// and hashes to the expected digest, no network or filesystem copy is
/// performed at all (cache idempotence). Otherwise the bytes are streamed
/// into a sibling temporary file, hashed as they arrive, and renamed into
/// place atomically only once the digest matches; a mismatch or I/O failure
/// leaves no partial file in `download_dir`.
pub async fn fetch(
    descriptor: &PackageDescriptor,
    download_dir: &Path,
    http_client: &dyn HttpClient,
) -> Result<PathBuf, FetchError> {
    let target = download_dir.join(cache_file_name(descriptor));

    if let Some(actual) = sha256_of_existing(&target).await {
        if actual == descriptor.sha256 {
            tracing::debug!(app_id = %descriptor.app_id, path = ?target, "cache hit");
            return Ok(target);
        }
        tracing::debug!(app_id = %descriptor.app_id, path = ?target, "stale cache entry, refetching");
    }

    fs_err::tokio::create_dir_all(download_dir)
        .await
        .map_err(|e| FetchError::FetchFailed {
            app_id: descriptor.app_id.clone(),
            source: e.into(),
        })?;

    let actual_sha256 = match &descriptor.uri {
        PackageUri::Http(_) => {
            return Err(FetchError::UnsupportedScheme {
                app_id: descriptor.app_id.clone(),
            });
        }
        PackageUri::Https(url) => {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            if !descriptor.vetted_domains.contains(&host) {
                return Err(FetchError::UnvettedDomain {
                    app_id: descriptor.app_id.clone(),
                    host,
                });
            }
            stream_to_target(descriptor, download_dir, &target, |mut writer| async move {
                let result = http_client.download(url, &mut writer).await;
                (writer, result)
            })
            .await?
        }
        PackageUri::File(source_path) => {
            if !tokio::fs::try_exists(source_path).await.unwrap_or(false) {
                return Err(FetchError::LocalSourceMissing {
                    app_id: descriptor.app_id.clone(),
                    path: source_path.clone(),
                });
            }
            let source_path = source_path.clone();
            stream_to_target(descriptor, download_dir, &target, move |mut writer| async move {
                let result = copy_local_file(source_path, &mut writer).await;
                (writer, result)
            })
            .await?
        }
    };

    if actual_sha256 != descriptor.sha256 {
        return Err(FetchError::HashMismatch {
            app_id: descriptor.app_id.clone(),
            expected: descriptor.sha256.clone(),
            actual: actual_sha256,
        });
    }

    Ok(target)
}

/// Runs `transfer` against a hashing temporary file in `download_dir` and
/// renames it onto `target` only if the caller decides to keep it; returns
/// the hex sha256 of whatever was written. The temporary file is always
/// cleaned up when `transfer` fails.
///
/// `transfer` takes ownership of the writer and hands it back alongside the
/// transfer result, since a closure returning a future borrowing its
/// argument can't satisfy the lifetime this generic helper would otherwise
/// require.
async fn stream_to_target<F, Fut>(
    descriptor: &PackageDescriptor,
    download_dir: &Path,
    target: &Path,
    transfer: F,
) -> Result<String, FetchError>
where
    F: FnOnce(HashingWriter<tokio::fs::File>) -> Fut,
    Fut: std::future::Future<Output = (HashingWriter<tokio::fs::File>, std::io::Result<()>)>,
{
    let tmp = tempfile::Builder::new()
        .prefix(".fetch-")
        .suffix(".tmp")
        .tempfile_in(download_dir)
        .map_err(|e| FetchError::FetchFailed {
            app_id: descriptor.app_id.clone(),
            source: e,
        })?;
    let file = tokio::fs::File::from_std(
        tmp.reopen().map_err(|e| FetchError::FetchFailed {
            app_id: descriptor.app_id.clone(),
            source: e,
        })?,
    );
    let writer = HashingWriter::new(file);

    let (writer, result) = transfer(writer).await;
    if let Err(source) = result {
        let _ = tmp.close();
        return Err(FetchError::FetchFailed {
            app_id: descriptor.app_id.clone(),
            source,
        });
    }
    let digest = writer.finalize_hex();

    if digest != descriptor.sha256 {
        let _ = tmp.close();
        return Ok(digest);
    }

    tmp.persist(target).map_err(|e| FetchError::FetchFailed {
        app_id: descriptor.app_id.clone(),
        source: e.error,
    })?;
    Ok(digest)
}

async fn copy_local_file(
    source: PathBuf,
    writer: &mut HashingWriter<tokio::fs::File>,
) -> std::io::Result<()> {
    let mut source = fs_err::tokio::File::open(&source).await?;
    tokio::io::copy(&mut source, writer).await?;
    Ok(())
}

async fn sha256_of_existing(path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    Some(hex::encode(Sha256::digest(&bytes)))
}

/// The deterministic, app-scoped name a package's installer is cached under.
///
/// Keyed on `app_id` alone (not version), so a version upgrade reuses and
/// overwrites the same cache slot rather than accumulating history.
fn cache_file_name(descriptor: &PackageDescriptor) -> String {
    let extension = match descriptor.installer_kind {
        apcore_catalog::InstallerKind::Msi => "msi",
        apcore_catalog::InstallerKind::Exe => "exe",
        apcore_catalog::InstallerKind::Appx => "appx",
    };
    format!("{}.{extension}", descriptor.app_id)
}
