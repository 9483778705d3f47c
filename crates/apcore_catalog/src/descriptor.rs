use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CatalogError;

/// The installer technology used to apply and remove a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerKind {
    /// A Windows Installer `.msi` package, driven through `msiexec`.
    Msi,
    /// A bare `.exe` installer with its own silent-install convention.
    Exe,
    /// An `.appx`/`.msix` package, driven through the platform package manager.
    Appx,
}

/// An HMAC-SHA256 signature paired with the base64-encoded key used to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmacSpec {
    /// Base64-encoded HMAC-SHA256 signature over the installer bytes.
    pub signature_b64: String,
    /// Base64-encoded HMAC key.
    pub key_b64: String,
}

/// The location a package's installer bytes are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageUri {
    /// An origin that must be checked against `vetted_domains` before fetching.
    Https(Url),
    /// A plain HTTP origin. Always legal to *describe*; [`apcore_fetch`] refuses
    /// to ever dereference one.
    Http(Url),
    /// A local file, already resolved to an absolute path at catalog load time.
    File(PathBuf),
}

impl PackageUri {
    /// Returns the path backing a [`PackageUri::File`], if this is one.
    pub fn to_file_path(&self) -> Option<&Path> {
        match self {
            PackageUri::File(path) => Some(path),
            _ => None,
        }
    }

    /// Returns the host backing an `https`/`http` URI, if this is one.
    pub fn host_str(&self) -> Option<&str> {
        match self {
            PackageUri::Https(url) | PackageUri::Http(url) => url.host_str(),
            PackageUri::File(_) => None,
        }
    }
}

/// An immutable, validated description of one installable package.
///
/// Produced only by [`crate::Catalog::load_str`]/[`crate::Catalog::load_file`];
/// there is deliberately no public constructor, so a `PackageDescriptor` in
/// hand is always one that passed every loading invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Unique, case-sensitive identifier within the owning catalog.
    pub app_id: String,
    /// Human-readable display name.
    pub name: String,
    /// Human-readable version string.
    pub version: String,
    /// Where to fetch the installer bytes from.
    pub uri: PackageUri,
    /// Which installer technology applies this package.
    pub installer_kind: InstallerKind,
    /// 64 lowercase hex sha256 digits the fetched artifact must hash to.
    pub sha256: String,
    /// Optional HMAC-SHA256 signature/key pair, checked after the hash.
    pub hmac: Option<HmacSpec>,
    /// DNS names this package is allowed to be fetched from over HTTPS.
    pub vetted_domains: HashSet<String>,
    /// Other `app_id`s that must be installed before this one.
    pub dependencies: Vec<String>,
    /// Arguments appended to the installer's silent-install invocation.
    pub silent_args: Vec<String>,
    /// Whitespace-tokenized uninstall command template, if the package supplies one.
    pub uninstall_command: Option<Vec<String>>,
}

/// The as-deserialized, unvalidated shape of one catalog entry.
#[derive(Debug, Deserialize)]
pub(crate) struct RawPackageDescriptor {
    app_id: Option<String>,
    name: Option<String>,
    version: Option<String>,
    uri: Option<String>,
    installer_kind: Option<InstallerKind>,
    sha256: Option<String>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    signature_key: Option<String>,
    #[serde(default)]
    vetted_domains: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    silent_args: Vec<String>,
    #[serde(default)]
    uninstall_command: Option<String>,
}

fn is_valid_sha256(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl RawPackageDescriptor {
    pub(crate) fn validate(self, base_dir: &Path) -> Result<PackageDescriptor, CatalogError> {
        let app_id = self
            .app_id
            .filter(|s| !s.is_empty())
            .ok_or(CatalogError::MissingField(
                "<unknown>".to_string(),
                "app_id",
            ))?;
        let field = |value: Option<String>, field: &'static str| {
            value.ok_or_else(|| CatalogError::MissingField(app_id.clone(), field))
        };
        let name = field(self.name, "name")?;
        let version = field(self.version, "version")?;
        let raw_uri = field(self.uri, "uri")?;
        let installer_kind = self
            .installer_kind
            .ok_or_else(|| CatalogError::MissingField(app_id.clone(), "installer_kind"))?;
        let sha256 = field(self.sha256, "sha256")?;
        if !is_valid_sha256(&sha256) {
            return Err(CatalogError::MalformedHash(app_id));
        }

        let hmac = match (self.signature, self.signature_key) {
            (Some(signature_b64), Some(key_b64)) => Some(HmacSpec {
                signature_b64,
                key_b64,
            }),
            (None, None) => None,
            (_, _) => return Err(CatalogError::UnpairedHmac(app_id)),
        };

        if self.dependencies.iter().any(|dep| dep == &app_id) {
            return Err(CatalogError::SelfReferentialDependency(app_id));
        }

        let vetted_domains: HashSet<String> = self
            .vetted_domains
            .into_iter()
            .map(|d| d.to_ascii_lowercase())
            .collect();

        let uri = parse_uri(&app_id, &raw_uri, base_dir)?;

        if let PackageUri::Https(_) = &uri {
            let host = uri.host_str().unwrap_or_default().to_ascii_lowercase();
            if vetted_domains.is_empty() || !vetted_domains.contains(&host) {
                return Err(CatalogError::MissingVettedDomain(app_id));
            }
        }

        let uninstall_command = self.uninstall_command.map(|cmd| tokenize_command(&cmd));

        Ok(PackageDescriptor {
            app_id,
            name,
            version,
            uri,
            installer_kind,
            sha256,
            hmac,
            vetted_domains,
            dependencies: self.dependencies,
            silent_args: self.silent_args,
            uninstall_command,
        })
    }
}

/// Parses the `uri` field.
///
/// `https://`/`http://` URIs are parsed with [`url::Url`]. `file://` URIs use a
/// small local convention rather than WHATWG file-URL rules, because the
/// latter has no portable notion of a *relative* file URL: `file:///…` (three
/// slashes) is an absolute path, while `file://…` (two slashes, no leading
/// `/` after them) or `file:…` names a path resolved against the catalog's
/// own directory.
fn parse_uri(app_id: &str, raw: &str, base_dir: &Path) -> Result<PackageUri, CatalogError> {
    if raw.starts_with("file:") {
        return Ok(PackageUri::File(resolve_file_path(raw, base_dir)));
    }

    let url = Url::parse(raw)
        .map_err(|e| CatalogError::MalformedUri(app_id.to_string(), e.to_string()))?;
    match url.scheme() {
        "https" => Ok(PackageUri::Https(url)),
        "http" => Ok(PackageUri::Http(url)),
        other => Err(CatalogError::UnsupportedScheme(
            app_id.to_string(),
            other.to_string(),
        )),
    }
}

/// Resolves a `file:` URI to an absolute path.
///
/// The strict three-slash form (`file:///abs/path`) is handed to
/// [`file_url::url_to_path`], which knows how to decode Windows drive letters
/// and UNC hosts the same way on every platform. Anything looser
/// (`file://relative/path` or `file:relative/path`) is our own
/// catalog-relative convention: the remainder, percent-decoded, is joined
/// onto the catalog's base directory unless it is itself a Windows absolute
/// path (`C:\...`).
fn resolve_file_path(raw: &str, base_dir: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("file:///") {
        if let Ok(url) = Url::parse(raw) {
            if let Some(path) = file_url::url_to_path(&url) {
                return path;
            }
        }
        return PathBuf::from("/").join(percent_decode(rest));
    }

    let rest = raw
        .strip_prefix("file://")
        .or_else(|| raw.strip_prefix("file:"))
        .unwrap_or(raw);
    let decoded = percent_decode(rest);
    if is_windows_absolute(&decoded) {
        PathBuf::from(decoded)
    } else {
        base_dir.join(decoded)
    }
}

/// Splits an uninstall command line into argv, honoring `"..."`/`'...'`
/// quoting but otherwise leaving every character — backslashes included —
/// untouched. Deliberately not POSIX shell escaping: a Windows path's
/// backslashes are path separators, not escape characters, so a naive
/// `shlex::split` would eat them.
fn tokenize_command(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

fn is_windows_absolute(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}
