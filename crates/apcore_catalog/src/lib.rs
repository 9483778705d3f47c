//! Loading and validation of the installable-package catalog.
//!
//! A catalog is a frozen, in-memory index of [`PackageDescriptor`]s built once
//! from a JSON document. Nothing in this crate performs network or process
//! I/O; it only parses and validates.

mod descriptor;
mod error;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use descriptor::{HmacSpec, InstallerKind, PackageDescriptor, PackageUri};
pub use error::CatalogError;

/// An immutable, validated set of [`PackageDescriptor`]s keyed by `app_id`.
///
/// Constructed once via [`Catalog::load_str`] or [`Catalog::load_file`].
/// Descriptors are frozen after load: there is no API to mutate a loaded
/// catalog, only to build a new one.
#[derive(Debug, Clone)]
pub struct Catalog {
    by_id: HashMap<String, PackageDescriptor>,
    order: Vec<String>,
}

impl Catalog {
    /// Parses and validates a catalog from a JSON document's text.
    ///
    /// Relative `file://` URIs are resolved against `base_dir`.
    pub fn load_str(json: &str, base_dir: &Path) -> Result<Self, CatalogError> {
        let raw: Vec<descriptor::RawPackageDescriptor> =
            serde_json::from_str(json).map_err(|e| CatalogError::Malformed(e.to_string()))?;

        let mut by_id = HashMap::with_capacity(raw.len());
        let mut order = Vec::with_capacity(raw.len());

        for entry in raw {
            let descriptor = entry.validate(base_dir)?;
            if by_id.contains_key(&descriptor.app_id) {
                return Err(CatalogError::DuplicateAppId(descriptor.app_id));
            }
            order.push(descriptor.app_id.clone());
            by_id.insert(descriptor.app_id.clone(), descriptor);
        }

        tracing::debug!(count = order.len(), "loaded catalog");
        Ok(Self { by_id, order })
    }

    /// Reads, parses, and validates a catalog from a JSON file on disk.
    ///
    /// Relative `file://` URIs within the document are resolved against the
    /// file's parent directory.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = fs_err::read_to_string(path)
            .map_err(|e| CatalogError::Io(path.to_path_buf(), e.to_string()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::load_str(&contents, &base_dir)
    }

    /// Looks up a descriptor by `app_id`.
    pub fn get(&self, app_id: &str) -> Result<&PackageDescriptor, CatalogError> {
        self.by_id
            .get(app_id)
            .ok_or_else(|| CatalogError::NotFound(app_id.to_string()))
    }

    /// Returns whether `app_id` is present in this catalog.
    pub fn contains(&self, app_id: &str) -> bool {
        self.by_id.contains_key(app_id)
    }

    /// Returns every descriptor, in the order it appeared in the source document.
    pub fn list(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.order.iter().map(move |id| &self.by_id[id])
    }

    /// Number of descriptors in the catalog.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the catalog has no descriptors.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn base() -> PathBuf {
        PathBuf::from("/catalogs")
    }

    #[test]
    fn loads_minimal_valid_catalog() {
        let json = r#"[
            {
                "app_id": "7zip",
                "name": "7-Zip",
                "version": "23.01",
                "uri": "file:///installers/7zip.msi",
                "installer_kind": "msi",
                "sha256": "00000000000000000000000000000000000000000000000000000000000000aa",
                "vetted_domains": [],
                "dependencies": [],
                "silent_args": []
            }
        ]"#;
        let catalog = Catalog::load_str(json, &base()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("7zip"));
        assert_eq!(catalog.get("7zip").unwrap().name, "7-Zip");
    }

    #[test]
    fn rejects_duplicate_app_id() {
        let json = r#"[
            {"app_id": "a", "name": "A", "version": "1", "uri": "file:///a.exe",
             "installer_kind": "exe", "sha256": "aa000000000000000000000000000000000000000000000000000000000000aa",
             "vetted_domains": [], "dependencies": [], "silent_args": []},
            {"app_id": "a", "name": "A2", "version": "2", "uri": "file:///a2.exe",
             "installer_kind": "exe", "sha256": "bb000000000000000000000000000000000000000000000000000000000000bb",
             "vetted_domains": [], "dependencies": [], "silent_args": []}
        ]"#;
        let err = Catalog::load_str(json, &base()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateAppId(id) if id == "a"));
    }

    #[test]
    fn rejects_bad_sha256() {
        let json = r#"[{"app_id": "a", "name": "A", "version": "1", "uri": "file:///a.exe",
             "installer_kind": "exe", "sha256": "not-a-hash",
             "vetted_domains": [], "dependencies": [], "silent_args": []}]"#;
        let err = Catalog::load_str(json, &base()).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedHash(_)));
    }

    #[test]
    fn rejects_unknown_installer_kind() {
        let json = r#"[{"app_id": "a", "name": "A", "version": "1", "uri": "file:///a.dmg",
             "installer_kind": "dmg", "sha256": "aa000000000000000000000000000000000000000000000000000000000000aa",
             "vetted_domains": [], "dependencies": [], "silent_args": []}]"#;
        let err = Catalog::load_str(json, &base()).unwrap_err();
        // `dmg` fails to parse at the serde layer, so loading itself errors.
        assert!(matches!(err, CatalogError::Malformed(_)));
    }

    #[test]
    fn rejects_self_referential_dependency() {
        let json = r#"[{"app_id": "a", "name": "A", "version": "1", "uri": "file:///a.exe",
             "installer_kind": "exe", "sha256": "aa000000000000000000000000000000000000000000000000000000000000aa",
             "vetted_domains": [], "dependencies": ["a"], "silent_args": []}]"#;
        let err = Catalog::load_str(json, &base()).unwrap_err();
        assert!(matches!(err, CatalogError::SelfReferentialDependency(id) if id == "a"));
    }

    #[test]
    fn rejects_unpaired_hmac() {
        let json = r#"[{"app_id": "a", "name": "A", "version": "1", "uri": "file:///a.exe",
             "installer_kind": "exe", "sha256": "aa000000000000000000000000000000000000000000000000000000000000aa",
             "vetted_domains": [], "dependencies": [], "silent_args": [],
             "signature": "abcd"}]"#;
        let err = Catalog::load_str(json, &base()).unwrap_err();
        assert!(matches!(err, CatalogError::UnpairedHmac(_)));
    }

    #[test]
    fn requires_vetted_domains_for_https() {
        let json = r#"[{"app_id": "a", "name": "A", "version": "1", "uri": "https://good.example/a.exe",
             "installer_kind": "exe", "sha256": "aa000000000000000000000000000000000000000000000000000000000000aa",
             "vetted_domains": [], "dependencies": [], "silent_args": []}]"#;
        let err = Catalog::load_str(json, &base()).unwrap_err();
        assert!(matches!(err, CatalogError::MissingVettedDomain(_)));
    }

    #[test]
    fn resolves_relative_file_uri_against_base_dir() {
        let json = r#"[{"app_id": "a", "name": "A", "version": "1", "uri": "file://sub/a.exe",
             "installer_kind": "exe", "sha256": "aa000000000000000000000000000000000000000000000000000000000000aa",
             "vetted_domains": [], "dependencies": [], "silent_args": []}]"#;
        let catalog = Catalog::load_str(json, Path::new("/catalogs")).unwrap();
        let descriptor = catalog.get("a").unwrap();
        let path = descriptor.uri.to_file_path().unwrap();
        assert!(path.starts_with("/catalogs"));
    }
}
