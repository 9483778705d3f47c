use thiserror::Error;

/// Everything that can go wrong while loading or looking up a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The document failed to parse as the expected JSON shape.
    #[error("catalog document is malformed: {0}")]
    Malformed(String),

    /// A package is missing a required field.
    #[error("package {0:?} is missing required field {1:?}")]
    MissingField(String, &'static str),

    /// Two packages in the same catalog declared the same `app_id`.
    #[error("duplicate app_id {0:?} in catalog")]
    DuplicateAppId(String),

    /// A `sha256` field is not 64 lowercase hex digits.
    #[error("package {0:?} has a malformed sha256 digest")]
    MalformedHash(String),

    /// Only one of `signature`/`signature_key` was present.
    #[error("package {0:?} declares an HMAC signature or key without its counterpart")]
    UnpairedHmac(String),

    /// A dependency list names the package itself.
    #[error("package {0:?} declares a dependency on itself")]
    SelfReferentialDependency(String),

    /// An `https://` URI did not supply vetted domains covering its own host.
    #[error("package {0:?} uses an https:// URI but does not vet its own host")]
    MissingVettedDomain(String),

    /// The `uri` field used a scheme other than `https`, `http`, or `file`.
    #[error("package {0:?} has uri with unsupported scheme {1:?}")]
    UnsupportedScheme(String, String),

    /// The `uri` field could not be parsed at all.
    #[error("package {0:?} has an unparseable uri: {1}")]
    MalformedUri(String, String),

    /// A requested `app_id` is not present in the catalog.
    #[error("app_id {0:?} not found in catalog")]
    NotFound(String),

    /// The catalog file could not be read from disk.
    #[error("failed to read catalog file {0:?}: {1}")]
    Io(std::path::PathBuf, String),
}
