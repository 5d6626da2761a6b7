//! Settings consumed by the session's setup sequence.
//!
//! Credentials come in triples. A triple is only applied when every member
//! is present; a partial triple is reported by field name and skipped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::EngineError;

/// Database path meaning "in-memory database".
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Default writable working directory for the engine.
pub const DEFAULT_WORKING_DIR: &str = "/tmp";

/// Default alias under which the external catalog is attached.
pub const DEFAULT_CATALOG_ALIAS: &str = "catalog";

/// Name of the secret created for the external catalog.
pub const CATALOG_SECRET_NAME: &str = "duckgate_catalog_secret";

/// Extension required to attach an Iceberg REST catalog.
const CATALOG_EXTENSION: &str = "iceberg";

/// An extension to install and load during setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSpec {
    /// Extension name, e.g. `httpfs`.
    pub name: String,
    /// Repository to install from, e.g. `community`. `None` uses the core
    /// repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl ExtensionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: None,
        }
    }

    pub fn from_repository(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: Some(repository.into()),
        }
    }
}

impl FromStr for ExtensionSpec {
    type Err = EngineError;

    /// Parses `name` or `name@repository`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, repository) = match s.split_once('@') {
            Some((name, repo)) => (name.trim(), Some(repo.trim())),
            None => (s, None),
        };
        if !is_plain_identifier(name) {
            return Err(EngineError::Internal(format!(
                "invalid extension name '{}'",
                name
            )));
        }
        if let Some(repo) = repository {
            if !is_plain_identifier(repo) {
                return Err(EngineError::Internal(format!(
                    "invalid extension repository '{}'",
                    repo
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            repository: repository.map(str::to_string),
        })
    }
}

impl fmt::Display for ExtensionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repository {
            Some(repo) => write!(f, "{}@{}", self.name, repo),
            None => f.write_str(&self.name),
        }
    }
}

/// Complete object-storage credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Complete external-catalog connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub token: String,
    pub endpoint: String,
    pub catalog_id: String,
    pub alias: String,
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("token", &"<redacted>")
            .field("endpoint", &"<redacted>")
            .field("catalog_id", &"<redacted>")
            .field("alias", &self.alias)
            .finish()
    }
}

/// Result of checking an all-or-nothing group of settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completeness<T> {
    /// No member configured.
    Absent,
    /// Some members configured; holds the names of the missing ones.
    Partial(Vec<&'static str>),
    /// Every member configured.
    Complete(T),
}

/// Configuration for the engine session.
///
/// # Defaults
///
/// | Field | Default |
/// |---|---|
/// | `database` | `:memory:` |
/// | `working_dir` | `/tmp` |
/// | `extensions` | `httpfs`, `json` |
/// | `allow_unsigned_extensions` | `true` |
/// | `http_metadata_cache` | `true` |
/// | `object_cache` | `true` |
/// | `lock_configuration` | `false` |
/// | `disable_local_filesystem` | `false` |
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Database file, or `:memory:`.
    pub database: String,

    /// Writable directory used as the engine's home directory.
    pub working_dir: PathBuf,

    /// Extensions installed and loaded on first use, in order.
    pub extensions: Vec<ExtensionSpec>,

    /// Directory extensions are installed into and loaded from.
    pub extension_dir: Option<PathBuf>,

    /// Open the database with `allow_unsigned_extensions`.
    pub allow_unsigned_extensions: bool,

    /// Cache HTTP metadata across requests.
    pub http_metadata_cache: bool,

    /// Cache object metadata (e.g. Parquet footers).
    pub object_cache: bool,

    pub s3_region: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,

    pub catalog_token: Option<String>,
    pub catalog_endpoint: Option<String>,
    pub catalog_id: Option<String>,
    pub catalog_alias: String,

    /// Block access to the local filesystem once setup is done.
    pub disable_local_filesystem: bool,

    /// Lock the configuration once setup is done. Always the last step.
    pub lock_configuration: bool,

    /// Additional trusted statements run after the built-in sequence.
    pub init_sql: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            database: IN_MEMORY_DATABASE.to_string(),
            working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
            extensions: vec![ExtensionSpec::new("httpfs"), ExtensionSpec::new("json")],
            extension_dir: None,
            allow_unsigned_extensions: true,
            http_metadata_cache: true,
            object_cache: true,
            s3_region: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            catalog_token: None,
            catalog_endpoint: None,
            catalog_id: None,
            catalog_alias: DEFAULT_CATALOG_ALIAS.to_string(),
            disable_local_filesystem: false,
            lock_configuration: false,
            init_sql: Vec::new(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extensions: Vec<String> = self.extensions.iter().map(|e| e.to_string()).collect();
        f.debug_struct("SessionConfig")
            .field("database", &self.database)
            .field("working_dir", &self.working_dir)
            .field("extensions", &extensions)
            .field("extension_dir", &self.extension_dir)
            .field("allow_unsigned_extensions", &self.allow_unsigned_extensions)
            .field("http_metadata_cache", &self.http_metadata_cache)
            .field("object_cache", &self.object_cache)
            .field("storage_credentials", &self.storage_credentials_state())
            .field("catalog", &self.catalog_state())
            .field("catalog_alias", &self.catalog_alias)
            .field("disable_local_filesystem", &self.disable_local_filesystem)
            .field("lock_configuration", &self.lock_configuration)
            .field("init_sql", &self.init_sql.len())
            .finish()
    }
}

impl SessionConfig {
    /// Settings for tests and embedded use: in-memory, no extensions, no
    /// HTTP caching.
    pub fn offline(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            extensions: Vec::new(),
            http_metadata_cache: false,
            ..Self::default()
        }
    }

    /// Object-storage credentials, if the full triple is configured.
    pub fn storage_credentials(&self) -> Completeness<StorageCredentials> {
        match (
            non_empty(&self.s3_region),
            non_empty(&self.s3_access_key_id),
            non_empty(&self.s3_secret_access_key),
        ) {
            (None, None, None) => Completeness::Absent,
            (Some(region), Some(key), Some(secret)) => {
                Completeness::Complete(StorageCredentials {
                    region: region.to_string(),
                    access_key_id: key.to_string(),
                    secret_access_key: secret.to_string(),
                })
            }
            (region, key, secret) => {
                let mut missing = Vec::new();
                if region.is_none() {
                    missing.push("s3_region");
                }
                if key.is_none() {
                    missing.push("s3_access_key_id");
                }
                if secret.is_none() {
                    missing.push("s3_secret_access_key");
                }
                Completeness::Partial(missing)
            }
        }
    }

    /// External-catalog parameters, if the full triple is configured.
    pub fn catalog(&self) -> Completeness<CatalogConfig> {
        match (
            non_empty(&self.catalog_token),
            non_empty(&self.catalog_endpoint),
            non_empty(&self.catalog_id),
        ) {
            (None, None, None) => Completeness::Absent,
            (Some(token), Some(endpoint), Some(catalog_id)) => {
                Completeness::Complete(CatalogConfig {
                    token: token.to_string(),
                    endpoint: endpoint.to_string(),
                    catalog_id: catalog_id.to_string(),
                    alias: self.catalog_alias.clone(),
                })
            }
            (token, endpoint, catalog_id) => {
                let mut missing = Vec::new();
                if token.is_none() {
                    missing.push("catalog_token");
                }
                if endpoint.is_none() {
                    missing.push("catalog_endpoint");
                }
                if catalog_id.is_none() {
                    missing.push("catalog_id");
                }
                Completeness::Partial(missing)
            }
        }
    }

    /// Extensions to install, with the catalog extension appended when a
    /// complete catalog triple is configured.
    pub fn effective_extensions(&self) -> Vec<ExtensionSpec> {
        let mut extensions = self.extensions.clone();
        if matches!(self.catalog(), Completeness::Complete(_))
            && !extensions.iter().any(|e| e.name == CATALOG_EXTENSION)
        {
            extensions.push(ExtensionSpec::new(CATALOG_EXTENSION));
        }
        extensions
    }

    /// Check values that would otherwise be spliced into setup statements.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.database.trim().is_empty() {
            return Err(EngineError::Internal("database must not be empty".into()));
        }
        if self.working_dir.as_os_str().is_empty() {
            return Err(EngineError::Internal(
                "working directory must not be empty".into(),
            ));
        }
        for ext in &self.extensions {
            let valid = is_plain_identifier(&ext.name)
                && ext.repository.as_deref().map_or(true, is_plain_identifier);
            if !valid {
                return Err(EngineError::Internal(format!(
                    "invalid extension '{}'",
                    ext
                )));
            }
        }
        if !is_plain_identifier(&self.catalog_alias) {
            return Err(EngineError::Internal(format!(
                "invalid catalog alias '{}'",
                self.catalog_alias
            )));
        }
        Ok(())
    }

    fn storage_credentials_state(&self) -> &'static str {
        match self.storage_credentials() {
            Completeness::Absent => "absent",
            Completeness::Partial(_) => "partial",
            Completeness::Complete(_) => "configured",
        }
    }

    fn catalog_state(&self) -> &'static str {
        match self.catalog() {
            Completeness::Absent => "absent",
            Completeness::Partial(_) => "partial",
            Completeness::Complete(_) => "configured",
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// ASCII letters, digits and underscores, not starting with a digit.
pub(crate) fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
