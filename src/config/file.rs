//! Configuration file support for duckgate
//!
//! This module provides TOML configuration file parsing. Values from the file
//! sit beneath command-line arguments and environment variables; see
//! [`super::merge`].
//!
//! ## Priority Order
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values
//!
//! ## Example Configuration
//!
//! ```toml
//! # duckgate.toml
//!
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! log_level = "info"
//!
//! [engine]
//! working_dir = "/tmp"
//! extensions = ["httpfs", "json"]
//! lock_configuration = true
//!
//! [storage]
//! s3_region = "us-east-1"
//!
//! [catalog]
//! # endpoint = "https://catalog.example.com/iceberg"
//! # id = "account_warehouse"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::defaults::CONFIG_FILE_NAME;
use crate::error::{GatewayError, Result};

/// Root configuration structure for TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Listener and logging
    pub server: ServerSection,

    /// Query endpoint authentication
    pub auth: AuthSection,

    /// Embedded engine setup
    pub engine: EngineSection,

    /// Object-storage credentials
    pub storage: StorageSection,

    /// External Iceberg catalog
    pub catalog: CatalogSection,
}

/// Server section configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

/// Auth section configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_token: Option<String>,
}

impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSection")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Engine section configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub database: Option<String>,
    pub working_dir: Option<PathBuf>,
    /// Extension names, `name@repository` for non-core repositories
    pub extensions: Option<Vec<String>>,
    pub extension_dir: Option<PathBuf>,
    pub allow_unsigned_extensions: Option<bool>,
    pub http_metadata_cache: Option<bool>,
    pub object_cache: Option<bool>,
    pub disable_local_filesystem: Option<bool>,
    pub lock_configuration: Option<bool>,
    /// Extra trusted setup statements, run after the built-in sequence
    pub init_sql: Option<Vec<String>>,
}

/// Storage section configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub s3_region: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
}

impl std::fmt::Debug for StorageSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSection")
            .field("s3_region", &self.s3_region)
            .field("s3_access_key_id", &self.s3_access_key_id)
            .field(
                "s3_secret_access_key",
                &self.s3_secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Catalog section configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub token: Option<String>,
    pub endpoint: Option<String>,
    pub id: Option<String>,
    pub alias: Option<String>,
}

impl std::fmt::Debug for CatalogSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSection")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("id", &self.id)
            .field("alias", &self.alias)
            .finish()
    }
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&contents).map_err(|e| {
            GatewayError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Try to load configuration from default locations
    ///
    /// Searches in order:
    /// 1. ./duckgate.toml
    /// 2. /etc/duckgate/duckgate.toml
    /// 3. ~/.config/duckgate/duckgate.toml
    ///
    /// The first file that exists is used.
    pub fn load_default() -> Result<Option<(PathBuf, Self)>> {
        Self::load_first(&Self::default_paths())
    }

    /// Load the first of `paths` that exists. A file that exists but cannot
    /// be read or parsed is an error, not a reason to try the next path.
    fn load_first(paths: &[PathBuf]) -> Result<Option<(PathBuf, Self)>> {
        for path in paths {
            if path.exists() {
                return Self::load(path).map(|config| Some((path.clone(), config)));
            }
        }
        Ok(None)
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            Path::new("/etc/duckgate").join(CONFIG_FILE_NAME),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("duckgate").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Generate an example configuration file
    pub fn generate_example() -> String {
        r#"# duckgate Configuration File
# Copy to duckgate.toml and customize as needed
#
# Configuration priority (highest to lowest):
# 1. Command-line arguments
# 2. Environment variables
# 3. This configuration file
# 4. Default values

[server]
# Host and port of the HTTP API
host = "0.0.0.0"
port = 3000

# Log level (trace, debug, info, warn, error)
log_level = "info"

[auth]
# HTTP Basic authentication for /query and /streaming-query.
# Enabled only when both values are set.
# username = "admin"
# password = "change-me"

# Static bearer token accepted on the same endpoints
# api_token = "change-me"

[engine]
# Database file, or ":memory:"
database = ":memory:"

# Writable working directory for the engine
working_dir = "/tmp"

# Extensions installed and loaded on first use.
# Use "name@repository" for non-core repositories.
extensions = ["httpfs", "json"]

# Directory extensions are installed into
# extension_dir = "/var/lib/duckgate/extensions"

allow_unsigned_extensions = true
http_metadata_cache = true
object_cache = true

# Block local filesystem access once setup is done
disable_local_filesystem = false

# Lock the engine configuration once setup is done
lock_configuration = false

# Extra trusted statements run during setup
# init_sql = ["CREATE VIEW events AS SELECT * FROM 's3://bucket/events/*.parquet'"]

[storage]
# Object-storage credentials; applied only when all three are set
# s3_region = "us-east-1"
# s3_access_key_id = "..."
# s3_secret_access_key = "..."

[catalog]
# Iceberg REST catalog; attached only when token, endpoint and id are set
# token = "..."
# endpoint = "https://catalog.example.com/iceberg"
# id = "account_warehouse"
# alias = "catalog"
"#
        .to_string()
    }
}
