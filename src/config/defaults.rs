//! Default constants for duckgate configuration
//!
//! These constants define the default values used throughout the configuration
//! system when no explicit value is provided.

/// Default listen host for the HTTP API
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default database (in-memory)
pub const DEFAULT_DATABASE: &str = duckgate_engine::config::IN_MEMORY_DATABASE;

/// Default engine working directory
pub const DEFAULT_WORKING_DIR: &str = duckgate_engine::config::DEFAULT_WORKING_DIR;

/// Default extensions
pub const DEFAULT_EXTENSIONS: &[&str] = &["httpfs", "json"];

/// Default alias for the attached external catalog
pub const DEFAULT_CATALOG_ALIAS: &str = duckgate_engine::config::DEFAULT_CATALOG_ALIAS;

/// Default state of the unsigned-extension flag
pub const DEFAULT_ALLOW_UNSIGNED_EXTENSIONS: bool = true;

/// Default state of the HTTP metadata cache
pub const DEFAULT_HTTP_METADATA_CACHE: bool = true;

/// Default state of the object cache
pub const DEFAULT_OBJECT_CACHE: bool = true;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "duckgate.toml";
