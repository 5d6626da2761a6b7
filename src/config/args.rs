//! Command-line arguments for the duckgate server
//!
//! Every argument can also be set through an environment variable. The
//! variable names match what existing deployments already export (`PORT`,
//! `USERNAME`, `PASSWORD`, `API_TOKEN`, `AWS_*`); everything else is
//! prefixed with `DUCKGATE_`.

use clap::Parser;
use duckgate_engine::ExtensionSpec;
use std::path::PathBuf;

use super::defaults::*;

/// Command-line arguments for the duckgate server
#[derive(Parser, Debug, Clone)]
#[command(name = "duckgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP query gateway in front of an embedded DuckDB instance")]
pub struct GatewayArgs {
    /// Path to configuration file (TOML format)
    /// If not specified, looks for duckgate.toml in current directory,
    /// /etc/duckgate/, or ~/.config/duckgate/
    #[arg(short, long, env = "DUCKGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Generate example configuration file and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Host to listen on
    #[arg(long, env = "DUCKGATE_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "DUCKGATE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    // ===== Authentication =====
    /// Username for HTTP Basic authentication (requires --password)
    #[arg(long, env = "USERNAME")]
    pub username: Option<String>,

    /// Password for HTTP Basic authentication (requires --username)
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Bearer token accepted on the query endpoints
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    // ===== Engine =====
    /// Database file, or ":memory:"
    #[arg(long, env = "DUCKGATE_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Writable working directory for the engine
    #[arg(long, env = "DUCKGATE_WORKING_DIR", default_value = DEFAULT_WORKING_DIR)]
    pub working_dir: PathBuf,

    /// Extensions to install and load on first use, comma separated.
    /// Use name@repository for non-core repositories (e.g. arrow@community).
    #[arg(
        long,
        env = "DUCKGATE_EXTENSIONS",
        value_delimiter = ',',
        default_values = DEFAULT_EXTENSIONS
    )]
    pub extensions: Vec<ExtensionSpec>,

    /// Directory extensions are installed into
    #[arg(long, env = "DUCKGATE_EXTENSION_DIR")]
    pub extension_dir: Option<PathBuf>,

    /// Open the database with unsigned extensions allowed
    #[arg(
        long,
        env = "DUCKGATE_ALLOW_UNSIGNED_EXTENSIONS",
        default_value_t = DEFAULT_ALLOW_UNSIGNED_EXTENSIONS,
        action = clap::ArgAction::Set
    )]
    pub allow_unsigned_extensions: bool,

    /// Cache HTTP metadata across requests
    #[arg(
        long,
        env = "DUCKGATE_HTTP_METADATA_CACHE",
        default_value_t = DEFAULT_HTTP_METADATA_CACHE,
        action = clap::ArgAction::Set
    )]
    pub http_metadata_cache: bool,

    /// Cache object metadata such as Parquet footers
    #[arg(
        long,
        env = "DUCKGATE_OBJECT_CACHE",
        default_value_t = DEFAULT_OBJECT_CACHE,
        action = clap::ArgAction::Set
    )]
    pub object_cache: bool,

    /// Block local filesystem access once setup is done
    #[arg(long, env = "DUCKGATE_DISABLE_LOCAL_FS")]
    pub disable_local_filesystem: bool,

    /// Lock the engine configuration once setup is done
    #[arg(long, env = "DUCKGATE_LOCK_CONFIGURATION")]
    pub lock_configuration: bool,

    /// Extra trusted statement run during setup (repeatable)
    #[arg(long = "init-sql")]
    pub init_sql: Vec<String>,

    // ===== Object storage =====
    /// S3 region
    #[arg(long, env = "AWS_REGION")]
    pub s3_region: Option<String>,

    /// S3 access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub s3_access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub s3_secret_access_key: Option<String>,

    // ===== External catalog =====
    /// Token for the Iceberg REST catalog
    #[arg(long, env = "DUCKGATE_CATALOG_TOKEN", hide_env_values = true)]
    pub catalog_token: Option<String>,

    /// Endpoint of the Iceberg REST catalog
    #[arg(long, env = "DUCKGATE_CATALOG_ENDPOINT")]
    pub catalog_endpoint: Option<String>,

    /// Catalog (warehouse) identifier
    #[arg(long, env = "DUCKGATE_CATALOG_ID")]
    pub catalog_id: Option<String>,

    /// Alias the catalog is attached under
    #[arg(long, env = "DUCKGATE_CATALOG_ALIAS", default_value = DEFAULT_CATALOG_ALIAS)]
    pub catalog_alias: String,
}
