//! Configuration module for duckgate
//!
//! This module is organized into submodules:
//! - `defaults` - Default constants and values
//! - `args` - CLI argument definitions
//! - `auth` - Query endpoint authentication
//! - `file` - TOML configuration file
//! - `merge` - Merging file values beneath CLI/env values

mod args;
mod auth;
mod defaults;
pub mod file;
mod merge;

// Re-export submodule types
pub use args::GatewayArgs;
pub use auth::{AuthConfig, BasicCredentials};
pub use defaults::*;
pub use file::ConfigFile;
pub use merge::merge_config_with_args;

use duckgate_engine::SessionConfig;
use std::net::{IpAddr, SocketAddr};
use tracing::warn;

use crate::error::{GatewayError, Result};

/// Complete configuration for the duckgate server.
///
/// # Configuration Sources
///
/// Configuration is loaded from multiple sources with this precedence:
/// 1. **CLI arguments** (highest priority)
/// 2. **Environment variables** - `PORT`, `USERNAME`, `PASSWORD`, `API_TOKEN`,
///    `AWS_*` and `DUCKGATE_*`
/// 3. **Config file** - TOML configuration file
/// 4. **Built-in defaults** (lowest priority)
///
/// # Example
///
/// ```rust,ignore
/// use duckgate::config::{GatewayArgs, GatewayConfig};
///
/// let args = GatewayArgs::parse();
/// let config = GatewayConfig::from_args(args)?;
/// config.validate()?;
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP API listens on
    pub listen_addr: SocketAddr,

    /// Log level used when RUST_LOG is unset
    pub log_level: String,

    /// Query endpoint authentication
    pub auth: AuthConfig,

    /// Engine session settings
    pub session: SessionConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::from([0, 0, 0, 0]), DEFAULT_PORT),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            auth: AuthConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Build the configuration from parsed (and merged) arguments.
    pub fn from_args(args: GatewayArgs) -> Result<Self> {
        let host: IpAddr = args.host.parse().map_err(|e| {
            GatewayError::Config(format!("Invalid listen host '{}': {}", args.host, e))
        })?;

        if args.username.is_some() != args.password.is_some() {
            warn!("Only one of username/password is set; HTTP Basic authentication stays disabled");
        }
        let auth = AuthConfig::from_parts(args.username, args.password, args.api_token);

        let session = SessionConfig {
            database: args.database,
            working_dir: args.working_dir,
            extensions: args.extensions,
            extension_dir: args.extension_dir,
            allow_unsigned_extensions: args.allow_unsigned_extensions,
            http_metadata_cache: args.http_metadata_cache,
            object_cache: args.object_cache,
            s3_region: args.s3_region,
            s3_access_key_id: args.s3_access_key_id,
            s3_secret_access_key: args.s3_secret_access_key,
            catalog_token: args.catalog_token,
            catalog_endpoint: args.catalog_endpoint,
            catalog_id: args.catalog_id,
            catalog_alias: args.catalog_alias,
            disable_local_filesystem: args.disable_local_filesystem,
            lock_configuration: args.lock_configuration,
            init_sql: args.init_sql,
        };

        Ok(Self {
            listen_addr: SocketAddr::new(host, args.port),
            log_level: args.log_level,
            auth,
            session,
        })
    }

    /// Validate the configuration before starting the server.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.port() == 0 {
            return Err(GatewayError::Config(
                "HTTP listen port must be between 1 and 65535".to_string(),
            ));
        }

        self.session
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        if !self.session.working_dir.exists() {
            warn!(
                working_dir = %self.session.working_dir.display(),
                "Engine working directory does not exist"
            );
        }

        if !self.auth.is_enabled() {
            warn!(
                "Authentication is DISABLED. Anyone who can reach {} can run queries. \
                 Set USERNAME/PASSWORD or API_TOKEN to require credentials.",
                self.listen_addr
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> GatewayArgs {
        let mut argv = vec!["duckgate"];
        argv.extend_from_slice(extra);
        GatewayArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_from_args() {
        let config = GatewayConfig::from_args(args(&[
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--username",
            "admin",
            "--password",
            "pw",
            "--lock-configuration",
        ]))
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(config.auth.basic.is_some());
        assert!(config.session.lock_configuration);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_host() {
        let err = GatewayConfig::from_args(args(&["--host", "not-an-ip"])).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let config = GatewayConfig::from_args(args(&["--port", "0"])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_catalog_alias() {
        let config = GatewayConfig::from_args(args(&["--catalog-alias", "bad alias"])).unwrap();
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr.port(), 3000);
        assert!(!config.auth.is_enabled());
        assert_eq!(config.session.database, ":memory:");
    }
}
