//! Configuration merging utilities
//!
//! This module merges configuration file values with command-line
//! arguments, where CLI arguments (and their environment variables) take
//! precedence.

use super::args::GatewayArgs;
use super::defaults::*;
use super::file::ConfigFile;
use crate::error::{GatewayError, Result};
use duckgate_engine::ExtensionSpec;

/// Merge configuration file values with CLI arguments.
/// CLI arguments take precedence over config file values.
/// Only applies config file values where CLI uses defaults.
pub fn merge_config_with_args(mut args: GatewayArgs, config: &ConfigFile) -> Result<GatewayArgs> {
    // Helper macro to apply config value if CLI is at default
    macro_rules! apply_if_default {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(val) = $config_val {
                if args.$field == $default {
                    args.$field = val;
                }
            }
        };
    }

    macro_rules! apply_if_default_string {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(ref val) = $config_val {
                if args.$field == $default {
                    args.$field = val.clone();
                }
            }
        };
    }

    macro_rules! apply_option {
        ($field:ident, $config_val:expr) => {
            if args.$field.is_none() {
                if let Some(ref val) = $config_val {
                    args.$field = Some(val.clone());
                }
            }
        };
    }

    // Server section
    apply_if_default_string!(host, config.server.host, DEFAULT_HOST);
    apply_if_default!(port, config.server.port, DEFAULT_PORT);
    apply_if_default_string!(log_level, config.server.log_level, DEFAULT_LOG_LEVEL);

    // Auth section
    apply_option!(username, config.auth.username);
    apply_option!(password, config.auth.password);
    apply_option!(api_token, config.auth.api_token);

    // Engine section
    apply_if_default_string!(database, config.engine.database, DEFAULT_DATABASE);
    if let Some(ref dir) = config.engine.working_dir {
        if args.working_dir == std::path::Path::new(DEFAULT_WORKING_DIR) {
            args.working_dir = dir.clone();
        }
    }
    if let Some(ref names) = config.engine.extensions {
        let defaults: Vec<ExtensionSpec> = DEFAULT_EXTENSIONS
            .iter()
            .map(|name| ExtensionSpec::new(*name))
            .collect();
        if args.extensions == defaults {
            args.extensions = names
                .iter()
                .map(|name| name.parse::<ExtensionSpec>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| GatewayError::Config(format!("Invalid extension in config file: {}", e)))?;
        }
    }
    apply_option!(extension_dir, config.engine.extension_dir);
    apply_if_default!(
        allow_unsigned_extensions,
        config.engine.allow_unsigned_extensions,
        DEFAULT_ALLOW_UNSIGNED_EXTENSIONS
    );
    apply_if_default!(
        http_metadata_cache,
        config.engine.http_metadata_cache,
        DEFAULT_HTTP_METADATA_CACHE
    );
    apply_if_default!(object_cache, config.engine.object_cache, DEFAULT_OBJECT_CACHE);
    apply_if_default!(
        disable_local_filesystem,
        config.engine.disable_local_filesystem,
        false
    );
    apply_if_default!(lock_configuration, config.engine.lock_configuration, false);
    if args.init_sql.is_empty() {
        if let Some(ref statements) = config.engine.init_sql {
            args.init_sql = statements.clone();
        }
    }

    // Storage section
    apply_option!(s3_region, config.storage.s3_region);
    apply_option!(s3_access_key_id, config.storage.s3_access_key_id);
    apply_option!(s3_secret_access_key, config.storage.s3_secret_access_key);

    // Catalog section
    apply_option!(catalog_token, config.catalog.token);
    apply_option!(catalog_endpoint, config.catalog.endpoint);
    apply_option!(catalog_id, config.catalog.id);
    apply_if_default_string!(catalog_alias, config.catalog.alias, DEFAULT_CATALOG_ALIAS);

    Ok(args)
}
