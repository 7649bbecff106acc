//! Production configuration validation

use super::config::AppConfig;
use super::loader::environment;
use anyhow::{bail, Result};
use tracing::warn;

const DEVELOPMENT_KEY: &str = "strata-development-key";

/// Validate configuration for production security
pub fn validate_production_config(config: &AppConfig) -> Result<()> {
    check(config, environment().eq_ignore_ascii_case("production"))
}

fn check(config: &AppConfig, is_production: bool) -> Result<()> {
    if config.auth.signing_key.is_empty() {
        bail!("auth.signing_key must not be empty");
    }

    if !is_production {
        return Ok(());
    }

    if config.auth.signing_key == DEVELOPMENT_KEY {
        bail!("auth.signing_key still holds the development key; set STRATA_AUTH__SIGNING_KEY");
    }

    if config.server.host == "0.0.0.0" {
        warn!(
            "SECURITY WARNING: Server is binding to all interfaces (0.0.0.0) in production. \
             Consider binding to 127.0.0.1 and using a reverse proxy."
        );
    }

    if config.server.cors_origins.is_empty() {
        warn!("SECURITY WARNING: CORS allows any origin in production.");
    }

    Ok(())
}
