//! `strata issue-token`

use anyhow::{Context, Result};
use strata_collab::Identity;

/// Print a bearer token signed with the configured key
pub fn run(email: &str, name: Option<&str>) -> Result<()> {
    let config = crate::server::load_config().context("Failed to load configuration")?;
    let authenticator = crate::server::authenticator(&config);

    let identity = Identity::new(email, name.unwrap_or(email));
    let token = authenticator
        .issue_bearer(&identity)
        .context("Failed to sign token")?;

    println!("{token}");
    Ok(())
}
