//! `strata create-project`

use anyhow::{Context, Result};
use strata_collab::Project;
use tracing::info;

/// Create an empty project owned by `owner` and print its id
pub async fn run(name: &str, owner: &str) -> Result<()> {
    let config = crate::server::load_config().context("Failed to load configuration")?;
    let store = crate::server::open_store(&config).await?;

    let id = uuid::Uuid::new_v4().to_string();
    let project = Project::new(id.clone(), name, owner);
    store
        .create(&project)
        .await
        .context("Failed to create project")?;
    info!(room_id = %id, owner = %owner, "project created");

    println!("{id}");
    Ok(())
}
