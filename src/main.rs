mod alerts;
mod api;
mod config;
mod error;
mod export;
mod flows;
mod logging;
mod models;
mod notify;
mod reconciler;
mod session;
mod ui;

use anyhow::{Context, Result};
use api::{LmsClient, Transport};
use config::Config;
use std::sync::Arc;
use tracing::info;
use ui::App;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    logging::init(&config.log_file)?;

    let client = LmsClient::new(&config)?;
    let session = client
        .login(&config.username, &config.password)
        .await
        .context("Login failed")?;
    info!(user_id = session.user_id, role = %session.role, "logged in");

    let transport: Arc<dyn Transport> = Arc::new(client.authenticated(&session));

    // Start TUI application
    let mut app = App::new(transport, session, &config);
    app.run().await?;

    Ok(())
}
