use anyhow::{Context, Result};
use dotenv::dotenv;
use notifier::{
    SyncEngine, admin, config,
    db_handler::DbHandler,
    discord_api::DiscordApi,
    scheduler,
    tally_api::TallyApi,
};
use std::sync::Arc;
use tracing::{error, info};
use utils::tracing::run_with_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    run_with_tracing(run).await
}

async fn run() -> Result<()> {
    info!("Proposal notifier starting up");
    let config = config::load()?;
    let credentials = config.credentials()?;

    let store = Arc::new(DbHandler::new(&config.database_url).await?);
    let source = Arc::new(TallyApi::new_with_endpoint(
        &config.tally_api_url,
        &credentials.tally_api_key,
        config.tally_page_limit,
    )?);
    let channel = Arc::new(DiscordApi::new(
        &credentials.discord_token,
        &credentials.proposals_channel_id,
    )?);

    let engine = Arc::new(SyncEngine::new(
        source,
        channel,
        store,
        config.sync_config(),
    ));

    let app = admin::router(admin::AdminState {
        engine: Arc::clone(&engine),
        admin_token: config.admin_token.as_deref().map(Arc::from),
    });
    let listener = tokio::net::TcpListener::bind(&config.admin_bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.admin_bind_addr))?;
    let addr = listener.local_addr()?;

    let server_handle = tokio::spawn(async move {
        info!(address = %addr, "Starting admin server");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Admin server error");
        }
    });

    let sync_handle = tokio::spawn(scheduler::run_periodic_sync(
        Arc::clone(&engine),
        config.sync_interval(),
    ));

    info!("All tasks started, application running indefinitely");

    tokio::select! {
        result = server_handle => {
            error!("Admin server task completed unexpectedly: {:?}", result);
        }
        result = sync_handle => {
            error!("Sync task completed unexpectedly: {:?}", result);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully");
        }
    }

    info!("Application shutting down");
    Ok(())
}
