mod cli;
mod config;
mod model;
mod providers;
mod server;
mod sync;
mod util;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use cli::Command;
use server::AppState;
use sync::reconciler::{SyncReconciler, SyncSettings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskbridge=info".into()),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = cli::parse_args(&args)?;
    if command == Command::Help {
        cli::print_help();
        return Ok(());
    }

    let config = config::load_config()?;
    let client = providers::http_client(&config);
    let tasks = providers::create_task_system(&config, client.clone())
        .context("Asana is not configured")?;
    let settings = SyncSettings::from_config(&config);

    match command {
        Command::Fields => {
            let mapping =
                sync::fields::load_field_schema(tasks.as_ref(), &settings.project_id, &settings.critical)
                    .await
                    .context("Failed to load the Asana field schema")?;
            println!("{}", cli::render_fields(&mapping));
        }
        Command::Serve { host, port } => {
            let addr = cli::listen_addr(&config, host.as_deref(), port).await?;
            let inbox = providers::create_inbox_system(&config, client.clone())
                .context("Intercom is not configured")?;
            info!(project = %settings.project_id, "starting bridge");
            let sync = SyncReconciler::new(inbox, tasks, client, settings);
            if let Err(e) = sync.refresh_fields().await {
                warn!(error = %e, "field schema unavailable at startup, loading on first use");
            }

            let state = Arc::new(AppState {
                sync,
                asana_secret: config.asana.as_ref().and_then(|a| a.webhook_secret.clone()),
                intercom_secret: config.intercom.as_ref().and_then(|i| i.client_secret.clone()),
            });
            server::serve(state, addr).await?;
        }
        Command::Help => {}
    }

    Ok(())
}
