use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_core::config::env_opt;
use relay_discord::client::DiscordBackend;
use relay_discord::config::BackendConfig;
use relay_pipeline::config::PipelineConfig;
use relay_pipeline::service::RelayService;
use relay_pipeline::sweeper;
use relay_worker::bootstrap::{open_stores, AccountSeed};
use relay_worker::cli::{Cli, Command};
use relay_worker::commands::{render, Relay};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay_worker=debug,relay_pipeline=debug,relay_discord=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let backend_config = BackendConfig::from_env().context("Invalid backend configuration")?;
    let pipeline_config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let seed = AccountSeed::from_env().context("Invalid account configuration")?;
    let database_url = env_opt("DATABASE_URL");

    let stores = open_stores(database_url.as_deref(), seed).await?;
    let backend =
        Arc::new(DiscordBackend::new(backend_config).context("Failed to build backend client")?);

    let sweep_interval = pipeline_config.sweep_interval;
    let service = RelayService::new(backend, stores.accounts, stores.records, pipeline_config);

    let cancel = CancellationToken::new();
    let sweeper_handle =
        tokio::spawn(sweeper::run(service.registry(), sweep_interval, cancel.clone()));

    let relay = Relay::new(service, cli.api_key);
    let succeeded = match cli.command {
        Command::Shell => {
            tracing::info!("Reading commands from stdin");
            relay.run_shell().await.context("Failed to read stdin")?;
            true
        }
        command => {
            let result = relay.dispatch(command).await;
            let ok = result.is_ok();
            println!("{}", render(result));
            ok
        }
    };

    cancel.cancel();
    sweeper_handle.await.context("Sweeper task panicked")?;

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
