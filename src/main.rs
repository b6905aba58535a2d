mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands, ConfigAction};
use vodhub::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir.clone() {
        settings.data_dir = Some(dir);
    }
    let hub = VodHub::open(settings).await?;

    match cli.command {
        Commands::Sites { all } => print(&hub.list_sites(all).await?),
        Commands::AddSite { url, name } => print(&hub.add_site(NewSite { url, name }).await?),
        Commands::EditSite { id, name, url, enabled, ssl_verify, note } => {
            let update = SiteUpdate { name, url, enabled, ssl_verify, note };
            print(&hub.update_site(id, update).await?)
        }
        Commands::RemoveSite { id } => print(&hub.remove_site(id).await?),
        Commands::MoveSite { id, direction } => {
            hub.move_site(id, direction).await?;
            print(&hub.list_sites(true).await?)
        }
        Commands::List { url, page, type_id, keyword } => {
            let params = ListParams { page, type_id, keyword };
            print(&hub.list_videos(&url, &params).await)
        }
        Commands::Detail { url, id } => print(&hub.video_detail(&url, &id).await),
        Commands::Search { keyword, sites, page } => {
            let ids = if sites.is_empty() {
                hub.list_sites(false).await?.iter().map(|s| s.id).collect()
            } else {
                sites
            };
            print(&hub.multi_site_search(&ids, &keyword, page).await)
        }
        Commands::Check { site: Some(id), .. } => print(&hub.check_site(id).await?),
        Commands::Check { site: None, include_disabled } => print(&hub.check_sites_now(include_disabled).await?),
        Commands::Watch => {
            let (tx, rx) = watch::channel(false);
            let handle = hub.spawn_health_loop(rx);
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("shutting down");
            let _ = tx.send(true);
            handle.await.context("health loop panicked")?;
            Ok(())
        }
        Commands::History { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let items: Vec<HistoryItem> = serde_json::from_str(&raw).context("parsing history items")?;
            print(&hub.check_history_updates(&items).await)
        }
        Commands::Status => print(&hub.service_health().await),
        Commands::Config { action: ConfigAction::Get { key } } => print(&hub.config_value(&key).await?),
        Commands::Config { action: ConfigAction::Set { key, value } } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            hub.set_config_value(&key, value).await
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
