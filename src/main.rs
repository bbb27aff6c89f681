use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawl_scheduler::config::{EngineSettings, UsersFile};
use crawl_scheduler::scheduler::{spawn_discovery, spawn_summary, Engine};
use crawl_scheduler::server;

#[derive(Parser)]
#[command(
    name = "crawl-scheduler",
    version,
    about = "Multi-user crawl scheduler for remote knowledge-base indexing",
    long_about = None
)]
struct Cli {
    /// Users file with credentials and space schedules, loaded at startup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address the control surface listens on
    #[arg(short, long, default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    tracing::info!("Crawl scheduler starting");

    let settings = EngineSettings::from_env();
    let engine = Arc::new(Engine::new(settings));

    if let Some(path) = &cli.config {
        load_users(&engine, path).await?;
    } else {
        tracing::info!("No users file given; waiting for runtime configuration");
    }

    // background loops; each is disabled when its interval is zero
    let _discovery = spawn_discovery(Arc::clone(&engine));
    let _summary = spawn_summary(Arc::clone(&engine));

    server::serve(cli.listen, engine, shutdown_signal()).await?;

    tracing::info!("Crawl scheduler stopped");
    Ok(())
}

/// Configure and start every user from the users file. A failing user is
/// logged and skipped so one bad credential does not take the others down.
async fn load_users(engine: &Arc<Engine>, path: &PathBuf) -> Result<()> {
    let file = UsersFile::load(path)?;
    tracing::info!(path = %path.display(), users = file.users.len(), "Loaded users file");

    for user in file.users {
        let user_id = user.user_id.clone();
        if let Err(e) = engine.set_config(&user_id, user.config).await {
            tracing::error!(user = %user_id, error = %e, "Skipping user: bad configuration");
            continue;
        }
        match engine.start(&user_id).await {
            Ok(report) => {
                for warning in &report.warnings {
                    tracing::warn!(user = %user_id, "Start warning: {warning}");
                }
            }
            Err(e) => {
                tracing::error!(user = %user_id, error = %e, "Failed to start user");
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("crawl_scheduler=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crawl_scheduler=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
