//! blocker - merge queue daemon

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pr_blocker::Blocker;
use pr_blocker::blocker::{Scheduler, serve_status, status_router};
use pr_blocker::config::{FileConfigStore, load_config_file};
use pr_blocker::platform::DefaultProviderFactory;
use pr_blocker::store::HttpJobStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "blocker")]
#[command(about = "Merge queue for GitHub/GitLab pull requests")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "blocker.toml")]
    config: PathBuf,

    /// Status server bind address (overrides the config file)
    #[arg(long)]
    status_addr: Option<String>,

    /// Pipeline period in seconds (overrides the config file)
    #[arg(long)]
    sync_period: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run a single pipeline cycle and exit
    #[arg(long)]
    once: bool,
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let file = load_config_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let mut settings = file.blocker;
    if let Some(addr) = cli.status_addr {
        settings.status_addr = addr;
    }
    if let Some(period) = cli.sync_period {
        settings.sync_period_secs = period;
    }

    let job_store_url = file
        .job_store
        .map(|j| j.url)
        .filter(|url| !url.is_empty())
        .context("[job_store] url is required")?;
    let jobs = HttpJobStore::new(&job_store_url).context("failed to create job store client")?;

    let blocker = Arc::new(Blocker::new(
        settings.clone(),
        Arc::new(FileConfigStore::new(&cli.config)),
        Arc::new(jobs),
        Arc::new(DefaultProviderFactory),
    ));
    let mut scheduler = Scheduler::new(Arc::clone(&blocker));

    if cli.once {
        scheduler.run_cycle().await;
        return Ok(());
    }

    let listener = TcpListener::bind(&settings.status_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.status_addr))?;
    let router = status_router(blocker, scheduler.subscribe());

    info!(period_secs = settings.sync_period_secs, "starting blocker");
    tokio::select! {
        result = serve_status(listener, router) => result.context("status server failed")?,
        () = scheduler.run() => {}
    }
    Ok(())
}
