use anyhow::Context;
use clap::Parser;
use fingerprint_harvester::{
    shutdown, AgentSource, FileAddressSource, FileAgentSource, Harvester, HarvesterConfig,
    JsonLinesSink, ProxyPool, ResultSink,
};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(version, about = "Harvest fingerprints through a pool of http proxies")]
struct Cli {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    /// File of proxy ip:port values, one per line
    #[arg(long, default_value = "proxies.txt")]
    proxies: PathBuf,

    /// File of user agents, one per line
    #[arg(long, default_value = "ua.txt")]
    agents: PathBuf,

    /// Endpoint to probe for fingerprints
    #[arg(long)]
    probe_url: Option<String>,

    /// Seconds before a probe request is abandoned
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Append results to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    if cli.debug {
        warn!("debug mode: do not use this in production.");
    }

    let mut builder = HarvesterConfig::builder()
        .workers(cli.workers as usize)
        .request_timeout(Duration::from_secs(cli.timeout));
    if let Some(url) = cli.probe_url {
        builder = builder.probe_url(url);
    }
    let config = builder.build();

    let agents = Arc::new(FileAgentSource::new(&cli.agents));
    let loaded = agents
        .list()
        .with_context(|| format!("cannot load user agents from {}", cli.agents.display()))?;
    info!("loaded {} user agents", loaded.len());

    let (trigger, shutdown) = shutdown::channel();
    let pool = ProxyPool::from_sources(
        &config,
        &FileAddressSource::new(&cli.proxies),
        agents,
        shutdown.clone(),
    )
    .with_context(|| format!("cannot load proxies from {}", cli.proxies.display()))?;
    info!("loaded {} proxies", pool.len());

    let sink: Arc<dyn ResultSink> = match &cli.output {
        Some(path) => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            Arc::new(JsonLinesSink::new(file))
        }
        None => Arc::new(JsonLinesSink::new(tokio::io::stdout())),
    };

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("exiting");
        trigger.trigger();
    });

    let harvester = Harvester::new(Arc::new(pool), config);
    let delivered = harvester.run(sink, shutdown).await?;
    info!("delivered {} fingerprints", delivered);

    Ok(())
}

/// Wait for Ctrl+C, SIGTERM or SIGHUP.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let hangup = async {
        match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(mut hup) => {
                hup.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGHUP: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = hangup => {},
        _ = terminate => {},
    }
}
