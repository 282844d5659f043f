//! Futures Copy Trader - Main Entry Point
//!
//! Loads `config.*` / `COPY__*` settings, connects the master's user-data
//! stream and replicates every fill to the enabled followers until SIGINT or
//! SIGTERM.

use anyhow::{Context, Result};
use futures_copy_trader::config::Config;
use futures_copy_trader::exchange::{BinanceClient, BinanceUserStream, TradingClient};
use futures_copy_trader::replication::{FanOutDispatcher, ReplicationContext, SymbolRules};
use futures_copy_trader::risk::PositionRiskPoller;
use futures_copy_trader::stream::{ReconnectPolicy, StreamSessionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let loaded = Config::load().and_then(|config| config.validate().map(|()| config));
    let debug = loaded.as_ref().is_ok_and(|config| config.debug);

    let guard = match init_logging(debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    let outcome = match loaded {
        Ok(config) => run(config).await,
        Err(e) => Err(e.context("Invalid configuration")),
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        // Flush the file writer before exiting.
        drop(guard);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        testnet = config.binance.testnet,
        "Futures copy trader starting"
    );
    log_config(&config);

    let master = Arc::new(BinanceClient::new(&config.binance).context("Failed to create master client")?);

    let mut followers = Vec::new();
    for follower in config.enabled_followers() {
        let client = BinanceClient::for_account(&follower.api_key, &follower.secret_key, &config.binance)
            .with_context(|| format!("Failed to create client for follower {}", follower.id))?;
        followers.push((follower.clone(), Arc::new(client)));
    }

    // Signed requests are stamped with exchange time.
    master
        .set_server_time()
        .await
        .context("Failed to sync server time for master")?;
    for (follower, client) in &followers {
        client
            .set_server_time()
            .await
            .with_context(|| format!("Failed to sync server time for follower {}", follower.id))?;
    }

    // Proves the master credentials before anything else runs.
    master
        .start_user_stream()
        .await
        .context("Failed to start user data stream")?;

    let exchange_info = master
        .get_futures_exchange_info()
        .await
        .context("Failed to fetch exchange info")?;
    let rules = SymbolRules::from_exchange_info(&exchange_info, &config.replication.quote_asset);
    anyhow::ensure!(
        !rules.is_empty(),
        "No tradable {} perpetual symbols in exchange info",
        config.replication.quote_asset
    );
    info!(symbols = rules.len(), "Symbol rules loaded");

    let master_client: Arc<dyn TradingClient> = master.clone();
    let follower_clients = followers
        .into_iter()
        .map(|(follower, client)| (follower, client as Arc<dyn TradingClient>))
        .collect();
    let ctx = Arc::new(ReplicationContext::from_config(
        &config,
        master_client.clone(),
        follower_clients,
        rules,
    ));
    let dispatcher = Arc::new(FanOutDispatcher::new(ctx));

    let connector = Arc::new(
        BinanceUserStream::new(
            master,
            config.binance.testnet,
            Duration::from_secs(config.stream.keepalive_interval_secs),
        )
        .with_proxy(config.binance.proxy.clone()),
    );
    let manager = StreamSessionManager::new(
        connector,
        dispatcher,
        ReconnectPolicy::from_config(&config.stream),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stream_task = tokio::spawn(manager.run(shutdown_rx.clone()));
    let poll_task = config.risk.poll_enabled.then(|| {
        let poller = PositionRiskPoller::from_config(master_client, &config.risk);
        tokio::spawn(poller.run(shutdown_rx))
    });

    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received, stopping");
    let _ = shutdown_tx.send(true);

    let stats = stream_task.await.context("User stream task panicked")?;
    if let Some(task) = poll_task {
        task.await.context("Position poll task panicked")?;
    }

    info!(
        connects = stats.connects,
        stream_errors = stats.stream_errors,
        fills = stats.fills,
        "Futures copy trader stopped"
    );
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging(debug: bool) -> Result<WorkerGuard> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "copy-trader.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let crate_level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("futures_copy_trader={}", crate_level).parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .init();

    Ok(guard)
}

/// Log configuration on startup. Credentials are never printed.
fn log_config(config: &Config) {
    info!(
        trim_enabled = config.replication.trim_enabled,
        trim_ceiling = %config.replication.trim_ceiling,
        quote_asset = %config.replication.quote_asset,
        fanout = ?config.replication.fanout,
        request_timeout_secs = config.replication.request_timeout_secs,
        proxy = config.binance.proxy.is_some(),
        "Replication settings"
    );
    info!(
        connect_retry_secs = config.stream.connect_retry_secs,
        max_backoff_secs = config.stream.max_backoff_secs,
        keepalive_interval_secs = config.stream.keepalive_interval_secs,
        poll_enabled = config.risk.poll_enabled,
        poll_interval_secs = config.risk.poll_interval_secs,
        "Stream settings"
    );
    for follower in &config.followers {
        info!(
            follower = %follower.id,
            proportion = %follower.proportion,
            enabled = follower.enabled,
            "Follower"
        );
    }
}
