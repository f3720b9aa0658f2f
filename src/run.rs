/// Full collector lifecycle: configuration, connections, run mode
/// selection, graceful shutdown.
use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::arguments;
use crate::collector::Collector;
use crate::config::Config;
use crate::database::Store;
use crate::erc20::TokenClient;
use crate::health::HealthChecker;
use crate::logger::{self, log, LogTag};
use crate::rpc::FailoverClient;
use crate::scheduler::{self, JobFn, Scheduler};
use crate::shutdown::{trigger_shutdown, wait_for_shutdown};
use crate::webserver;

/// How long the health server gets to drain after the scheduler stopped
const SERVER_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Load the config file, apply the command-line interval override, validate.
pub fn load_config() -> Result<Config> {
    let args = arguments::get();
    let config_path = args.config_path().to_string();
    let mut config = Config::load(&config_path)?;

    if let Some(interval) = &args.interval {
        config.interval = interval.clone();
    }

    config
        .validate()
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Configuration error in {config_path}"))?;

    log(
        LogTag::Config,
        "INFO",
        &format!(
            "Configuration loaded from {} ({} wallets, {} tokens, interval {:?})",
            config_path,
            config.wallets.len(),
            config.tokens.len(),
            config.interval
        ),
    );

    Ok(config)
}

/// Main collector entrypoint, one-shot or daemon depending on the interval.
pub async fn run_tracker() -> Result<()> {
    let config = load_config()?;
    logger::init(&config.log_level);
    let timezone = config.parsed_timezone().map_err(anyhow::Error::from)?;

    spawn_signal_listener();

    // PostgreSQL
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let store = Arc::new(Store::open(&database_url).await?);
    store.ensure_schema().await?;
    log(LogTag::Database, "INFO", "PostgreSQL connection established");

    // RPC failover pool
    let failover = Arc::new(FailoverClient::connect(&config.rpc_urls).await?);
    if config.rpc_urls.len() == 1 {
        log(
            LogTag::Rpc,
            "INFO",
            &format!("RPC connection established ({})", config.rpc_urls[0]),
        );
    } else {
        log(
            LogTag::Rpc,
            "INFO",
            &format!(
                "RPC connection established with failover ({} endpoints, primary {})",
                config.rpc_urls.len(),
                config.rpc_urls[0]
            ),
        );
    }

    let client = Arc::new(TokenClient::new(failover.clone()));
    let collector = Arc::new(Collector::new(client, store.clone(), &config)?);

    // One-shot mode: a single tick, no scheduler, no health server
    if config.interval.is_empty() || arguments::get().once {
        log(LogTag::System, "INFO", "Running a single collection tick");
        let result = collector.run_tick().await;
        store.close().await;
        return result;
    }

    // Daemon mode
    let expected_interval = scheduler::expected_interval_of(&config.interval);
    let checker = Arc::new(HealthChecker::new(
        store.clone(),
        failover.clone(),
        Some(expected_interval),
    ));

    let job: JobFn = {
        let collector = collector.clone();
        let checker = checker.clone();
        Arc::new(move || {
            let collector = collector.clone();
            let checker = checker.clone();
            Box::pin(async move {
                let result = collector.run_tick().await;
                checker.update_last_run(result.is_ok());
                result
            })
        })
    };

    let sched = Arc::new(
        Scheduler::new(&config.interval, timezone, config.run_immediately, job)
            .map_err(anyhow::Error::from)?,
    );

    let server = {
        let checker = checker.clone();
        let port = config.http_port;
        tokio::spawn(async move {
            if let Err(e) = webserver::start_server(port, checker).await {
                log(
                    LogTag::Webserver,
                    "ERROR",
                    &format!("Health server failed: {:#}", e),
                );
            }
        })
    };

    sched.clone().start();
    log(
        LogTag::System,
        "SUCCESS",
        "Daemon started with clock-aligned scheduling",
    );

    wait_for_shutdown().await;
    log(LogTag::System, "INFO", "Shutdown requested, stopping daemon");

    sched.stop().await;
    if timeout(SERVER_SHUTDOWN_DEADLINE, server).await.is_err() {
        log(
            LogTag::Webserver,
            "WARN",
            "Health server did not stop within deadline",
        );
    }
    store.close().await;

    Ok(())
}

/// Bind interrupt/terminate to the global shutdown.
fn spawn_signal_listener() {
    tokio::spawn(async {
        shutdown_signal().await;
        log(LogTag::System, "INFO", "Signal received, graceful shutdown");
        trigger_shutdown();
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
