/// Aggregated health checks for the /health endpoint
///
/// Three probes: database ping, RPC endpoint availability, and (in daemon
/// mode) tick-execution liveness. The overall status is the worst of the
/// three, with the daemon check capped at degraded.
use chrono::{DateTime, Utc};
use ethers::providers::Middleware;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::timeout;

use crate::database::Store;
use crate::logger::{log, LogTag};
use crate::rpc::FailoverClient;
use crate::utils::format_duration_compact;

/// Per-check deadlines
const DATABASE_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
const RPC_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Process start, for the uptime field
static STARTUP_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckDetail {
    pub status: CheckStatus,
    pub message: String,
}

impl CheckDetail {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Ok,
            message: message.into(),
        }
    }

    fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Degraded,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: CheckDetail,
    pub rpc_endpoints: CheckDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon: Option<CheckDetail>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: CheckStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy)]
struct LastRun {
    at: DateTime<Utc>,
    success: bool,
}

pub struct HealthChecker {
    store: Arc<Store>,
    failover: Arc<FailoverClient>,
    /// Present only in daemon mode; the liveness grace is twice this
    expected_interval: Option<Duration>,
    last_run: RwLock<Option<LastRun>>,
}

impl HealthChecker {
    pub fn new(
        store: Arc<Store>,
        failover: Arc<FailoverClient>,
        expected_interval: Option<Duration>,
    ) -> Self {
        Self {
            store,
            failover,
            expected_interval,
            last_run: RwLock::new(None),
        }
    }

    /// Called by the tick executor after every tick.
    pub fn update_last_run(&self, success: bool) {
        let mut last_run = self.last_run.write().unwrap();
        *last_run = Some(LastRun {
            at: Utc::now(),
            success,
        });
    }

    /// Run all checks and aggregate.
    pub async fn check(&self) -> HealthReport {
        let database = self.check_database().await;
        let rpc_endpoints = self.check_rpc().await;
        let daemon = self
            .expected_interval
            .map(|interval| self.check_daemon(interval, Utc::now()));

        let status = overall_status(&database, &rpc_endpoints, daemon.as_ref());

        HealthReport {
            status,
            timestamp: Utc::now(),
            uptime: format_duration_compact(*STARTUP_TIME, Utc::now()),
            checks: HealthChecks {
                database,
                rpc_endpoints,
                daemon,
            },
        }
    }

    async fn check_database(&self) -> CheckDetail {
        match timeout(DATABASE_CHECK_TIMEOUT, self.store.ping()).await {
            Ok(Ok(())) => CheckDetail::ok("database connection healthy"),
            Ok(Err(e)) => {
                log(
                    LogTag::Health,
                    "ERROR",
                    &format!("Database ping failed: {:#}", e),
                );
                CheckDetail::error(format!("database unreachable: {e}"))
            }
            Err(_) => {
                log(LogTag::Health, "ERROR", "Database ping timed out");
                CheckDetail::error("database ping timed out")
            }
        }
    }

    async fn check_rpc(&self) -> CheckDetail {
        let probe = async {
            let (provider, url) = self
                .failover
                .select()
                .await
                .map_err(|e| e.to_string())?;
            provider
                .get_chainid()
                .await
                .map_err(|e| format!("endpoint {url} not responding: {e}"))?;
            Ok::<(), String>(())
        };

        match timeout(RPC_CHECK_TIMEOUT, probe).await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                log(
                    LogTag::Health,
                    "ERROR",
                    &format!("RPC health probe failed: {}", reason),
                );
                return CheckDetail::error(reason);
            }
            Err(_) => {
                log(LogTag::Health, "ERROR", "RPC health probe timed out");
                return CheckDetail::error("RPC health probe timed out");
            }
        }

        let snapshot = self.failover.endpoints_health().await;
        let healthy = snapshot.iter().filter(|(_, ok)| *ok).count();
        let total = snapshot.len();

        if healthy == total {
            CheckDetail::ok("all RPC endpoints healthy")
        } else {
            CheckDetail::degraded(format!("{healthy}/{total} RPC endpoints healthy"))
        }
    }

    fn check_daemon(&self, expected_interval: Duration, now: DateTime<Utc>) -> CheckDetail {
        daemon_check(*self.last_run.read().unwrap(), expected_interval, now)
    }
}

/// Tick-execution liveness: never ran yet is fine (startup), a failed last
/// run or a silence longer than twice the expected interval is degraded.
fn daemon_check(
    last_run: Option<LastRun>,
    expected_interval: Duration,
    now: DateTime<Utc>,
) -> CheckDetail {
    let Some(last_run) = last_run else {
        return CheckDetail::ok("daemon not yet executed (startup)");
    };

    if !last_run.success {
        return CheckDetail::degraded("last execution failed");
    }

    let since = now.signed_duration_since(last_run.at);
    let grace = chrono::Duration::from_std(expected_interval * 2)
        .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1000));

    if since > grace {
        return CheckDetail::degraded(format!(
            "no execution in {} (expected every {}s)",
            format_duration_compact(last_run.at, now),
            expected_interval.as_secs()
        ));
    }

    CheckDetail::ok(format!(
        "last executed {} ago",
        format_duration_compact(last_run.at, now)
    ))
}

/// Worst-of aggregation: any error wins, then any degraded. The daemon
/// check never escalates past degraded.
fn overall_status(
    database: &CheckDetail,
    rpc: &CheckDetail,
    daemon: Option<&CheckDetail>,
) -> CheckStatus {
    if database.status == CheckStatus::Error || rpc.status == CheckStatus::Error {
        return CheckStatus::Error;
    }
    if database.status == CheckStatus::Degraded
        || rpc.status == CheckStatus::Degraded
        || daemon.map_or(false, |check| check.status != CheckStatus::Ok)
    {
        return CheckStatus::Degraded;
    }
    CheckStatus::Ok
}
