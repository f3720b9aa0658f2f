/// Bounded-attempt retry with exponential backoff and endpoint failover
///
/// The pool answers "who can I talk to now", this module answers "should I
/// try again". Every attempt is preceded by a fresh endpoint selection, so a
/// single invocation may touch multiple endpoints; attempts are strictly
/// sequential and capped.
use ethers::providers::{Http, Provider};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::RpcError;
use crate::logger::{log, LogTag};
use crate::rpc::FailoverClient;
use crate::shutdown::check_shutdown_or_delay;
use crate::utils::truncate_error;

/// Maximum attempts per invocation
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles each attempt after that
pub const BASE_DELAY: Duration = Duration::from_millis(500);

/// Sleep before attempt `attempt` (1-based). The first attempt never waits.
pub fn backoff_delay(attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    BASE_DELAY * 2u32.pow(attempt - 2)
}

/// Run an idempotent RPC operation against whatever endpoint the pool hands
/// out, retrying transient failures with exponential backoff. A failed
/// attempt marks its endpoint unhealthy, so the next attempt naturally lands
/// on a different endpoint when one is available.
pub async fn with_failover<T, E, F, Fut>(
    failover: &FailoverClient,
    op: F,
) -> Result<T, RpcError>
where
    F: Fn(Arc<Provider<Http>>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error = String::new();

    for attempt in 1..=MAX_ATTEMPTS {
        let delay = backoff_delay(attempt);
        if !delay.is_zero() {
            log(
                LogTag::Rpc,
                "DEBUG",
                &format!(
                    "Attempt {}/{} in {}ms",
                    attempt,
                    MAX_ATTEMPTS,
                    delay.as_millis()
                ),
            );
            if check_shutdown_or_delay(delay).await {
                return Err(RpcError::Cancelled);
            }
        }

        let (provider, url) = match failover.select().await {
            Ok(selected) => selected,
            Err(e) => {
                last_error = e.to_string();
                continue;
            }
        };

        match op(provider).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_error = e.to_string();
                failover.mark_unhealthy(&url, &last_error).await;
                log(
                    LogTag::Rpc,
                    "DEBUG",
                    &format!(
                        "Attempt {}/{} failed on {}: {}",
                        attempt,
                        MAX_ATTEMPTS,
                        url,
                        truncate_error(&last_error, 200)
                    ),
                );
            }
        }
    }

    Err(RpcError::RetriesExhausted {
        attempts: MAX_ATTEMPTS,
        last_error,
    })
}
