/// Failover pool of upstream JSON-RPC endpoints
///
/// Hands out one healthy provider per call, marks endpoints unhealthy on
/// failure, and re-probes them after a cooldown. Selection is biased toward
/// the last endpoint that worked.
use anyhow::{anyhow, Result};
use ethers::providers::{Http, Middleware, Provider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::errors::RpcError;
use crate::logger::{log, LogTag};
use crate::utils::truncate_error;

/// Cooldown before an unhealthy endpoint is probed again
pub const UNHEALTHY_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Deadline for the chain-id liveness probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// An endpoint either has a live provider or a recorded failure. The handle
/// existing iff the endpoint is healthy is encoded in the variant itself.
enum EndpointState {
    Healthy(Arc<Provider<Http>>),
    Unhealthy { since: Instant, cause: String },
}

struct Endpoint {
    url: String,
    state: Mutex<EndpointState>,
}

pub struct FailoverClient {
    endpoints: Vec<Endpoint>,
    /// Sweep start position; points at the last endpoint that answered
    current_index: Mutex<usize>,
}

impl FailoverClient {
    /// Probe every URL and build the pool. Endpoints that fail the probe are
    /// kept (they get retried after the cooldown), but at least one must be
    /// healthy or construction fails.
    pub async fn connect(urls: &[String]) -> Result<Self> {
        if urls.is_empty() {
            return Err(anyhow!("at least one RPC URL is required"));
        }

        let mut endpoints = Vec::with_capacity(urls.len());
        let mut healthy_count = 0usize;

        for url in urls {
            let state = match Self::probe(url).await {
                Ok(provider) => {
                    healthy_count += 1;
                    log(
                        LogTag::Rpc,
                        "INFO",
                        &format!("Connected to RPC endpoint {}", url),
                    );
                    EndpointState::Healthy(provider)
                }
                Err(cause) => {
                    log(
                        LogTag::Rpc,
                        "WARN",
                        &format!(
                            "RPC endpoint {} unavailable, will retry after cooldown: {}",
                            url,
                            truncate_error(&cause, 200)
                        ),
                    );
                    EndpointState::Unhealthy {
                        since: Instant::now(),
                        cause,
                    }
                }
            };

            endpoints.push(Endpoint {
                url: url.clone(),
                state: Mutex::new(state),
            });
        }

        if healthy_count == 0 {
            return Err(anyhow!(RpcError::NoHealthyEndpoints)
                .context("all configured RPC endpoints failed the startup probe"));
        }

        Ok(Self {
            endpoints,
            current_index: Mutex::new(0),
        })
    }

    /// Dial a URL and verify it answers a chain-id query within the probe
    /// deadline.
    async fn probe(url: &str) -> std::result::Result<Arc<Provider<Http>>, String> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| format!("invalid endpoint URL: {e}"))?;

        match timeout(PROBE_TIMEOUT, provider.get_chainid()).await {
            Ok(Ok(_)) => Ok(Arc::new(provider)),
            Ok(Err(e)) => Err(format!("chain id query failed: {e}")),
            Err(_) => Err(format!(
                "chain id query timed out after {}s",
                PROBE_TIMEOUT.as_secs()
            )),
        }
    }

    /// Return a healthy provider and its URL, sweeping the pool once from
    /// the last-successful position. Unhealthy endpoints past their cooldown
    /// are re-probed in place. Exactly one sweep; retrying is the retry
    /// engine's job.
    pub async fn select(&self) -> std::result::Result<(Arc<Provider<Http>>, String), RpcError> {
        // The pool lock is held for the whole sweep so concurrent callers
        // cannot interleave reconnect attempts against the same endpoint.
        let mut current = self.current_index.lock().await;
        let start = *current;

        for offset in 0..self.endpoints.len() {
            let idx = (start + offset) % self.endpoints.len();
            let endpoint = &self.endpoints[idx];
            let mut state = endpoint.state.lock().await;

            match &*state {
                EndpointState::Healthy(provider) => {
                    *current = idx;
                    return Ok((provider.clone(), endpoint.url.clone()));
                }
                EndpointState::Unhealthy { since, .. } => {
                    if since.elapsed() <= UNHEALTHY_COOLDOWN {
                        continue;
                    }
                    match Self::probe(&endpoint.url).await {
                        Ok(provider) => {
                            log(
                                LogTag::Rpc,
                                "INFO",
                                &format!("Reconnected to RPC endpoint {}", endpoint.url),
                            );
                            *state = EndpointState::Healthy(provider.clone());
                            *current = idx;
                            return Ok((provider, endpoint.url.clone()));
                        }
                        Err(cause) => {
                            log(
                                LogTag::Rpc,
                                "DEBUG",
                                &format!(
                                    "Reconnect to {} failed: {}",
                                    endpoint.url,
                                    truncate_error(&cause, 200)
                                ),
                            );
                        }
                    }
                }
            }
        }

        Err(RpcError::NoHealthyEndpoints)
    }

    /// Record a failure against an endpoint: drop its handle and start the
    /// cooldown clock.
    pub async fn mark_unhealthy(&self, url: &str, cause: &str) {
        for endpoint in &self.endpoints {
            if endpoint.url != url {
                continue;
            }
            let mut state = endpoint.state.lock().await;
            *state = EndpointState::Unhealthy {
                since: Instant::now(),
                cause: cause.to_string(),
            };
            log(
                LogTag::Rpc,
                "WARN",
                &format!(
                    "Marked RPC endpoint {} unhealthy (retry in {}m): {}",
                    url,
                    UNHEALTHY_COOLDOWN.as_secs() / 60,
                    truncate_error(cause, 200)
                ),
            );
            return;
        }
    }

    /// Per-endpoint health snapshot for the health reporter.
    pub async fn endpoints_health(&self) -> Vec<(String, bool)> {
        let mut snapshot = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let state = endpoint.state.lock().await;
            let healthy = matches!(&*state, EndpointState::Healthy(_));
            snapshot.push((endpoint.url.clone(), healthy));
        }
        snapshot
    }

    /// Number of configured endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Pool with hand-built endpoint states, bypassing the startup probe.
    #[cfg(test)]
    fn for_tests(states: Vec<(String, EndpointState)>) -> Self {
        Self {
            endpoints: states
                .into_iter()
                .map(|(url, state)| Endpoint {
                    url,
                    state: Mutex::new(state),
                })
                .collect(),
            current_index: Mutex::new(0),
        }
    }
}
