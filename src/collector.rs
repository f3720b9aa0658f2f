/// Per-tick balance collection
///
/// One tick walks the configured wallets in order; within a wallet every
/// token is queried in parallel and the successful observations are written
/// as one batch. Failures are per-token and per-wallet: they are logged and
/// the tick moves on.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::types::Address;
use ethers::utils::to_checksum;
use futures::future::join_all;
use std::sync::Arc;

use crate::config::{Config, TokenConfig};
use crate::database::{BalanceObservation, Store};
use crate::erc20::TokenClient;
use crate::errors::RpcError;
use crate::logger::{log, LogTag};
use crate::shutdown::{is_shutdown, wait_for_shutdown};

/// Where observations come from. The tick executor only needs the one
/// query call, so the seam sits here rather than on the full token client.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_balance(
        &self,
        wallet: Address,
        token: &TokenConfig,
    ) -> Result<BalanceObservation>;
}

#[async_trait]
impl BalanceSource for TokenClient {
    async fn fetch_balance(
        &self,
        wallet: Address,
        token: &TokenConfig,
    ) -> Result<BalanceObservation> {
        TokenClient::fetch_balance(self, wallet, token).await
    }
}

/// Where observations go.
#[async_trait]
pub trait ObservationSink: Send + Sync {
    async fn insert_batch(&self, observations: &[BalanceObservation]) -> Result<()>;
}

#[async_trait]
impl ObservationSink for Store {
    async fn insert_batch(&self, observations: &[BalanceObservation]) -> Result<()> {
        Store::insert_batch(self, observations).await
    }
}

pub struct Collector {
    client: Arc<dyn BalanceSource>,
    store: Arc<dyn ObservationSink>,
    wallets: Vec<Address>,
    tokens: Vec<TokenConfig>,
}

impl Collector {
    pub fn new(
        client: Arc<dyn BalanceSource>,
        store: Arc<dyn ObservationSink>,
        config: &Config,
    ) -> Result<Self> {
        let mut wallets = Vec::with_capacity(config.wallets.len());
        for raw in &config.wallets {
            let address: Address = raw
                .parse()
                .with_context(|| format!("invalid wallet address: {raw}"))?;
            wallets.push(address);
        }

        Ok(Self {
            client,
            store,
            wallets,
            tokens: config.tokens.clone(),
        })
    }

    /// Run one tick over all wallets. Returns Ok unless shutdown interrupts
    /// the tick; per-token and per-batch failures are logged and swallowed.
    pub async fn run_tick(&self) -> Result<()> {
        for wallet in &self.wallets {
            if is_shutdown() {
                log(LogTag::Collector, "INFO", "Shutdown requested, stopping tick");
                return Err(anyhow!(RpcError::Cancelled));
            }

            let wallet = *wallet;
            log(
                LogTag::Collector,
                "INFO",
                &format!("Processing wallet {}", to_checksum(&wallet, None)),
            );

            let observations = self.collect_wallet(wallet).await;

            if observations.is_empty() {
                continue;
            }

            let count = observations.len();
            let insert = self.store.insert_batch(&observations);
            tokio::select! {
                result = insert => {
                    match result {
                        Ok(()) => log(
                            LogTag::Collector,
                            "SUCCESS",
                            &format!(
                                "Inserted {} observations for {}",
                                count,
                                to_checksum(&wallet, None)
                            ),
                        ),
                        Err(e) => log(
                            LogTag::Collector,
                            "ERROR",
                            &format!(
                                "Batch insert failed for {}: {:#}",
                                to_checksum(&wallet, None),
                                e
                            ),
                        ),
                    }
                }
                _ = wait_for_shutdown() => {
                    log(LogTag::Collector, "INFO", "Shutdown requested during insert");
                    return Err(anyhow!(RpcError::Cancelled));
                }
            }
        }

        Ok(())
    }

    /// Query every configured token for one wallet in parallel and collect
    /// the successes. Per-wallet concurrency is naturally bounded by the
    /// token count.
    async fn collect_wallet(&self, wallet: Address) -> Vec<BalanceObservation> {
        let mut handles = Vec::with_capacity(self.tokens.len());

        for token in &self.tokens {
            if token.address.is_empty() {
                log(
                    LogTag::Collector,
                    "WARN",
                    &format!("Token {:?} has no address, skipping", token.label),
                );
                continue;
            }

            let client = self.client.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                let result = client.fetch_balance(wallet, &token).await;
                (token, result)
            }));
        }

        let mut observations = Vec::with_capacity(handles.len());
        for result in join_all(handles).await {
            match result {
                Ok((_, Ok(obs))) => {
                    log(
                        LogTag::Collector,
                        "BALANCE",
                        &format!(
                            "{} {} = {} (decimals {})",
                            obs.wallet, obs.symbol, obs.balance, obs.decimals
                        ),
                    );
                    observations.push(obs);
                }
                Ok((token, Err(e))) => {
                    log(
                        LogTag::Collector,
                        "ERROR",
                        &format!(
                            "Token query failed for {} ({}): {:#}",
                            token.label, token.address, e
                        ),
                    );
                }
                Err(join_error) => {
                    log(
                        LogTag::Collector,
                        "ERROR",
                        &format!("Token query task panicked: {}", join_error),
                    );
                }
            }
        }

        observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::trigger_shutdown;
    use chrono::Utc;
    use ethers::types::U256;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Balance source whose failures exhaust their retries, keyed by token
    /// label.
    struct FakeSource {
        failing: Vec<String>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                failing: failing.iter().map(|label| label.to_string()).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BalanceSource for FakeSource {
        async fn fetch_balance(
            &self,
            wallet: Address,
            token: &TokenConfig,
        ) -> Result<BalanceObservation> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.failing.contains(&token.label) {
                return Err(anyhow!(RpcError::RetriesExhausted {
                    attempts: 3,
                    last_error: "connection refused".to_string(),
                }));
            }

            Ok(BalanceObservation {
                queried_at: Utc::now(),
                wallet: to_checksum(&wallet, None),
                token_address: token.address.clone(),
                symbol: token.label.clone(),
                decimals: 6,
                raw_balance: U256::from(1_500_000u64),
                balance: "1.5".to_string(),
            })
        }
    }

    struct FakeSink {
        batches: Mutex<Vec<Vec<BalanceObservation>>>,
        fail: bool,
    }

    impl FakeSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl ObservationSink for FakeSink {
        async fn insert_batch(&self, observations: &[BalanceObservation]) -> Result<()> {
            if self.fail {
                return Err(anyhow!("insert failed"));
            }
            self.batches.lock().unwrap().push(observations.to_vec());
            Ok(())
        }
    }

    fn token(label: &str) -> TokenConfig {
        TokenConfig {
            label: label.to_string(),
            address: "0xDDAfbb505ad214D7b80b1f830fcCc89B60fb7A83".to_string(),
            fallback_decimals: 6,
        }
    }

    fn two_wallet_config(tokens: Vec<TokenConfig>) -> Config {
        Config {
            wallets: vec![
                "0x1111111111111111111111111111111111111111".to_string(),
                "0x2222222222222222222222222222222222222222".to_string(),
            ],
            tokens,
            ..Config::default()
        }
    }

    /// The shutdown flag is process-global and one-way, so all tick
    /// scenarios run in one body with cancellation last.
    #[tokio::test]
    async fn test_run_tick_scenarios() {
        // A token that keeps failing is dropped; the rest of the wallet's
        // batch still lands, one batch per wallet.
        let source = FakeSource::new(&["BROKEN"]);
        let sink = FakeSink::new(false);
        let tokens = vec![
            token("USDC"),
            token("BROKEN"),
            TokenConfig {
                label: "placeholder".to_string(),
                address: String::new(),
                fallback_decimals: 0,
            },
        ];
        let collector =
            Collector::new(source.clone(), sink.clone(), &two_wallet_config(tokens)).unwrap();
        assert!(collector.run_tick().await.is_ok());
        {
            let batches = sink.batches.lock().unwrap();
            assert_eq!(batches.len(), 2);
            assert!(batches.iter().all(|batch| batch.len() == 1));
            assert!(batches.iter().all(|batch| batch[0].symbol == "USDC"));
        }
        // Two wallets times two addressed tokens; the address-less token is
        // never queried.
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);

        // Every query exhausting its retries still counts as a completed
        // tick for liveness: nothing inserted, no error.
        let source = FakeSource::new(&["USDC", "GNO"]);
        let sink = FakeSink::new(false);
        let collector = Collector::new(
            source,
            sink.clone(),
            &two_wallet_config(vec![token("USDC"), token("GNO")]),
        )
        .unwrap();
        assert!(collector.run_tick().await.is_ok());
        assert!(sink.batches.lock().unwrap().is_empty());

        // A failing batch insert is logged and the tick moves on to the
        // next wallet, still reporting success.
        let source = FakeSource::new(&[]);
        let sink = FakeSink::new(true);
        let collector =
            Collector::new(source, sink, &two_wallet_config(vec![token("USDC")])).unwrap();
        assert!(collector.run_tick().await.is_ok());

        // After shutdown the tick stops at the wallet boundary with a
        // cancellation error.
        let source = FakeSource::new(&[]);
        let sink = FakeSink::new(false);
        let collector =
            Collector::new(source.clone(), sink, &two_wallet_config(vec![token("USDC")])).unwrap();
        trigger_shutdown();
        let err = collector.run_tick().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RpcError>(),
            Some(RpcError::Cancelled)
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
