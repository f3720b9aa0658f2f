/// ERC-20 read calls with retry and failover
///
/// For one (wallet, token) pair this issues balanceOf / decimals / symbol
/// against the token contract and assembles a `BalanceObservation`. Each
/// call runs through the retry engine under its own deadline; the contract
/// binding is rebuilt per attempt from whatever provider the failover pool
/// hands out.
use anyhow::{anyhow, Result};
use chrono::Utc;
use ethers::contract::abigen;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use ethers::utils::to_checksum;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::TokenConfig;
use crate::database::BalanceObservation;
use crate::errors::RpcError;
use crate::logger::{log, LogTag};
use crate::rpc::{retry, FailoverClient};
use crate::units::human_balance;

/// Deadline for one ERC-20 read, covering all of its retry attempts
pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

abigen!(
    Erc20Token,
    r#"[
        function balanceOf(address account) view returns (uint256)
        function decimals() view returns (uint8)
        function symbol() view returns (string)
    ]"#,
);

pub struct TokenClient {
    failover: Arc<FailoverClient>,
}

impl TokenClient {
    pub fn new(failover: Arc<FailoverClient>) -> Self {
        Self { failover }
    }

    pub fn failover(&self) -> &FailoverClient {
        &self.failover
    }

    /// Query the current balance of `wallet` for one configured token.
    ///
    /// A failing decimals() falls back to the configured value; balanceOf
    /// and symbol failures abort the observation.
    pub async fn fetch_balance(
        &self,
        wallet: Address,
        token: &TokenConfig,
    ) -> Result<BalanceObservation> {
        // Sampled at entry so all observations of one tick stay close in
        // time even when calls queue up under load.
        let queried_at = Utc::now();

        let token_address: Address = token
            .address
            .parse()
            .map_err(|e| anyhow!("token {} has invalid address: {e}", token.label))?;

        let raw_balance = self
            .call(|provider| {
                let contract = Erc20Token::new(token_address, provider);
                async move { contract.balance_of(wallet).call().await }
            })
            .await
            .map_err(|e| anyhow!(e).context(format!("balanceOf({})", token.label)))?;

        let decimals = match self
            .call(|provider| {
                let contract = Erc20Token::new(token_address, provider);
                async move { contract.decimals().call().await }
            })
            .await
        {
            Ok(value) => value,
            Err(e) => {
                log(
                    LogTag::Tokens,
                    "WARN",
                    &format!(
                        "decimals() failed for {}, using fallback {}: {}",
                        token.label, token.fallback_decimals, e
                    ),
                );
                token.fallback_decimals
            }
        };

        let symbol = self
            .call(|provider| {
                let contract = Erc20Token::new(token_address, provider);
                async move { contract.symbol().call().await }
            })
            .await
            .map_err(|e| anyhow!(e).context(format!("symbol({})", token.label)))?;

        Ok(BalanceObservation {
            queried_at,
            wallet: to_checksum(&wallet, None),
            token_address: to_checksum(&token_address, None),
            symbol,
            decimals,
            raw_balance,
            balance: human_balance(raw_balance, decimals),
        })
    }

    /// One retried contract read under the per-call deadline.
    async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, RpcError>
    where
        F: Fn(Arc<Provider<Http>>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match timeout(RPC_TIMEOUT, retry::with_failover(&self.failover, op)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::DeadlineExceeded {
                timeout_secs: RPC_TIMEOUT.as_secs(),
            }),
        }
    }
}
