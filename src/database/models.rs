use chrono::{DateTime, Utc};
use ethers::types::U256;

/// One immutable balance observation, produced by the token query client
/// and appended to the `token_balances` table.
#[derive(Debug, Clone)]
pub struct BalanceObservation {
    /// Wall clock at query entry (UTC), not at RPC return
    pub queried_at: DateTime<Utc>,
    /// EIP-55 checksummed wallet address
    pub wallet: String,
    /// EIP-55 checksummed token contract address
    pub token_address: String,
    pub symbol: String,
    pub decimals: u8,
    /// Raw on-chain amount, before decimal scaling
    pub raw_balance: U256,
    /// `raw_balance / 10^decimals` as a trimmed decimal string
    pub balance: String,
}
