/// Batched inserts of balance observations
use anyhow::{Context, Result};
use sqlx::{Postgres, QueryBuilder};

use crate::database::{BalanceObservation, Store};
use crate::logger::{log, LogTag};

const INSERT_PREFIX: &str = "INSERT INTO token_balances \
    (queried_at, wallet, token_address, symbol, decimals, raw_balance, balance) ";

/// Build the multi-row insert for a batch. All rows travel in one statement,
/// so the batch is atomic: either every observation lands or none does.
fn build_insert<'a>(
    observations: &'a [BalanceObservation],
) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(INSERT_PREFIX);
    builder.push_values(observations.iter(), |mut row, obs| {
        row.push_bind(obs.queried_at)
            .push_bind(&obs.wallet)
            .push_bind(&obs.token_address)
            .push_bind(&obs.symbol)
            .push_bind(obs.decimals as i16)
            .push_bind(obs.raw_balance.to_string())
            .push_unseparated("::numeric")
            .push_bind(&obs.balance)
            .push_unseparated("::numeric");
    });
    builder
}

impl Store {
    /// Append a batch of observations. Empty input is a no-op; any row
    /// failure fails the whole batch.
    pub async fn insert_batch(&self, observations: &[BalanceObservation]) -> Result<()> {
        if observations.is_empty() {
            return Ok(());
        }

        let mut builder = build_insert(observations);
        builder
            .build()
            .execute(self.pool())
            .await
            .with_context(|| format!("Batch insert of {} rows failed", observations.len()))?;

        log(
            LogTag::Database,
            "DEBUG",
            &format!("Inserted {} balance rows", observations.len()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ethers::types::U256;

    fn observation(symbol: &str) -> BalanceObservation {
        BalanceObservation {
            queried_at: Utc::now(),
            wallet: "0x1234567890AbcdEF1234567890aBcdef12345678".to_string(),
            token_address: "0xDDAfbb505ad214D7b80b1f830fcCc89B60fb7A83".to_string(),
            symbol: symbol.to_string(),
            decimals: 6,
            raw_balance: U256::from(1_500_000u64),
            balance: "1.5".to_string(),
        }
    }

    #[test]
    fn test_build_insert_one_row() {
        let rows = vec![observation("USDC")];
        let mut builder = build_insert(&rows);
        let sql = builder.sql().to_string();
        assert!(sql.starts_with(INSERT_PREFIX));
        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5, $6::numeric, $7::numeric)"));
    }

    #[test]
    fn test_build_insert_preserves_row_order() {
        let rows = vec![observation("USDC"), observation("WETH"), observation("GNO")];
        let mut builder = build_insert(&rows);
        let sql = builder.sql().to_string();
        // Three 7-column tuples, numbered in insertion order.
        assert!(sql.contains("($1, $2, $3, $4, $5, $6::numeric, $7::numeric)"));
        assert!(sql.contains("($8, $9, $10, $11, $12, $13::numeric, $14::numeric)"));
        assert!(sql.contains("($15, $16, $17, $18, $19, $20::numeric, $21::numeric)"));
    }
}
