//! Wallet Ledger
//!
//! The only code that writes a player's money balance. Every mutation is
//! a single guarded UPDATE so a concurrent writer can never drive a
//! balance below zero.

use sqlx::sqlite::SqlitePool;
use sqlx::SqliteConnection;

use crate::error::EconomyError;

#[derive(Clone)]
pub struct WalletLedger {
    pool: SqlitePool,
}

impl WalletLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Current balance for a player.
    pub async fn balance(&self, player_id: i64) -> Result<i64, EconomyError> {
        let mut conn = self.pool.acquire().await?;
        balance_tx(&mut *conn, player_id).await
    }

    /// Remove `amount` from the player's balance. Returns the new balance.
    pub async fn debit(&self, player_id: i64, amount: i64) -> Result<i64, EconomyError> {
        let mut tx = self.pool.begin().await?;
        let balance = debit_tx(&mut *tx, player_id, amount).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Add `amount` to the player's balance. Returns the new balance.
    /// A credit of 0 is a successful no-op.
    pub async fn credit(&self, player_id: i64, amount: i64) -> Result<i64, EconomyError> {
        let mut tx = self.pool.begin().await?;
        let balance = credit_tx(&mut *tx, player_id, amount).await?;
        tx.commit().await?;
        Ok(balance)
    }
}

pub(crate) async fn balance_tx(
    conn: &mut SqliteConnection,
    player_id: i64,
) -> Result<i64, EconomyError> {
    sqlx::query_scalar("SELECT balance FROM wallets WHERE player_id = ?")
        .bind(player_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(EconomyError::PlayerNotFound)
}

/// Debit inside a caller-owned transaction. The `balance >= ?` guard makes
/// the overdraft check part of the write itself, so the losing side of a
/// concurrent double-spend affects zero rows.
pub(crate) async fn debit_tx(
    conn: &mut SqliteConnection,
    player_id: i64,
    amount: i64,
) -> Result<i64, EconomyError> {
    if amount < 0 {
        return Err(EconomyError::InvalidAmount);
    }

    let result = sqlx::query(
        r#"UPDATE wallets
           SET balance = balance - ?, updated_at = CURRENT_TIMESTAMP
           WHERE player_id = ? AND balance >= ?"#,
    )
    .bind(amount)
    .bind(player_id)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        // Either no wallet, or not enough money; a read tells them apart
        balance_tx(conn, player_id).await?;
        return Err(EconomyError::InsufficientFunds);
    }

    balance_tx(conn, player_id).await
}

/// Credit inside a caller-owned transaction.
pub(crate) async fn credit_tx(
    conn: &mut SqliteConnection,
    player_id: i64,
    amount: i64,
) -> Result<i64, EconomyError> {
    if amount < 0 {
        return Err(EconomyError::InvalidAmount);
    }

    let result = sqlx::query(
        r#"UPDATE wallets
           SET balance = balance + ?, updated_at = CURRENT_TIMESTAMP
           WHERE player_id = ?"#,
    )
    .bind(amount)
    .bind(player_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EconomyError::PlayerNotFound);
    }

    balance_tx(conn, player_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_util::test_db;

    #[tokio::test]
    async fn test_balance_of_unknown_player() {
        let (_dir, db) = test_db().await;
        let wallet = WalletLedger::new(db.pool());

        assert!(matches!(
            wallet.balance(99).await,
            Err(EconomyError::PlayerNotFound)
        ));
    }

    #[tokio::test]
    async fn test_debit_and_credit() {
        let (_dir, db) = test_db().await;
        db.create_wallet(1, 100).await.unwrap();
        let wallet = WalletLedger::new(db.pool());

        assert_eq!(wallet.debit(1, 30).await.unwrap(), 70);
        assert_eq!(wallet.credit(1, 5).await.unwrap(), 75);
        assert_eq!(wallet.balance(1).await.unwrap(), 75);
    }

    #[tokio::test]
    async fn test_debit_more_than_balance_fails() {
        let (_dir, db) = test_db().await;
        db.create_wallet(1, 100).await.unwrap();
        let wallet = WalletLedger::new(db.pool());

        assert!(matches!(
            wallet.debit(1, 101).await,
            Err(EconomyError::InsufficientFunds)
        ));
        // balance untouched by the failed debit
        assert_eq!(wallet.balance(1).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_debit_entire_balance_is_allowed() {
        let (_dir, db) = test_db().await;
        db.create_wallet(1, 100).await.unwrap();
        let wallet = WalletLedger::new(db.pool());

        assert_eq!(wallet.debit(1, 100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_credit_is_a_noop_success() {
        let (_dir, db) = test_db().await;
        db.create_wallet(1, 42).await.unwrap();
        let wallet = WalletLedger::new(db.pool());

        assert_eq!(wallet.credit(1, 0).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_negative_amounts_rejected() {
        let (_dir, db) = test_db().await;
        db.create_wallet(1, 42).await.unwrap();
        let wallet = WalletLedger::new(db.pool());

        assert!(matches!(
            wallet.debit(1, -1).await,
            Err(EconomyError::InvalidAmount)
        ));
        assert!(matches!(
            wallet.credit(1, -1).await,
            Err(EconomyError::InvalidAmount)
        ));
    }

    #[tokio::test]
    async fn test_debit_unknown_player_is_not_found() {
        let (_dir, db) = test_db().await;
        let wallet = WalletLedger::new(db.pool());

        assert!(matches!(
            wallet.debit(5, 10).await,
            Err(EconomyError::PlayerNotFound)
        ));
    }
}
