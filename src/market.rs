//! Marketplace
//!
//! Player-to-player consignment listings. A listing moves
//! Available -> Sold -> deleted, never backwards; the sale proceeds stay
//! escrowed in the listing's frozen price until the seller claims them,
//! at which point the row is deleted. Row absence is what makes a claimed
//! id observe NotFound.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::info;

use crate::error::EconomyError;
use crate::{inventory, wallet};

/// A consignment listing joined with its item's catalog entry.
#[derive(Debug, Clone)]
pub struct MarketListing {
    pub id: i64,
    pub item_id: i64,
    pub collectable_type: String,
    pub icon: String,
    pub seller_id: i64,
    pub buyer_id: Option<i64>,
    pub price: i64,
    pub quantity: i64,
    pub can_buy: bool,
}

#[derive(Clone)]
pub struct Marketplace {
    pool: SqlitePool,
}

impl Marketplace {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every available listing not owned by the caller. A seller never
    /// sees their own listings as purchasable.
    pub async fn list_available(
        &self,
        excluding_seller: i64,
    ) -> Result<Vec<MarketListing>, EconomyError> {
        let rows = sqlx::query(&format!(
            "{LISTING_SELECT} WHERE ml.can_buy = 1 AND ml.seller_id != ? ORDER BY ml.id"
        ))
        .bind(excluding_seller)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(listing_from_row).collect())
    }

    /// Every listing owned by the seller, sold or still available.
    pub async fn sold_by_player(&self, seller_id: i64) -> Result<Vec<MarketListing>, EconomyError> {
        let rows = sqlx::query(&format!(
            "{LISTING_SELECT} WHERE ml.seller_id = ? ORDER BY ml.id"
        ))
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(listing_from_row).collect())
    }

    /// Create an Available listing. The listed quantity is taken out of
    /// the seller's inventory in the same transaction, so an item cannot
    /// be listed and kept at once.
    pub async fn sell(
        &self,
        seller_id: i64,
        collectable_type: &str,
        price: i64,
        quantity: i64,
    ) -> Result<MarketListing, EconomyError> {
        if price < 0 {
            return Err(EconomyError::InvalidAmount);
        }
        if quantity <= 0 {
            return Err(EconomyError::InvalidQuantity);
        }

        let mut tx = self.pool.begin().await?;

        let item: Option<(i64, String)> =
            sqlx::query_as("SELECT id, icon FROM items WHERE collectable_type = ?")
                .bind(collectable_type)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((item_id, icon)) = item else {
            return Err(EconomyError::UnknownItemType(collectable_type.to_string()));
        };

        inventory::debit_item_tx(&mut *tx, seller_id, item_id, quantity).await?;

        let result = sqlx::query(
            r#"INSERT INTO market_listings (item_id, seller_id, price, quantity, can_buy)
               VALUES (?, ?, ?, ?, 1)"#,
        )
        .bind(item_id)
        .bind(seller_id)
        .bind(price)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
        let listing_id = result.last_insert_rowid();

        tx.commit().await?;

        info!(
            "Player {} listed {} x{} for {} (listing {})",
            seller_id, collectable_type, quantity, price, listing_id
        );

        Ok(MarketListing {
            id: listing_id,
            item_id,
            collectable_type: collectable_type.to_string(),
            icon,
            seller_id,
            buyer_id: None,
            price,
            quantity,
            can_buy: true,
        })
    }

    /// Buy a batch of listings. Either every id flips Available -> Sold,
    /// the buyer is debited for the exact price sum and receives the
    /// listed items, or nothing changes. The seller is not paid here; the
    /// money stays escrowed in the listings until claimed.
    pub async fn buy(&self, buyer_id: i64, listing_ids: &[i64]) -> Result<i64, EconomyError> {
        if listing_ids.is_empty() {
            return Err(EconomyError::InvalidQuantity);
        }

        let mut tx = self.pool.begin().await?;
        let mut total_cost: i64 = 0;

        for &listing_id in listing_ids {
            // Guarded flip: a listing already sold, owned by the buyer, or
            // flipped by a concurrent request affects zero rows
            let result = sqlx::query(
                r#"UPDATE market_listings SET can_buy = 0, buyer_id = ?
                   WHERE id = ? AND can_buy = 1 AND seller_id != ?"#,
            )
            .bind(buyer_id)
            .bind(listing_id)
            .bind(buyer_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT id FROM market_listings WHERE id = ?")
                        .bind(listing_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match exists {
                    Some(_) => EconomyError::NotPurchasable(listing_id),
                    None => EconomyError::ListingNotFound(listing_id),
                });
            }

            let (price, item_id, quantity): (i64, i64, i64) = sqlx::query_as(
                "SELECT price, item_id, quantity FROM market_listings WHERE id = ?",
            )
            .bind(listing_id)
            .fetch_one(&mut *tx)
            .await?;

            // Goods are handed over here; the money side settles below
            inventory::credit_item_tx(&mut *tx, buyer_id, item_id, quantity).await?;

            total_cost = total_cost
                .checked_add(price)
                .ok_or(EconomyError::InvalidAmount)?;
        }

        wallet::debit_tx(&mut *tx, buyer_id, total_cost).await?;
        tx.commit().await?;

        info!(
            "Player {} bought {} listing(s) for {}",
            buyer_id,
            listing_ids.len(),
            total_cost
        );
        Ok(total_cost)
    }

    /// Pay out sold listings to their seller and delete them. The credit
    /// lands before the delete inside one transaction; the delete is the
    /// commit step, so an interrupted claim never destroys unclaimed value.
    pub async fn claim(&self, seller_id: i64, listing_ids: &[i64]) -> Result<i64, EconomyError> {
        let mut tx = self.pool.begin().await?;
        let mut amount: i64 = 0;
        let mut claimed: Vec<i64> = Vec::with_capacity(listing_ids.len());

        for &listing_id in listing_ids {
            if claimed.contains(&listing_id) {
                continue;
            }

            let row = sqlx::query(
                "SELECT seller_id, can_buy, price FROM market_listings WHERE id = ?",
            )
            .bind(listing_id)
            .fetch_optional(&mut *tx)
            .await?;

            // Not-owned reads as not-found so sellers can't probe each
            // other's listings
            let Some(row) = row else {
                return Err(EconomyError::ListingNotFound(listing_id));
            };
            if row.get::<i64, _>("seller_id") != seller_id {
                return Err(EconomyError::ListingNotFound(listing_id));
            }
            if row.get::<bool, _>("can_buy") {
                return Err(EconomyError::NotYetSold(listing_id));
            }

            amount += row.get::<i64, _>("price");
            claimed.push(listing_id);
        }

        if amount == 0 {
            return Err(EconomyError::NothingToClaim);
        }

        wallet::credit_tx(&mut *tx, seller_id, amount).await?;

        for listing_id in &claimed {
            sqlx::query("DELETE FROM market_listings WHERE id = ?")
                .bind(listing_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            "Player {} claimed {} from {} sold listing(s)",
            seller_id,
            amount,
            claimed.len()
        );
        Ok(amount)
    }
}

const LISTING_SELECT: &str = r#"SELECT ml.id, ml.item_id, ml.seller_id, ml.buyer_id,
       ml.price, ml.quantity, ml.can_buy, i.collectable_type, i.icon
FROM market_listings ml
JOIN items i ON i.id = ml.item_id"#;

fn listing_from_row(row: &sqlx::sqlite::SqliteRow) -> MarketListing {
    MarketListing {
        id: row.get("id"),
        item_id: row.get("item_id"),
        collectable_type: row.get("collectable_type"),
        icon: row.get("icon"),
        seller_id: row.get("seller_id"),
        buyer_id: row.get("buyer_id"),
        price: row.get("price"),
        quantity: row.get("quantity"),
        can_buy: row.get("can_buy"),
    }
}
