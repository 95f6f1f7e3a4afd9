//! Shared Stock Catalog
//!
//! The NPC-operated regular shop: global listings with a per-player
//! remaining-stock counter. Stock rows are created lazily with full stock
//! the first time a player looks at the catalog, and only ever shrink
//! through a guarded decrement inside the purchase transaction.

use sqlx::sqlite::SqlitePool;
use sqlx::{Row, SqliteConnection};
use tracing::info;

use crate::error::EconomyError;
use crate::{inventory, wallet};

/// One regular-shop listing joined with the requesting player's stock.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub listing_id: i64,
    pub collectable_type: String,
    pub item_name: String,
    pub buy_price: i64,
    pub can_buy: bool,
    pub stock_limit: Option<i64>,
    /// Remaining purchases for this player; None when unlimited.
    pub current_stock: Option<i64>,
}

/// One item of a shared-shop buy request.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub listing_id: i64,
    pub quantity: i64,
}

/// Confirmation of one successful purchase, with the server-side price.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub listing_id: i64,
    pub collectable_type: String,
    pub quantity: i64,
    pub total_price: i64,
    pub remaining_stock: Option<i64>,
}

#[derive(Clone)]
pub struct SharedStockCatalog {
    pool: SqlitePool,
}

impl SharedStockCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every regular listing joined with this player's remaining stock,
    /// creating full-stock rows for listings the player has never seen.
    /// The reported stock never exceeds the listing's limit.
    pub async fn list_for_player(&self, player_id: i64) -> Result<Vec<CatalogEntry>, EconomyError> {
        let mut tx = self.pool.begin().await?;
        ensure_stock_rows(&mut *tx, player_id).await?;

        let rows = sqlx::query(
            r#"SELECT rl.id AS listing_id, rl.buy_price, rl.can_buy, rl.stock_limit,
                      i.collectable_type, i.display_name,
                      CASE WHEN rl.stock_limit IS NULL THEN NULL
                           ELSE MIN(ps.current_stock, rl.stock_limit)
                      END AS current_stock
               FROM regular_listings rl
               JOIN items i ON i.id = rl.item_id
               JOIN player_stock ps
                 ON ps.regular_listing_id = rl.id AND ps.player_id = ?
               ORDER BY rl.id"#,
        )
        .bind(player_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(rows
            .iter()
            .map(|r| CatalogEntry {
                listing_id: r.get("listing_id"),
                collectable_type: r.get("collectable_type"),
                item_name: r.get("display_name"),
                buy_price: r.get("buy_price"),
                can_buy: r.get("can_buy"),
                stock_limit: r.get("stock_limit"),
                current_stock: r.get("current_stock"),
            })
            .collect())
    }

    /// Buy one listing. Debit, stock decrement and inventory credit commit
    /// together or not at all. The HTTP surface only exposes the batch
    /// form, which wraps the same per-listing step.
    #[cfg(test)]
    pub async fn purchase(
        &self,
        player_id: i64,
        listing_id: i64,
        quantity: i64,
    ) -> Result<PurchaseReceipt, EconomyError> {
        let mut tx = self.pool.begin().await?;
        let receipt = purchase_tx(&mut *tx, player_id, listing_id, quantity).await?;
        tx.commit().await?;

        info!(
            "Player {} bought {} x{} from the shop for {}",
            player_id, receipt.collectable_type, receipt.quantity, receipt.total_price
        );
        Ok(receipt)
    }

    /// Buy a batch of listings as one transaction; the first failing item
    /// rolls back the whole batch.
    pub async fn purchase_many(
        &self,
        player_id: i64,
        requests: &[PurchaseRequest],
    ) -> Result<Vec<PurchaseReceipt>, EconomyError> {
        if requests.is_empty() {
            return Err(EconomyError::InvalidQuantity);
        }

        let mut tx = self.pool.begin().await?;
        let mut receipts = Vec::with_capacity(requests.len());
        for request in requests {
            receipts.push(purchase_tx(&mut *tx, player_id, request.listing_id, request.quantity).await?);
        }
        tx.commit().await?;

        info!(
            "Player {} bought {} catalog item(s) from the shop",
            player_id,
            receipts.len()
        );
        Ok(receipts)
    }
}

async fn ensure_stock_rows(
    conn: &mut SqliteConnection,
    player_id: i64,
) -> Result<(), EconomyError> {
    sqlx::query(
        r#"INSERT OR IGNORE INTO player_stock (player_id, regular_listing_id, current_stock)
           SELECT ?, id, stock_limit FROM regular_listings"#,
    )
    .bind(player_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn purchase_tx(
    conn: &mut SqliteConnection,
    player_id: i64,
    listing_id: i64,
    quantity: i64,
) -> Result<PurchaseReceipt, EconomyError> {
    if quantity <= 0 {
        return Err(EconomyError::InvalidQuantity);
    }

    let row = sqlx::query(
        r#"SELECT rl.item_id, rl.buy_price, rl.can_buy, rl.stock_limit, i.collectable_type
           FROM regular_listings rl
           JOIN items i ON i.id = rl.item_id
           WHERE rl.id = ?"#,
    )
    .bind(listing_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(EconomyError::ListingNotFound(listing_id))?;

    let item_id: i64 = row.get("item_id");
    let buy_price: i64 = row.get("buy_price");
    let can_buy: bool = row.get("can_buy");
    let stock_limit: Option<i64> = row.get("stock_limit");
    let collectable_type: String = row.get("collectable_type");

    if !can_buy {
        return Err(EconomyError::NotPurchasable(listing_id));
    }

    sqlx::query(
        r#"INSERT OR IGNORE INTO player_stock (player_id, regular_listing_id, current_stock)
           VALUES (?, ?, ?)"#,
    )
    .bind(player_id)
    .bind(listing_id)
    .bind(stock_limit)
    .execute(&mut *conn)
    .await?;

    // Guarded decrement: losing a race for the last unit affects zero rows
    if stock_limit.is_some() {
        let result = sqlx::query(
            r#"UPDATE player_stock SET current_stock = current_stock - ?
               WHERE player_id = ? AND regular_listing_id = ? AND current_stock >= ?"#,
        )
        .bind(quantity)
        .bind(player_id)
        .bind(listing_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EconomyError::OutOfStock);
        }
    }

    let total_price = buy_price
        .checked_mul(quantity)
        .ok_or(EconomyError::InvalidQuantity)?;
    wallet::debit_tx(conn, player_id, total_price).await?;
    inventory::credit_item_tx(conn, player_id, item_id, quantity).await?;

    let remaining_stock = if stock_limit.is_some() {
        sqlx::query_scalar(
            "SELECT current_stock FROM player_stock WHERE player_id = ? AND regular_listing_id = ?",
        )
        .bind(player_id)
        .bind(listing_id)
        .fetch_optional(&mut *conn)
        .await?
    } else {
        None
    };

    Ok(PurchaseReceipt {
        listing_id,
        collectable_type,
        quantity,
        total_price,
        remaining_stock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ItemDefinition;
    use crate::db::test_util::test_db;
    use crate::db::Database;
    use crate::inventory::InventoryStore;
    use crate::shop::{ShopDefinition, ShopStockEntry};
    use crate::wallet::WalletLedger;

    async fn seed_shop(db: &Database) {
        db.seed_items(&[
            ItemDefinition {
                collectable_type: "WHEAT_SEED".to_string(),
                display_name: "Wheat Seed".to_string(),
                icon: "wheat_seed".to_string(),
            },
            ItemDefinition {
                collectable_type: "WATERING_CAN".to_string(),
                display_name: "Watering Can".to_string(),
                icon: "watering_can".to_string(),
            },
        ])
        .await
        .unwrap();

        db.seed_catalog(&[ShopDefinition {
            id: "general_store".to_string(),
            display_name: "General Store".to_string(),
            stock: vec![
                ShopStockEntry {
                    collectable_type: "WHEAT_SEED".to_string(),
                    buy_price: 5,
                    stock_limit: Some(10),
                    can_buy: true,
                },
                ShopStockEntry {
                    collectable_type: "WATERING_CAN".to_string(),
                    buy_price: 120,
                    stock_limit: None,
                    can_buy: false,
                },
            ],
        }])
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_list_creates_full_stock_rows_lazily() {
        let (_dir, db) = test_db().await;
        seed_shop(&db).await;
        let catalog = SharedStockCatalog::new(db.pool());

        let entries = catalog.list_for_player(1).await.unwrap();
        assert_eq!(entries.len(), 2);

        let seeds = &entries[0];
        assert_eq!(seeds.collectable_type, "WHEAT_SEED");
        assert_eq!(seeds.item_name, "Wheat Seed");
        assert_eq!(seeds.current_stock, Some(10));
        assert!(seeds.can_buy);

        let can = &entries[1];
        assert_eq!(can.stock_limit, None);
        assert_eq!(can.current_stock, None);
        assert!(!can.can_buy);
    }

    #[tokio::test]
    async fn test_purchase_moves_money_stock_and_items_together() {
        let (_dir, db) = test_db().await;
        seed_shop(&db).await;
        db.create_wallet(1, 100).await.unwrap();
        let catalog = SharedStockCatalog::new(db.pool());
        let wallet = WalletLedger::new(db.pool());
        let inv = InventoryStore::new(db.pool());

        let seeds_listing = catalog.list_for_player(1).await.unwrap()[0].listing_id;
        let receipt = catalog.purchase(1, seeds_listing, 3).await.unwrap();

        assert_eq!(receipt.total_price, 15);
        assert_eq!(receipt.remaining_stock, Some(7));
        assert_eq!(wallet.balance(1).await.unwrap(), 85);

        let slots = inv.list_slots(1).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].collectable_type, "WHEAT_SEED");
        assert_eq!(slots[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_purchase_with_insufficient_funds_rolls_back_stock() {
        let (_dir, db) = test_db().await;
        seed_shop(&db).await;
        db.create_wallet(1, 4).await.unwrap();
        let catalog = SharedStockCatalog::new(db.pool());
        let wallet = WalletLedger::new(db.pool());

        let seeds_listing = catalog.list_for_player(1).await.unwrap()[0].listing_id;
        assert!(matches!(
            catalog.purchase(1, seeds_listing, 1).await,
            Err(EconomyError::InsufficientFunds)
        ));

        // stock decrement was rolled back with the failed debit
        let entries = catalog.list_for_player(1).await.unwrap();
        assert_eq!(entries[0].current_stock, Some(10));
        assert_eq!(wallet.balance(1).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_purchase_beyond_stock_fails() {
        let (_dir, db) = test_db().await;
        seed_shop(&db).await;
        db.create_wallet(1, 10_000).await.unwrap();
        let catalog = SharedStockCatalog::new(db.pool());

        let seeds_listing = catalog.list_for_player(1).await.unwrap()[0].listing_id;
        assert!(matches!(
            catalog.purchase(1, seeds_listing, 11).await,
            Err(EconomyError::OutOfStock)
        ));

        // buying out the stock exactly works, one more does not
        catalog.purchase(1, seeds_listing, 10).await.unwrap();
        assert!(matches!(
            catalog.purchase(1, seeds_listing, 1).await,
            Err(EconomyError::OutOfStock)
        ));
    }

    #[tokio::test]
    async fn test_non_purchasable_listing_is_rejected() {
        let (_dir, db) = test_db().await;
        seed_shop(&db).await;
        db.create_wallet(1, 10_000).await.unwrap();
        let catalog = SharedStockCatalog::new(db.pool());

        let can_listing = catalog.list_for_player(1).await.unwrap()[1].listing_id;
        assert!(matches!(
            catalog.purchase(1, can_listing, 1).await,
            Err(EconomyError::NotPurchasable(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_listing_and_bad_quantity() {
        let (_dir, db) = test_db().await;
        seed_shop(&db).await;
        db.create_wallet(1, 100).await.unwrap();
        let catalog = SharedStockCatalog::new(db.pool());

        assert!(matches!(
            catalog.purchase(1, 999, 1).await,
            Err(EconomyError::ListingNotFound(999))
        ));
        let seeds_listing = catalog.list_for_player(1).await.unwrap()[0].listing_id;
        assert!(matches!(
            catalog.purchase(1, seeds_listing, 0).await,
            Err(EconomyError::InvalidQuantity)
        ));
    }

    #[tokio::test]
    async fn test_huge_quantity_on_unlimited_listing_is_rejected() {
        let (_dir, db) = test_db().await;
        db.seed_items(&[ItemDefinition {
            collectable_type: "FERTILIZER".to_string(),
            display_name: "Fertilizer".to_string(),
            icon: "fertilizer".to_string(),
        }])
        .await
        .unwrap();
        db.seed_catalog(&[ShopDefinition {
            id: "supply_depot".to_string(),
            display_name: "Supply Depot".to_string(),
            stock: vec![ShopStockEntry {
                collectable_type: "FERTILIZER".to_string(),
                buy_price: 3,
                stock_limit: None,
                can_buy: true,
            }],
        }])
        .await
        .unwrap();
        db.create_wallet(1, 100).await.unwrap();
        let catalog = SharedStockCatalog::new(db.pool());
        let wallet = WalletLedger::new(db.pool());

        // an unlimited listing has no stock guard, so the price total is
        // the only bound on the requested quantity
        let listing = catalog.list_for_player(1).await.unwrap()[0].listing_id;
        assert!(matches!(
            catalog.purchase(1, listing, i64::MAX / 2).await,
            Err(EconomyError::InvalidQuantity)
        ));
        assert_eq!(wallet.balance(1).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_batch_purchase_is_all_or_nothing() {
        let (_dir, db) = test_db().await;
        seed_shop(&db).await;
        db.create_wallet(1, 10_000).await.unwrap();
        let catalog = SharedStockCatalog::new(db.pool());
        let wallet = WalletLedger::new(db.pool());

        let seeds_listing = catalog.list_for_player(1).await.unwrap()[0].listing_id;
        let requests = vec![
            PurchaseRequest {
                listing_id: seeds_listing,
                quantity: 2,
            },
            PurchaseRequest {
                listing_id: 999,
                quantity: 1,
            },
        ];

        assert!(matches!(
            catalog.purchase_many(1, &requests).await,
            Err(EconomyError::ListingNotFound(999))
        ));
        assert_eq!(wallet.balance(1).await.unwrap(), 10_000);
        assert_eq!(
            catalog.list_for_player(1).await.unwrap()[0].current_stock,
            Some(10)
        );
    }
}
