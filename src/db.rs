use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::data::ItemDefinition;
use crate::shop::ShopDefinition;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    /// Clone of the underlying pool for the service layers.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        // Item catalog (immutable once created)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collectable_type TEXT UNIQUE NOT NULL,
                display_name TEXT NOT NULL,
                icon TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Player wallets; the CHECK backs up the guarded debit
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                player_id INTEGER PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0 CHECK(balance >= 0),
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory_slots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL,
                slot_index INTEGER NOT NULL,
                item_id INTEGER,
                quantity INTEGER NOT NULL DEFAULT 0 CHECK(quantity >= 0),
                UNIQUE(player_id, slot_index)
            )
            "#,
        )
        .execute(pool)
        .await?;

        // NPC shop catalog; stock_limit NULL means unlimited
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS regular_listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL UNIQUE REFERENCES items(id),
                buy_price INTEGER NOT NULL CHECK(buy_price >= 0),
                can_buy INTEGER NOT NULL DEFAULT 1,
                stock_limit INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Per-player remaining stock against a regular listing, created lazily
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_stock (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL,
                regular_listing_id INTEGER NOT NULL REFERENCES regular_listings(id),
                current_stock INTEGER,
                UNIQUE(player_id, regular_listing_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Consignment listings; claimed rows are deleted outright
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL REFERENCES items(id),
                seller_id INTEGER NOT NULL,
                buyer_id INTEGER,
                price INTEGER NOT NULL CHECK(price >= 0),
                quantity INTEGER NOT NULL CHECK(quantity > 0),
                can_buy INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    /// Create a wallet for a player if one doesn't exist yet. Wallets are
    /// provisioned by the account service in production; fixtures use this.
    #[cfg(test)]
    pub async fn create_wallet(&self, player_id: i64, opening_balance: i64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO wallets (player_id, balance) VALUES (?, ?)")
            .bind(player_id)
            .bind(opening_balance)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert item definitions loaded from the data directory.
    /// Existing rows are left untouched: items are immutable once created.
    pub async fn seed_items(&self, items: &[ItemDefinition]) -> Result<(), sqlx::Error> {
        for item in items {
            sqlx::query(
                "INSERT OR IGNORE INTO items (collectable_type, display_name, icon) VALUES (?, ?, ?)",
            )
            .bind(&item.collectable_type)
            .bind(&item.display_name)
            .bind(&item.icon)
            .execute(&self.pool)
            .await?;
        }
        tracing::info!("Seeded {} item definitions", items.len());
        Ok(())
    }

    /// Upsert regular-shop listings loaded from the data directory.
    /// An item keeps its existing listing row (and id) across restarts.
    pub async fn seed_catalog(&self, shops: &[ShopDefinition]) -> Result<(), sqlx::Error> {
        let mut count = 0usize;
        for shop in shops {
            for entry in &shop.stock {
                let item_id: Option<i64> =
                    sqlx::query_scalar("SELECT id FROM items WHERE collectable_type = ?")
                        .bind(&entry.collectable_type)
                        .fetch_optional(&self.pool)
                        .await?;

                let Some(item_id) = item_id else {
                    tracing::warn!(
                        "Shop '{}' references unknown item '{}', skipping",
                        shop.id,
                        entry.collectable_type
                    );
                    continue;
                };

                sqlx::query(
                    r#"INSERT OR IGNORE INTO regular_listings (item_id, buy_price, can_buy, stock_limit)
                       VALUES (?, ?, ?, ?)"#,
                )
                .bind(item_id)
                .bind(entry.buy_price)
                .bind(entry.can_buy)
                .bind(entry.stock_limit)
                .execute(&self.pool)
                .await?;
                count += 1;
            }
        }
        tracing::info!("Seeded {} regular-shop listings", count);
        Ok(())
    }
}

#[cfg(test)]
pub mod test_util {
    use super::Database;
    use tempfile::TempDir;

    /// A migrated file-backed database that lives as long as the TempDir.
    pub async fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let db = Database::new(&url).await.unwrap();
        (dir, db)
    }
}
