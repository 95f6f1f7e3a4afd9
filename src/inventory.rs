//! Inventory Store
//!
//! Per-player, per-slot item quantities. A slot either holds a quantity of
//! one item or is empty (item NULL, quantity 0); no other shape exists.
//! Slots belong to exactly one player, so no cross-player coordination is
//! needed here.

use sqlx::sqlite::SqlitePool;
use sqlx::{Row, SqliteConnection};

use crate::error::EconomyError;

/// Collectable type and icon reported for a slot whose item no longer
/// resolves against the catalog.
pub const NONE_ITEM: &str = "NONE";

/// One inventory slot, resolved against the item catalog.
#[derive(Debug, Clone)]
pub struct SlotView {
    pub id: i64,
    pub slot_index: i64,
    pub item_id: Option<i64>,
    pub collectable_type: String,
    pub icon: String,
    pub quantity: i64,
}

/// One entry of a batch update, addressed by collectable type the way the
/// client sends its toolbar snapshot.
#[derive(Debug, Clone)]
pub struct SlotUpdate {
    pub slot_index: i64,
    pub collectable_type: String,
    pub quantity: i64,
}

#[derive(Clone)]
pub struct InventoryStore {
    pool: SqlitePool,
}

impl InventoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every slot for the player. A dangling or empty item id resolves to
    /// the `NONE` sentinel instead of failing the whole call.
    pub async fn list_slots(&self, player_id: i64) -> Result<Vec<SlotView>, EconomyError> {
        let rows = sqlx::query(
            r#"SELECT s.id, s.slot_index, s.item_id, s.quantity,
                      i.collectable_type, i.icon
               FROM inventory_slots s
               LEFT JOIN items i ON i.id = s.item_id
               WHERE s.player_id = ?
               ORDER BY s.slot_index"#,
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| SlotView {
                id: r.get("id"),
                slot_index: r.get("slot_index"),
                item_id: r.get("item_id"),
                collectable_type: r
                    .get::<Option<String>, _>("collectable_type")
                    .unwrap_or_else(|| NONE_ITEM.to_string()),
                icon: r
                    .get::<Option<String>, _>("icon")
                    .unwrap_or_else(|| NONE_ITEM.to_string()),
                quantity: r.get("quantity"),
            })
            .collect())
    }

    /// Overwrite one slot entirely. Idempotent: the same arguments always
    /// produce the same state.
    pub async fn set_slot(
        &self,
        player_id: i64,
        slot_index: i64,
        item_id: Option<i64>,
        quantity: i64,
    ) -> Result<(), EconomyError> {
        let mut tx = self.pool.begin().await?;
        set_slot_tx(&mut *tx, player_id, slot_index, item_id, quantity).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Apply a whole snapshot of slots in one transaction. The first
    /// invalid entry aborts the batch; nothing is applied.
    pub async fn batch_update(
        &self,
        player_id: i64,
        entries: &[SlotUpdate],
    ) -> Result<(), EconomyError> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let item_id = if entry.collectable_type == NONE_ITEM || entry.collectable_type.is_empty()
            {
                None
            } else {
                let id: Option<i64> =
                    sqlx::query_scalar("SELECT id FROM items WHERE collectable_type = ?")
                        .bind(&entry.collectable_type)
                        .fetch_optional(&mut *tx)
                        .await?;
                Some(id.ok_or_else(|| {
                    EconomyError::UnknownItemType(entry.collectable_type.clone())
                })?)
            };

            set_slot_tx(&mut *tx, player_id, entry.slot_index, item_id, entry.quantity).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

pub(crate) async fn set_slot_tx(
    conn: &mut SqliteConnection,
    player_id: i64,
    slot_index: i64,
    item_id: Option<i64>,
    quantity: i64,
) -> Result<(), EconomyError> {
    if quantity < 0 {
        return Err(EconomyError::InvalidQuantity);
    }
    if quantity > 0 && item_id.is_none() {
        return Err(EconomyError::InvalidQuantity);
    }

    // item NULL <=> quantity 0
    let item_id = if quantity == 0 { None } else { item_id };

    sqlx::query(
        r#"INSERT INTO inventory_slots (player_id, slot_index, item_id, quantity)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(player_id, slot_index)
           DO UPDATE SET item_id = excluded.item_id, quantity = excluded.quantity"#,
    )
    .bind(player_id)
    .bind(slot_index)
    .bind(item_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Add `quantity` of an item to the player's inventory inside a
/// caller-owned transaction. Stacks onto an existing slot of the same
/// item, then reuses the lowest empty slot, then appends a new one.
pub(crate) async fn credit_item_tx(
    conn: &mut SqliteConnection,
    player_id: i64,
    item_id: i64,
    quantity: i64,
) -> Result<(), EconomyError> {
    if quantity <= 0 {
        return Err(EconomyError::InvalidQuantity);
    }

    let existing: Option<i64> = sqlx::query_scalar(
        r#"SELECT slot_index FROM inventory_slots
           WHERE player_id = ? AND item_id = ?
           ORDER BY slot_index LIMIT 1"#,
    )
    .bind(player_id)
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(slot_index) = existing {
        sqlx::query(
            r#"UPDATE inventory_slots SET quantity = quantity + ?
               WHERE player_id = ? AND slot_index = ?"#,
        )
        .bind(quantity)
        .bind(player_id)
        .bind(slot_index)
        .execute(&mut *conn)
        .await?;
        return Ok(());
    }

    let empty: Option<i64> = sqlx::query_scalar(
        r#"SELECT slot_index FROM inventory_slots
           WHERE player_id = ? AND item_id IS NULL
           ORDER BY slot_index LIMIT 1"#,
    )
    .bind(player_id)
    .fetch_optional(&mut *conn)
    .await?;

    let slot_index = match empty {
        Some(index) => index,
        None => sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(slot_index) + 1, 0) FROM inventory_slots WHERE player_id = ?",
        )
        .bind(player_id)
        .fetch_one(&mut *conn)
        .await?,
    };

    set_slot_tx(conn, player_id, slot_index, Some(item_id), quantity).await
}

/// Remove `quantity` of an item from the player's inventory inside a
/// caller-owned transaction, draining slots in index order. Fails with
/// `InsufficientItems` without touching anything if the player holds less
/// than `quantity` in total.
pub(crate) async fn debit_item_tx(
    conn: &mut SqliteConnection,
    player_id: i64,
    item_id: i64,
    quantity: i64,
) -> Result<(), EconomyError> {
    if quantity <= 0 {
        return Err(EconomyError::InvalidQuantity);
    }

    let rows = sqlx::query(
        r#"SELECT slot_index, quantity FROM inventory_slots
           WHERE player_id = ? AND item_id = ?
           ORDER BY slot_index"#,
    )
    .bind(player_id)
    .bind(item_id)
    .fetch_all(&mut *conn)
    .await?;

    let held: i64 = rows.iter().map(|r| r.get::<i64, _>("quantity")).sum();
    if held < quantity {
        return Err(EconomyError::InsufficientItems);
    }

    let mut remaining = quantity;
    for row in rows {
        if remaining == 0 {
            break;
        }
        let slot_index: i64 = row.get("slot_index");
        let in_slot: i64 = row.get("quantity");
        let take = remaining.min(in_slot);

        set_slot_tx(
            conn,
            player_id,
            slot_index,
            Some(item_id),
            in_slot - take,
        )
        .await?;
        remaining -= take;
    }

    Ok(())
}
