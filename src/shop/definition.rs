//! Shop Definition Structures
//!
//! Data structures for the NPC-operated regular shop, loaded from TOML and
//! seeded into the catalog tables at startup.

use serde::{Deserialize, Serialize};

fn default_can_buy() -> bool {
    true
}

/// A regular-shop definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopDefinition {
    pub id: String,
    pub display_name: String,
    pub stock: Vec<ShopStockEntry>,
}

/// An item stocked in the regular shop. `stock_limit` is the per-player
/// purchase cap; omitted means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopStockEntry {
    pub collectable_type: String,
    pub buy_price: i64,
    #[serde(default)]
    pub stock_limit: Option<i64>,
    #[serde(default = "default_can_buy")]
    pub can_buy: bool,
}

impl ShopDefinition {
    /// Get a stock entry by collectable type
    #[cfg(test)]
    pub fn get_stock(&self, collectable_type: &str) -> Option<&ShopStockEntry> {
        self.stock
            .iter()
            .find(|s| s.collectable_type == collectable_type)
    }

    /// Validate prices and limits before the definition is seeded
    pub fn validate(&self) -> Result<(), String> {
        for entry in &self.stock {
            if entry.buy_price < 0 {
                return Err(format!(
                    "Shop '{}': item '{}' has a negative buy_price",
                    self.id, entry.collectable_type
                ));
            }
            if let Some(limit) = entry.stock_limit {
                if limit < 0 {
                    return Err(format!(
                        "Shop '{}': item '{}' has a negative stock_limit",
                        self.id, entry.collectable_type
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_buy_defaults_to_true() {
        let def: ShopDefinition = toml::from_str(
            r#"
id = "general_store"
display_name = "General Store"

[[stock]]
collectable_type = "WHEAT_SEED"
buy_price = 5
stock_limit = 30
"#,
        )
        .unwrap();

        let entry = def.get_stock("WHEAT_SEED").unwrap();
        assert!(entry.can_buy);
        assert_eq!(entry.stock_limit, Some(30));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_price() {
        let def = ShopDefinition {
            id: "bad".to_string(),
            display_name: "Bad Shop".to_string(),
            stock: vec![ShopStockEntry {
                collectable_type: "WHEAT".to_string(),
                buy_price: -1,
                stock_limit: None,
                can_buy: true,
            }],
        };
        assert!(def.validate().is_err());
    }
}
