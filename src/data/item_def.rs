use serde::{Deserialize, Serialize};

// ============================================================================
// Item Definitions
// ============================================================================

/// Raw item definition as it appears in a TOML file, keyed by collectable
/// type in a table:
///
/// ```toml
/// [WHEAT]
/// display_name = "Wheat"
/// icon = "wheat"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawItemDefinition {
    pub display_name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// A fully-resolved item definition, ready to seed the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDefinition {
    pub collectable_type: String,
    pub display_name: String,
    pub icon: String,
}

impl ItemDefinition {
    pub fn from_raw(collectable_type: &str, raw: &RawItemDefinition) -> Self {
        Self {
            collectable_type: collectable_type.to_string(),
            display_name: raw.display_name.clone(),
            // Fall back to the lowercased type key when no icon is given
            icon: raw
                .icon
                .clone()
                .unwrap_or_else(|| collectable_type.to_lowercase()),
        }
    }
}
