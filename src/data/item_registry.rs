use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use super::item_def::{ItemDefinition, RawItemDefinition};

/// Registry for all item definitions
pub struct ItemRegistry {
    items: HashMap<String, ItemDefinition>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Load all item definitions from a directory
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<(), String> {
        let items_dir = data_dir.join("items");

        if !items_dir.exists() {
            warn!("Items directory does not exist: {:?}", items_dir);
            return Ok(());
        }

        let entries = std::fs::read_dir(&items_dir)
            .map_err(|e| format!("Failed to read items directory: {}", e))?;

        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
            let path = entry.path();

            if path.extension().map_or(false, |ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

                // Parse as table of items keyed by collectable type
                let table: HashMap<String, RawItemDefinition> = toml::from_str(&content)
                    .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

                for (collectable_type, raw) in table {
                    if self.items.contains_key(&collectable_type) {
                        warn!(
                            "Duplicate item type '{}' in {:?}, overwriting",
                            collectable_type, path
                        );
                    }
                    let item = ItemDefinition::from_raw(&collectable_type, &raw);
                    self.items.insert(collectable_type, item);
                }
            }
        }

        info!("Loaded {} item definitions", self.items.len());

        Ok(())
    }

    /// Get an item definition by collectable type
    #[cfg(test)]
    pub fn get(&self, collectable_type: &str) -> Option<&ItemDefinition> {
        self.items.get(collectable_type)
    }

    /// Get all items
    pub fn all(&self) -> impl Iterator<Item = &ItemDefinition> {
        self.items.values()
    }

    /// Check if an item exists
    #[cfg(test)]
    pub fn contains(&self, collectable_type: &str) -> bool {
        self.items.contains_key(collectable_type)
    }

    /// Get the number of loaded items
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_items_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        let items_dir = temp_dir.path().join("items");
        std::fs::create_dir(&items_dir).unwrap();

        let toml_content = r#"
[WHEAT]
display_name = "Wheat"
icon = "wheat"

[CARROT_SEED]
display_name = "Carrot Seed"
"#;

        let mut file = std::fs::File::create(items_dir.join("crops.toml")).unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let mut registry = ItemRegistry::new();
        registry.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("WHEAT"));

        let seed = registry.get("CARROT_SEED").unwrap();
        assert_eq!(seed.display_name, "Carrot Seed");
        assert_eq!(seed.icon, "carrot_seed");
    }

    #[test]
    fn test_missing_directory_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = ItemRegistry::new();
        registry.load_from_directory(temp_dir.path()).unwrap();
        assert!(registry.is_empty());
    }
}
