//! Runtime-editable preferences
//!
//! Persisted under the `settings` key and edited through the hub, unlike
//! [`Config`](super::Config) which is read once from the environment.

use serde::{Deserialize, Serialize};
use shared::models::PrinterRole;
use std::collections::BTreeMap;

use crate::storage::{KvStore, SETTINGS_KEY, StorageResult, load_json, save_json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Category name (case-insensitive) → role
    #[serde(default)]
    pub category_mapping: BTreeMap<String, PrinterRole>,
    /// Word prefixes marking a beverage category, routed to the bar
    #[serde(default = "default_beverage_keywords")]
    pub beverage_keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub health_check_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            category_mapping: BTreeMap::new(),
            beverage_keywords: default_beverage_keywords(),
            health_check_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_beverage_keywords() -> Vec<String> {
    [
        "boisson", "bière", "biere", "vin", "cocktail", "apéritif", "aperitif", "digestif",
        "soda", "jus", "café", "cafe", "thé", "drink", "beverage",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

impl Settings {
    pub fn load(store: &dyn KvStore) -> StorageResult<Self> {
        Ok(load_json(store, SETTINGS_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &dyn KvStore) -> StorageResult<()> {
        save_json(store, SETTINGS_KEY, self)
    }

    /// Replace the category mapping, normalizing keys
    pub fn set_category_mapping(&mut self, mapping: BTreeMap<String, PrinterRole>) {
        self.category_mapping = mapping
            .into_iter()
            .map(|(category, role)| (normalize_category(&category), role))
            .collect();
    }

    /// Role a category is printed on.
    ///
    /// Explicit mapping first, then the beverage keywords (bar), else kitchen.
    pub fn route_category(&self, category: Option<&str>) -> PrinterRole {
        let Some(category) = category.map(normalize_category).filter(|c| !c.is_empty()) else {
            return PrinterRole::Kitchen;
        };

        let mapped = self
            .category_mapping
            .iter()
            .find(|(key, _)| normalize_category(key) == category)
            .map(|(_, role)| *role);
        if let Some(role) = mapped {
            return role;
        }

        let is_beverage = category
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .any(|word| {
                self.beverage_keywords
                    .iter()
                    .any(|kw| word.starts_with(&kw.to_lowercase()))
            });
        if is_beverage {
            PrinterRole::Bar
        } else {
            PrinterRole::Kitchen
        }
    }
}

fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_explicit_mapping_wins() {
        let mut settings = Settings::default();
        settings.set_category_mapping(BTreeMap::from([
            ("Boissons".to_string(), PrinterRole::Bar),
            ("Desserts".to_string(), PrinterRole::Cashier),
        ]));
        assert_eq!(settings.route_category(Some("boissons")), PrinterRole::Bar);
        assert_eq!(settings.route_category(Some(" DESSERTS ")), PrinterRole::Cashier);
    }

    #[test]
    fn test_beverage_heuristic() {
        let settings = Settings::default();
        assert_eq!(settings.route_category(Some("Vins rouges")), PrinterRole::Bar);
        assert_eq!(settings.route_category(Some("Bières pression")), PrinterRole::Bar);
        assert_eq!(settings.route_category(Some("Cafés")), PrinterRole::Bar);
        assert_eq!(settings.route_category(Some("Plats")), PrinterRole::Kitchen);
        assert_eq!(settings.route_category(None), PrinterRole::Kitchen);
        assert_eq!(settings.route_category(Some("  ")), PrinterRole::Kitchen);
    }

    #[test]
    fn test_keywords_are_configurable() {
        let settings = Settings {
            beverage_keywords: vec!["getränk".into()],
            ..Settings::default()
        };
        assert_eq!(settings.route_category(Some("Getränke")), PrinterRole::Bar);
        assert_eq!(settings.route_category(Some("Boissons")), PrinterRole::Kitchen);
    }

    #[test]
    fn test_persistence() {
        let store = MemoryStore::new();
        assert_eq!(Settings::load(&store).unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.health_check_enabled = false;
        settings.save(&store).unwrap();
        assert!(!Settings::load(&store).unwrap().health_check_enabled);
    }
}
