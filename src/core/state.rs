//! Persisted manual visibility flags and automation settings.
//!
//! Every setter commits to the database before updating the in-memory copy
//! and returning, so a crash right after a setter cannot lose the update.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::core::catalog::{IndicatorCatalog, VisibilityMap};
use crate::core::network::NetworkClass;
use crate::db::Database;
use crate::error::AppError;

/// User-controlled automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub smart_wifi_enabled: bool,
    pub smart_data_enabled: bool,
    pub selected_network_classes: BTreeSet<NetworkClass>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            smart_wifi_enabled: false,
            smart_data_enabled: false,
            selected_network_classes: default_network_classes(),
        }
    }
}

impl AutomationConfig {
    /// Flip Smart Data, adding 4G and 5G to the targets when it turns on and
    /// removing them when it turns off. Other selected classes are kept.
    pub fn with_smart_data(mut self, enabled: bool) -> Self {
        self.smart_data_enabled = enabled;
        for class in default_network_classes() {
            if enabled {
                self.selected_network_classes.insert(class);
            } else {
                self.selected_network_classes.remove(&class);
            }
        }
        self
    }
}

pub fn default_network_classes() -> BTreeSet<NetworkClass> {
    [NetworkClass::Class4G, NetworkClass::Class5G].into_iter().collect()
}

/// Catalog id encoded in a per-indicator preference key.
fn id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(config::INDICATOR_KEY_PREFIX)?
        .strip_suffix("_visible")
}

/// Write-through cache over the preference table.
pub struct VisibilityStore {
    db: Arc<Database>,
    catalog: Arc<IndicatorCatalog>,
    /// Explicit manual flags only; absent ids resolve to the catalog default.
    manual: DashMap<String, bool>,
    automation: Mutex<AutomationConfig>,
}

impl VisibilityStore {
    pub fn load(db: Arc<Database>, catalog: Arc<IndicatorCatalog>) -> Result<Self, AppError> {
        let store = Self {
            db,
            catalog,
            manual: DashMap::new(),
            automation: Mutex::new(AutomationConfig::default()),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-read everything from the database. The new manual flags are built
    /// first and then merged in, so concurrent readers never observe an
    /// emptied map.
    pub fn reload(&self) -> Result<(), AppError> {
        let persisted = self.db.bools_with_prefix(config::INDICATOR_KEY_PREFIX)?;
        let mut fresh: BTreeMap<String, bool> = BTreeMap::new();
        for (key, visible) in persisted {
            match id_from_key(&key) {
                Some(id) if self.catalog.get_by_id(id).is_some() => {
                    fresh.insert(id.to_string(), visible);
                }
                _ => tracing::debug!("Ignoring preference '{key}' with no catalog entry"),
            }
        }
        for (id, visible) in &fresh {
            self.manual.insert(id.clone(), *visible);
        }
        self.manual.retain(|id, _| fresh.contains_key(id));

        let classes = match self
            .db
            .get_json::<BTreeSet<NetworkClass>>(config::PREF_SELECTED_NETWORK_CLASSES)
        {
            Ok(Some(classes)) => classes,
            Ok(None) => default_network_classes(),
            Err(e) => {
                tracing::warn!("Selected network classes unreadable, using defaults: {e:#}");
                default_network_classes()
            }
        };
        let loaded = AutomationConfig {
            smart_wifi_enabled: self
                .db
                .get_bool(config::PREF_SMART_WIFI_ENABLED)?
                .unwrap_or(false),
            smart_data_enabled: self
                .db
                .get_bool(config::PREF_SMART_DATA_ENABLED)?
                .unwrap_or(false),
            selected_network_classes: classes,
        };
        *self.automation.lock().unwrap() = loaded;
        Ok(())
    }

    pub fn catalog(&self) -> &Arc<IndicatorCatalog> {
        &self.catalog
    }

    /// Manual visibility of `id`, or its catalog default when never set.
    pub fn get(&self, id: &str) -> Result<bool, AppError> {
        let indicator = self
            .catalog
            .get_by_id(id)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown indicator '{id}'")))?;
        Ok(self
            .manual
            .get(id)
            .map(|v| *v)
            .unwrap_or(indicator.default_visible))
    }

    /// Persist a manual flag for `id`.
    pub fn set(&self, id: &str, visible: bool) -> Result<(), AppError> {
        if self.catalog.get_by_id(id).is_none() {
            return Err(AppError::InvalidInput(format!("unknown indicator '{id}'")));
        }
        self.db.set_bool(&config::indicator_key(id), visible)?;
        self.manual.insert(id.to_string(), visible);
        Ok(())
    }

    /// Persist many manual flags atomically. Unknown ids are rejected up front.
    pub fn set_many(&self, visibility: &VisibilityMap) -> Result<(), AppError> {
        if let Some(unknown) = visibility.keys().find(|id| self.catalog.get_by_id(id).is_none()) {
            return Err(AppError::InvalidInput(format!("unknown indicator '{unknown}'")));
        }
        let entries: BTreeMap<String, bool> = visibility
            .iter()
            .map(|(id, visible)| (config::indicator_key(id), *visible))
            .collect();
        self.db.set_bools(&entries)?;
        for (id, visible) in visibility {
            self.manual.insert(id.clone(), *visible);
        }
        Ok(())
    }

    /// Forget all manual flags so every indicator resolves to its default.
    pub fn clear_manual(&self) -> Result<usize, AppError> {
        let removed = self.db.remove_prefix(config::INDICATOR_KEY_PREFIX)?;
        self.manual.clear();
        Ok(removed)
    }

    /// Explicitly set flags only, as the compiler's input.
    pub fn manual_visibility(&self) -> VisibilityMap {
        self.manual
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Every catalog indicator with its manual-or-default visibility.
    pub fn resolved_visibility(&self) -> VisibilityMap {
        let manual = self.manual_visibility();
        self.catalog
            .indicators()
            .iter()
            .map(|i| (i.id.clone(), i.resolve(&manual)))
            .collect()
    }

    pub fn automation_config(&self) -> AutomationConfig {
        self.automation.lock().unwrap().clone()
    }

    /// Persist all three automation keys in one transaction.
    pub fn set_automation_config(&self, next: AutomationConfig) -> Result<(), AppError> {
        let classes =
            serde_json::to_value(&next.selected_network_classes).map_err(anyhow::Error::from)?;
        self.db.put_json_many(&[
            (config::PREF_SMART_WIFI_ENABLED, next.smart_wifi_enabled.into()),
            (config::PREF_SMART_DATA_ENABLED, next.smart_data_enabled.into()),
            (config::PREF_SELECTED_NETWORK_CLASSES, classes),
        ])?;
        *self.automation.lock().unwrap() = next;
        Ok(())
    }
}
