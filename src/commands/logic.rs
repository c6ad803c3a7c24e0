//! Pure business logic behind the command handlers.
//!
//! These functions take plain parameters (no `AppState`) and can be
//! unit-tested without a runtime.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config;
use crate::core::catalog::{IndicatorCatalog, LogicalIndicator, VisibilityMap};
use crate::core::network::NetworkClass;
use crate::error::AppError;

/// One indicator as shown in a settings list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorRow {
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub visible: bool,
    pub default_visible: bool,
    pub raw_tokens: Vec<String>,
}

/// Indicators of one category, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub name: String,
    pub indicators: Vec<IndicatorRow>,
}

/// Whether writes are possible and how to grant the privilege if not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionStatus {
    pub privileged: bool,
    pub grant_command: String,
}

/// The out-of-band command that grants the secure-settings write privilege.
pub fn grant_command(package: &str) -> String {
    format!("adb shell pm grant {package} android.permission.WRITE_SECURE_SETTINGS")
}

pub fn permission_status(privileged: bool) -> PermissionStatus {
    PermissionStatus {
        privileged,
        grant_command: grant_command(config::APP_PACKAGE),
    }
}

pub fn indicator_row(indicator: &LogicalIndicator, visibility: &VisibilityMap) -> IndicatorRow {
    IndicatorRow {
        id: indicator.id.clone(),
        display_name: indicator.display_name.clone(),
        category: indicator.category.clone(),
        visible: indicator.resolve(visibility),
        default_visible: indicator.default_visible,
        raw_tokens: indicator.raw_tokens.iter().cloned().collect(),
    }
}

pub fn group_by_category(catalog: &IndicatorCatalog, visibility: &VisibilityMap) -> Vec<CategoryGroup> {
    catalog
        .categories()
        .into_iter()
        .map(|name| CategoryGroup {
            name: name.to_string(),
            indicators: catalog
                .by_category(name)
                .map(|i| indicator_row(i, visibility))
                .collect(),
        })
        .collect()
}

/// Parse class names as the presentation layer sends them (`CLASS_4G`, ...).
pub fn parse_network_classes(names: &[String]) -> Result<BTreeSet<NetworkClass>, AppError> {
    names
        .iter()
        .map(|name| {
            serde_json::from_value(serde_json::Value::String(name.clone()))
                .map_err(|_| AppError::InvalidInput(format!("unknown network class '{name}'")))
        })
        .collect()
}
