//! Smart WiFi / Smart Data toggles and network-class selection.

use crate::core::state::AutomationConfig;
use crate::error::AppError;

use super::logic::parse_network_classes;
use super::state::AppState;

pub fn get_automation_config(state: &AppState) -> Result<AutomationConfig, AppError> {
    Ok(state.engine.automation_config())
}

pub fn set_smart_wifi_enabled(state: &AppState, enabled: bool) -> Result<(), AppError> {
    state.scheduler.set_smart_wifi_enabled(enabled)
}

/// Enabling also targets 4G and 5G; disabling drops them from the selection.
pub fn set_smart_data_enabled(state: &AppState, enabled: bool) -> Result<(), AppError> {
    state.scheduler.set_smart_data_enabled(enabled)
}

pub fn set_selected_network_classes(
    state: &AppState,
    classes: Vec<String>,
) -> Result<AutomationConfig, AppError> {
    let parsed = parse_network_classes(&classes)?;
    state.engine.set_selected_network_classes(parsed)?;
    Ok(state.engine.automation_config())
}
