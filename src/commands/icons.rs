//! Indicator listing, search, manual visibility, import and reset commands.

use crate::core::catalog::VisibilityMap;
use crate::error::AppError;

use super::logic::{group_by_category, indicator_row, CategoryGroup, IndicatorRow};
use super::state::AppState;

/// Every indicator with its current manual-or-default visibility.
pub fn get_indicators(state: &AppState) -> Result<Vec<IndicatorRow>, AppError> {
    let visibility = state.engine.resolved_visibility();
    Ok(state
        .engine
        .catalog()
        .indicators()
        .iter()
        .map(|i| indicator_row(i, &visibility))
        .collect())
}

pub fn get_indicator_groups(state: &AppState) -> Result<Vec<CategoryGroup>, AppError> {
    Ok(group_by_category(
        state.engine.catalog(),
        &state.engine.resolved_visibility(),
    ))
}

pub fn search_indicators(state: &AppState, query: String) -> Result<Vec<IndicatorRow>, AppError> {
    let visibility = state.engine.resolved_visibility();
    Ok(state
        .engine
        .catalog()
        .search(&query)
        .into_iter()
        .map(|i| indicator_row(i, &visibility))
        .collect())
}

pub fn set_indicator_visible(state: &AppState, id: String, visible: bool) -> Result<(), AppError> {
    state.engine.set_indicator_visible(&id, visible)?;
    Ok(())
}

/// Adopt the blacklist the system currently holds as the manual state.
pub fn import_from_system(state: &AppState) -> Result<VisibilityMap, AppError> {
    state.engine.import_from_system()
}

pub fn reset_to_defaults(state: &AppState) -> Result<usize, AppError> {
    state.engine.reset_to_defaults()
}
