//! Blacklist compilation and the automation policy decisions that feed it.
//!
//! Automation never writes tokens directly. It only adjusts the mobile-data
//! visibility handed to [`compile`], so one code path produces every value
//! that reaches the writer.

use std::collections::BTreeSet;

use crate::config::MOBILE_DATA_ID;
use crate::core::catalog::{IndicatorCatalog, VisibilityMap};
use crate::core::network::NetworkClass;

/// Live automation facts layered over the manual flags for one compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutomationOverrides {
    /// Latest WiFi-policy sample; `None` while that policy is off.
    pub wifi_connected: Option<bool>,
    /// Latest Data-policy verdict (`true` hides mobile data); `None` while off.
    pub data_hides_mobile: Option<bool>,
}

/// Tokens that must be hidden for `visibility`. Pure and deterministic.
pub fn compile(catalog: &IndicatorCatalog, visibility: &VisibilityMap) -> BTreeSet<String> {
    catalog.compile_tokens(visibility)
}

/// Mobile-data visibility after automation.
///
/// Precedence: a manual hide always wins; then a connected WiFi sample hides;
/// then the Data policy verdict; otherwise the manual flag.
pub fn resolve_mobile_visibility(manual_visible: bool, overrides: &AutomationOverrides) -> bool {
    if !manual_visible {
        return false;
    }
    if overrides.wifi_connected == Some(true) {
        return false;
    }
    match overrides.data_hides_mobile {
        Some(hide) => !hide,
        None => true,
    }
}

/// Compile the manual state with the live overrides applied to mobile data.
pub fn compile_effective(
    catalog: &IndicatorCatalog,
    manual: &VisibilityMap,
    overrides: &AutomationOverrides,
) -> BTreeSet<String> {
    let Some(mobile) = catalog.get_by_id(MOBILE_DATA_ID) else {
        return compile(catalog, manual);
    };
    let mut effective = manual.clone();
    effective.insert(
        MOBILE_DATA_ID.to_string(),
        resolve_mobile_visibility(mobile.resolve(manual), overrides),
    );
    compile(catalog, &effective)
}

/// Data-policy verdict for one tick.
///
/// `None` means skip the tick: the user hid mobile data manually and
/// automation may never re-show it. `Some(true)` hides mobile data.
pub fn data_policy_verdict(
    manual_visible: bool,
    class: NetworkClass,
    selected: &BTreeSet<NetworkClass>,
) -> Option<bool> {
    if !manual_visible {
        return None;
    }
    let hide = selected.contains(&class)
        || (selected.contains(&NetworkClass::Other) && class == NetworkClass::Other);
    Some(hide)
}
