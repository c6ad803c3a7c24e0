//! Command handlers for the presentation layer, organized by functional domain.
//!
//! - `icons`: indicator listing, search, manual visibility, import, reset
//! - `automation`: Smart WiFi / Smart Data toggles, network-class selection
//! - `system`: privilege status, resume check, snapshot subscription
//! - `logic`: Pure business logic functions (unit-testable)
//! - `state`: Shared `AppState` definition

pub mod automation;
pub mod icons;
mod logic;
mod state;
pub mod system;

pub use logic::{grant_command, CategoryGroup, IndicatorRow, PermissionStatus};
pub use state::AppState;
