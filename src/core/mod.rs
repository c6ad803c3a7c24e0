//! Core logic: indicator catalog, blacklist compilation, privileged writes.
//!
//! - [`IndicatorCatalog`]: logical indicators and their raw tokens
//! - [`compiler`]: visibility + automation overrides -> hidden token set
//! - [`VisibilityStore`]: persisted manual flags and automation settings
//! - [`ConfigWriter`] / [`SecureSettings`]: the privileged setting and its probe
//! - [`NetworkObserver`]: live WiFi / cellular facts
//! - [`VisibilityEngine`]: the serialized read-compile-write pipeline

pub mod catalog;
pub mod compiler;
pub mod engine;
pub mod network;
pub mod state;
pub mod writer;

pub use catalog::{IndicatorCatalog, LogicalIndicator, VisibilityMap};
pub use engine::{IconSnapshot, Policy, PushOutcome, TickOutcome, VisibilityEngine};
pub use network::{NetworkClass, NetworkObserver, SystemNetworkObserver};
pub use state::{AutomationConfig, VisibilityStore};
pub use writer::{ConfigWriter, MemorySettings, SecureSettings, ShellSettings};
