//! Shared application state handed to every command handler.

use std::sync::Arc;

use crate::core::engine::VisibilityEngine;
use crate::services::AutomationScheduler;

pub struct AppState {
    pub engine: Arc<VisibilityEngine>,
    /// Policy tasks; toggling automation goes through here so tasks follow the flags.
    pub scheduler: AutomationScheduler,
}

impl AppState {
    pub fn new(scheduler: AutomationScheduler) -> Self {
        Self {
            engine: Arc::clone(scheduler.engine()),
            scheduler,
        }
    }
}
