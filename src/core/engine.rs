//! The single read-compile-write pipeline.
//!
//! User commands and automation ticks both go through [`VisibilityEngine`],
//! which holds one mutex across every "read state, compile, write" sequence.
//! Each automation policy carries a generation counter inside that mutex; a
//! tick sampled under an older generation is discarded when it tries to apply.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::config;
use crate::core::catalog::{IndicatorCatalog, VisibilityMap};
use crate::core::compiler::{compile_effective, data_policy_verdict, AutomationOverrides};
use crate::core::network::NetworkClass;
use crate::core::state::{AutomationConfig, VisibilityStore};
use crate::core::writer::ConfigWriter;
use crate::error::AppError;

/// The two automation policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Policy {
    Wifi,
    Data,
}

impl Policy {
    pub fn interval(self) -> Duration {
        match self {
            Policy::Wifi => config::wifi_policy_interval(),
            Policy::Data => config::data_policy_interval(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Policy::Wifi => "smart-wifi",
            Policy::Data => "smart-data",
        }
    }

    fn enabled_in(self, cfg: &AutomationConfig) -> bool {
        match self {
            Policy::Wifi => cfg.smart_wifi_enabled,
            Policy::Data => cfg.smart_data_enabled,
        }
    }
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconSnapshot {
    pub privileged: bool,
    /// Manual-or-default visibility of every catalog indicator.
    pub visibility: VisibilityMap,
    pub smart_wifi_enabled: bool,
    pub smart_data_enabled: bool,
    pub selected_network_classes: BTreeSet<NetworkClass>,
    /// Last blacklist accepted by the writer; `None` before the first write.
    pub blacklist: Option<BTreeSet<String>>,
}

/// Result of one recompile-and-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Written,
    /// No write privilege; the compiled value was not pushed.
    Unprivileged,
    /// The write was refused and the privilege flag dropped.
    Denied,
    Failed,
}

/// What happened to one automation sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Applied(PushOutcome),
    /// Nothing to do this tick; the policy stays scheduled.
    Skipped,
    /// The sample belongs to a superseded generation and was dropped.
    Stale,
}

#[derive(Debug, Default)]
struct EngineState {
    overrides: AutomationOverrides,
    wifi_generation: u64,
    data_generation: u64,
    last_pushed: Option<BTreeSet<String>>,
}

impl EngineState {
    fn generation(&self, policy: Policy) -> u64 {
        match policy {
            Policy::Wifi => self.wifi_generation,
            Policy::Data => self.data_generation,
        }
    }

    /// Invalidate every outstanding tick of `policy` and drop its override.
    fn supersede(&mut self, policy: Policy) -> u64 {
        match policy {
            Policy::Wifi => {
                self.wifi_generation += 1;
                self.overrides.wifi_connected = None;
                self.wifi_generation
            }
            Policy::Data => {
                self.data_generation += 1;
                self.overrides.data_hides_mobile = None;
                self.data_generation
            }
        }
    }
}

pub struct VisibilityEngine {
    store: VisibilityStore,
    writer: ConfigWriter,
    state: Mutex<EngineState>,
    snapshot_tx: watch::Sender<IconSnapshot>,
}

impl VisibilityEngine {
    pub fn new(store: VisibilityStore, writer: ConfigWriter) -> Self {
        let state = EngineState::default();
        let (snapshot_tx, _) = watch::channel(snapshot_of(&store, &writer, &state));
        Self {
            store,
            writer,
            state: Mutex::new(state),
            snapshot_tx,
        }
    }

    /// Probe the write privilege and push the persisted state once.
    pub fn initialize(&self) -> bool {
        let mut state = self.lock();
        let privileged = self.writer.probe();
        if privileged {
            tracing::info!("Write privilege available");
        } else {
            tracing::warn!("Write privilege missing, running read-only");
        }
        self.push(&mut state);
        privileged
    }

    /// Re-probe, reload persisted state and push it (foreground resume).
    pub fn refresh(&self) -> Result<bool, AppError> {
        let mut state = self.lock();
        let privileged = self.writer.probe();
        self.store.reload()?;
        tracing::info!("State refreshed (privileged={privileged})");
        self.push(&mut state);
        Ok(privileged)
    }

    pub fn catalog(&self) -> &Arc<IndicatorCatalog> {
        self.store.catalog()
    }

    pub fn is_privileged(&self) -> bool {
        self.writer.is_privileged()
    }

    pub fn automation_config(&self) -> AutomationConfig {
        self.store.automation_config()
    }

    pub fn resolved_visibility(&self) -> VisibilityMap {
        self.store.resolved_visibility()
    }

    /// Whether the user left mobile data visible; the Data policy only acts then.
    pub fn mobile_manually_visible(&self) -> bool {
        self.store.get(config::MOBILE_DATA_ID).unwrap_or(false)
    }

    pub fn snapshot(&self) -> IconSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<IconSnapshot> {
        self.snapshot_tx.subscribe()
    }

    // ---- User commands ----

    pub fn set_indicator_visible(&self, id: &str, visible: bool) -> Result<PushOutcome, AppError> {
        let mut state = self.lock();
        self.store.set(id, visible)?;
        tracing::info!("Indicator '{id}' set {}", if visible { "visible" } else { "hidden" });
        Ok(self.push(&mut state))
    }

    /// Persist a policy flag and start a fresh generation for it.
    ///
    /// Any tick of the previous generation that has not yet applied is
    /// discarded, so once this returns with `enabled == false` the policy
    /// cannot write again. Returns the new generation.
    pub fn set_policy_enabled(&self, policy: Policy, enabled: bool) -> Result<u64, AppError> {
        let mut state = self.lock();
        let current = self.store.automation_config();
        let next = match policy {
            Policy::Wifi => AutomationConfig {
                smart_wifi_enabled: enabled,
                ..current
            },
            Policy::Data => current.with_smart_data(enabled),
        };
        self.store.set_automation_config(next)?;
        let generation = state.supersede(policy);
        tracing::info!(
            "{} {} (generation {generation})",
            policy.name(),
            if enabled { "enabled" } else { "disabled" }
        );
        self.push(&mut state);
        Ok(generation)
    }

    pub fn set_selected_network_classes(
        &self,
        classes: BTreeSet<NetworkClass>,
    ) -> Result<PushOutcome, AppError> {
        let mut state = self.lock();
        let next = AutomationConfig {
            selected_network_classes: classes,
            ..self.store.automation_config()
        };
        tracing::info!("Data policy targets {:?}", next.selected_network_classes);
        self.store.set_automation_config(next)?;
        Ok(self.push(&mut state))
    }

    /// Adopt the blacklist currently stored by the system as the manual state.
    pub fn import_from_system(&self) -> Result<VisibilityMap, AppError> {
        let mut state = self.lock();
        let tokens = self.writer.read()?;
        let derived = self.store.catalog().derive_visibility(&tokens);
        self.store.set_many(&derived)?;
        tracing::info!(
            "Imported {} hidden tokens from the system setting",
            tokens.len()
        );
        self.push(&mut state);
        Ok(derived)
    }

    /// Forget every manual flag. Returns how many were dropped.
    pub fn reset_to_defaults(&self) -> Result<usize, AppError> {
        let mut state = self.lock();
        let removed = self.store.clear_manual()?;
        tracing::info!("Reset {removed} indicators to their defaults");
        self.push(&mut state);
        Ok(removed)
    }

    // ---- Automation ----

    /// Start a generation for `policy` if it is persisted as enabled.
    pub fn activate(&self, policy: Policy) -> Option<u64> {
        let mut state = self.lock();
        if !policy.enabled_in(&self.store.automation_config()) {
            return None;
        }
        Some(state.supersede(policy))
    }

    /// Invalidate outstanding ticks without touching the persisted flag.
    pub fn retire(&self, policy: Policy) {
        self.lock().supersede(policy);
    }

    pub fn is_current(&self, policy: Policy, generation: u64) -> bool {
        self.lock().generation(policy) == generation
    }

    pub fn apply_wifi_sample(&self, generation: u64, connected: bool) -> TickOutcome {
        let mut state = self.lock();
        if !self.still_enabled(&state, Policy::Wifi, generation) {
            return TickOutcome::Stale;
        }
        if !self.writer.is_privileged() {
            return TickOutcome::Skipped;
        }
        tracing::debug!("WiFi tick: connected={connected}");
        state.overrides.wifi_connected = Some(connected);
        TickOutcome::Applied(self.push(&mut state))
    }

    pub fn apply_data_sample(&self, generation: u64, class: NetworkClass) -> TickOutcome {
        let mut state = self.lock();
        if !self.still_enabled(&state, Policy::Data, generation) {
            return TickOutcome::Stale;
        }
        if !self.writer.is_privileged() {
            return TickOutcome::Skipped;
        }
        let selected = self.store.automation_config().selected_network_classes;
        let Some(hide) = data_policy_verdict(self.mobile_manually_visible(), class, &selected) else {
            tracing::debug!("Data tick skipped: mobile data hidden manually");
            return TickOutcome::Skipped;
        };
        tracing::debug!("Data tick: class={class:?} hide_mobile={hide}");
        state.overrides.data_hides_mobile = Some(hide);
        TickOutcome::Applied(self.push(&mut state))
    }

    fn still_enabled(&self, state: &EngineState, policy: Policy, generation: u64) -> bool {
        state.generation(policy) == generation
            && policy.enabled_in(&self.store.automation_config())
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    /// Compile the current inputs, write them if privileged, publish a snapshot.
    ///
    /// Writer failures never escape: a refusal drops the privilege flag, which
    /// subscribers see in the published snapshot.
    fn push(&self, state: &mut EngineState) -> PushOutcome {
        let tokens = compile_effective(
            self.store.catalog(),
            &self.store.manual_visibility(),
            &state.overrides,
        );
        let outcome = if !self.writer.is_privileged() {
            tracing::debug!("Skipping write of {} tokens without privilege", tokens.len());
            PushOutcome::Unprivileged
        } else {
            match self.writer.write(&tokens) {
                Ok(()) => {
                    state.last_pushed = Some(tokens);
                    PushOutcome::Written
                }
                Err(e) if e.is_permission_denied() => {
                    tracing::warn!("Write privilege lost: {e}");
                    PushOutcome::Denied
                }
                Err(e) => {
                    tracing::warn!("Blacklist write failed: {e}");
                    PushOutcome::Failed
                }
            }
        };

        let next = snapshot_of(&self.store, &self.writer, state);
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        outcome
    }
}

fn snapshot_of(store: &VisibilityStore, writer: &ConfigWriter, state: &EngineState) -> IconSnapshot {
    let automation = store.automation_config();
    IconSnapshot {
        privileged: writer.is_privileged(),
        visibility: store.resolved_visibility(),
        smart_wifi_enabled: automation.smart_wifi_enabled,
        smart_data_enabled: automation.smart_data_enabled,
        selected_network_classes: automation.selected_network_classes,
        blacklist: state.last_pushed.clone(),
    }
}
