//! Background automation lifecycle.
//!
//! `AutomationScheduler` owns the two policy tasks. Each task ticks on its own
//! interval, samples the observer off the async workers, and hands the sample
//! to the engine tagged with the generation it was started under. Stopping a
//! policy aborts the task and bumps the generation, so an in-flight sample is
//! dropped rather than written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::engine::{Policy, TickOutcome, VisibilityEngine};
use crate::core::network::NetworkObserver;
use crate::error::AppError;

#[derive(Default)]
struct PolicyTasks {
    wifi: Option<JoinHandle<()>>,
    data: Option<JoinHandle<()>>,
}

impl PolicyTasks {
    fn slot(&mut self, policy: Policy) -> &mut Option<JoinHandle<()>> {
        match policy {
            Policy::Wifi => &mut self.wifi,
            Policy::Data => &mut self.data,
        }
    }
}

/// Starts, stops and restarts the WiFi and Data policy tasks.
pub struct AutomationScheduler {
    engine: Arc<VisibilityEngine>,
    observer: Arc<dyn NetworkObserver>,
    runtime: Handle,
    tasks: Mutex<PolicyTasks>,
    /// Outlive task restarts, so a hung sample also holds off the next task.
    wifi_sample: SampleSlot,
    data_sample: SampleSlot,
}

impl AutomationScheduler {
    /// Must be called from within a tokio runtime; tasks are spawned onto it.
    pub fn new(engine: Arc<VisibilityEngine>, observer: Arc<dyn NetworkObserver>) -> Self {
        Self {
            engine,
            observer,
            runtime: Handle::current(),
            tasks: Mutex::new(PolicyTasks::default()),
            wifi_sample: SampleSlot::default(),
            data_sample: SampleSlot::default(),
        }
    }

    pub fn engine(&self) -> &Arc<VisibilityEngine> {
        &self.engine
    }

    /// (Re)start every policy persisted as enabled.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for policy in [Policy::Wifi, Policy::Data] {
            let generation = self.engine.activate(policy);
            self.replace_task(&mut tasks, policy, generation);
        }
    }

    /// Abort both tasks and invalidate their outstanding samples.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for policy in [Policy::Wifi, Policy::Data] {
            self.engine.retire(policy);
            self.replace_task(&mut tasks, policy, None);
        }
    }

    pub fn set_smart_wifi_enabled(&self, enabled: bool) -> Result<(), AppError> {
        self.set_enabled(Policy::Wifi, enabled)
    }

    pub fn set_smart_data_enabled(&self, enabled: bool) -> Result<(), AppError> {
        self.set_enabled(Policy::Data, enabled)
    }

    /// Foreground-resume check: re-probe, reload, restart enabled policies.
    pub fn resume(&self) -> Result<bool, AppError> {
        let privileged = self.engine.refresh()?;
        self.start();
        Ok(privileged)
    }

    pub fn is_running(&self, policy: Policy) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        tasks
            .slot(policy)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// The generation bump and the task swap happen under one `tasks` lock,
    /// so a concurrent `start` cannot interleave between them.
    fn set_enabled(&self, policy: Policy, enabled: bool) -> Result<(), AppError> {
        let mut tasks = self.tasks.lock().unwrap();
        let generation = self.engine.set_policy_enabled(policy, enabled)?;
        self.replace_task(&mut tasks, policy, enabled.then_some(generation));
        Ok(())
    }

    /// Swap the policy's task. A superseded generation is refused and the
    /// running task is left alone.
    fn replace_task(&self, tasks: &mut PolicyTasks, policy: Policy, generation: Option<u64>) {
        if let Some(generation) = generation {
            if !self.engine.is_current(policy, generation) {
                tracing::debug!("{} generation {generation} superseded, not started", policy.name());
                return;
            }
        }
        if let Some(old) = tasks.slot(policy).take() {
            old.abort();
        }
        if let Some(generation) = generation {
            let slot = match policy {
                Policy::Wifi => self.wifi_sample.clone(),
                Policy::Data => self.data_sample.clone(),
            };
            let task = self.runtime.spawn(run_policy(
                Arc::clone(&self.engine),
                Arc::clone(&self.observer),
                slot,
                policy,
                generation,
            ));
            *tasks.slot(policy) = Some(task);
            tracing::debug!("{} task started (generation {generation})", policy.name());
        }
    }
}

impl Drop for AutomationScheduler {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock().unwrap();
        for policy in [Policy::Wifi, Policy::Data] {
            if let Some(task) = tasks.slot(policy).take() {
                task.abort();
            }
        }
    }
}

/// Set while an observer call is running on the blocking pool. A call that
/// overruns its budget keeps the flag until it actually returns.
#[derive(Clone, Default)]
struct SampleSlot(Arc<AtomicBool>);

struct SampleGuard(Arc<AtomicBool>);

impl SampleSlot {
    fn try_claim(&self) -> Option<SampleGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SampleGuard(Arc::clone(&self.0)))
    }
}

impl Drop for SampleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One policy loop. The first tick fires immediately.
async fn run_policy(
    engine: Arc<VisibilityEngine>,
    observer: Arc<dyn NetworkObserver>,
    slot: SampleSlot,
    policy: Policy,
    generation: u64,
) {
    let period = policy.interval();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !engine.is_current(policy, generation) {
            break;
        }
        // Paused, not stopped: a later privilege grant resumes the loop.
        if !engine.is_privileged() {
            tracing::debug!("{} tick skipped without write privilege", policy.name());
            continue;
        }

        let outcome = match policy {
            Policy::Wifi => {
                let Some(connected) =
                    sample_within(period, &slot, &observer, |o| o.sample_wifi_connected()).await
                else {
                    continue;
                };
                on_engine(&engine, move |e| e.apply_wifi_sample(generation, connected)).await
            }
            Policy::Data => {
                if !engine.mobile_manually_visible() {
                    tracing::debug!("{} tick skipped: mobile data hidden manually", policy.name());
                    continue;
                }
                let Some(class) =
                    sample_within(period, &slot, &observer, |o| o.sample_cellular_class()).await
                else {
                    continue;
                };
                on_engine(&engine, move |e| e.apply_data_sample(generation, class)).await
            }
        };

        if outcome == Some(TickOutcome::Stale) {
            break;
        }
    }
    tracing::debug!("{} task exiting (generation {generation})", policy.name());
}

/// Run a blocking observer call, giving up after `budget`. Nothing is
/// started while the previous call on `slot` is still running.
async fn sample_within<T, F>(
    budget: Duration,
    slot: &SampleSlot,
    observer: &Arc<dyn NetworkObserver>,
    sample: F,
) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn NetworkObserver) -> T + Send + 'static,
{
    let Some(guard) = slot.try_claim() else {
        tracing::debug!("Previous observer sample still running, skipping tick");
        return None;
    };
    let observer = Arc::clone(observer);
    let call = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        sample(observer.as_ref())
    });
    match tokio::time::timeout(budget, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!("Observer sample panicked: {e}");
            None
        }
        Err(_) => {
            tracing::warn!("Observer sample exceeded {budget:?}, skipping tick");
            None
        }
    }
}

/// Apply a sample on the blocking pool; the engine performs database and shell I/O.
async fn on_engine<F>(engine: &Arc<VisibilityEngine>, apply: F) -> Option<TickOutcome>
where
    F: FnOnce(&VisibilityEngine) -> TickOutcome + Send + 'static,
{
    let engine = Arc::clone(engine);
    match tokio::task::spawn_blocking(move || apply(engine.as_ref())).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!("Automation tick panicked: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Condvar;

    use super::*;
    use crate::config::ICON_BLACKLIST_SETTING;
    use crate::core::engine::tests::{engine_with, two_icon_catalog};
    use crate::core::network::NetworkClass;
    use crate::core::writer::MemorySettings;

    #[derive(Default)]
    struct StubObserver {
        wifi: AtomicBool,
        class: Mutex<Option<NetworkClass>>,
        wifi_samples: AtomicUsize,
        cellular_samples: AtomicUsize,
    }

    impl NetworkObserver for StubObserver {
        fn sample_wifi_connected(&self) -> bool {
            self.wifi_samples.fetch_add(1, Ordering::SeqCst);
            self.wifi.load(Ordering::SeqCst)
        }

        fn sample_cellular_class(&self) -> NetworkClass {
            self.cellular_samples.fetch_add(1, Ordering::SeqCst);
            self.class.lock().unwrap().unwrap_or(NetworkClass::Other)
        }
    }

    struct Harness {
        settings: Arc<MemorySettings>,
        observer: Arc<StubObserver>,
        scheduler: AutomationScheduler,
    }

    fn harness() -> Harness {
        let settings = Arc::new(MemorySettings::new());
        let engine = Arc::new(engine_with(two_icon_catalog(), settings.clone()));
        engine.initialize();
        let observer = Arc::new(StubObserver::default());
        let scheduler = AutomationScheduler::new(engine, observer.clone());
        Harness {
            settings,
            observer,
            scheduler,
        }
    }

    impl Harness {
        fn stored(&self) -> Option<String> {
            self.settings.value(ICON_BLACKLIST_SETTING)
        }
    }

    /// Blocks every WiFi sample until released.
    #[derive(Default)]
    struct GatedObserver {
        released: Mutex<bool>,
        gate: Condvar,
        entered: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl GatedObserver {
        fn release(&self) {
            *self.released.lock().unwrap() = true;
            self.gate.notify_all();
        }
    }

    impl NetworkObserver for GatedObserver {
        fn sample_wifi_connected(&self) -> bool {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let released = self.released.lock().unwrap();
            let _ = self
                .gate
                .wait_timeout_while(released, Duration::from_secs(10), |r| !*r)
                .unwrap();
            self.active.fetch_sub(1, Ordering::SeqCst);
            true
        }

        fn sample_cellular_class(&self) -> NetworkClass {
            NetworkClass::Other
        }
    }

    /// Poll `cond` while letting spawned and blocking work make progress.
    async fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..5_000 {
            if cond() {
                return;
            }
            tokio::task::yield_now().await;
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached");
    }

    /// Advance the paused clock. Offsets of half a tick keep the test's own
    /// wake-ups from landing on a policy tick.
    async fn run_for(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wifi_policy_hides_mobile_while_connected() {
        let h = harness();
        h.observer.wifi.store(true, Ordering::SeqCst);
        h.scheduler.set_smart_wifi_enabled(true).unwrap();
        run_for(500).await;
        assert_eq!(h.stored().as_deref(), Some("mobile"));

        h.observer.wifi.store(false, Ordering::SeqCst);
        run_for(1000).await;
        assert_eq!(h.stored().as_deref(), Some(""));
        assert!(h.scheduler.is_running(Policy::Wifi));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_wifi_policy_stops_all_writes() {
        let h = harness();
        h.observer.wifi.store(true, Ordering::SeqCst);
        h.scheduler.set_smart_wifi_enabled(true).unwrap();
        run_for(3500).await;
        assert_eq!(h.observer.wifi_samples.load(Ordering::SeqCst), 4);

        h.scheduler.set_smart_wifi_enabled(false).unwrap();
        let writes = h.settings.put_count();
        let samples = h.observer.wifi_samples.load(Ordering::SeqCst);
        assert_eq!(h.stored().as_deref(), Some(""));

        run_for(30_000).await;
        assert_eq!(h.settings.put_count(), writes);
        assert_eq!(h.observer.wifi_samples.load(Ordering::SeqCst), samples);
        assert!(!h.scheduler.is_running(Policy::Wifi));
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_policy_ticks_every_ten_seconds() {
        let h = harness();
        *h.observer.class.lock().unwrap() = Some(NetworkClass::Class5G);
        h.scheduler.set_smart_data_enabled(true).unwrap();
        run_for(500).await;
        assert_eq!(h.observer.cellular_samples.load(Ordering::SeqCst), 1);
        assert_eq!(h.stored().as_deref(), Some("mobile"));

        *h.observer.class.lock().unwrap() = Some(NetworkClass::Class3G);
        run_for(5000).await;
        assert_eq!(h.stored().as_deref(), Some("mobile"));
        run_for(5000).await;
        assert_eq!(h.observer.cellular_samples.load(Ordering::SeqCst), 2);
        assert_eq!(h.stored().as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_policy_does_not_sample_when_mobile_hidden() {
        let h = harness();
        h.scheduler
            .engine()
            .set_indicator_visible("mobile_data", false)
            .unwrap();
        h.scheduler.set_smart_data_enabled(true).unwrap();
        run_for(25_500).await;
        assert_eq!(h.observer.cellular_samples.load(Ordering::SeqCst), 0);
        assert_eq!(h.stored().as_deref(), Some("mobile"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_privilege_pauses_until_resume() {
        let h = harness();
        h.settings.set_deny_writes(true);
        h.scheduler.set_smart_wifi_enabled(true).unwrap();
        // The enabling push was refused, so ticks are paused.
        assert!(!h.scheduler.engine().is_privileged());
        h.observer.wifi.store(true, Ordering::SeqCst);
        run_for(5500).await;
        assert_eq!(h.observer.wifi_samples.load(Ordering::SeqCst), 0);
        assert!(h.scheduler.is_running(Policy::Wifi));

        h.settings.set_deny_writes(false);
        assert!(h.scheduler.resume().unwrap());
        run_for(500).await;
        assert!(h.observer.wifi_samples.load(Ordering::SeqCst) >= 1);
        assert_eq!(h.stored().as_deref(), Some("mobile"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_restores_persisted_policies_and_stop_halts_them() {
        let h = harness();
        h.scheduler.set_smart_wifi_enabled(true).unwrap();
        h.scheduler.stop();
        assert!(!h.scheduler.is_running(Policy::Wifi));

        h.scheduler.start();
        assert!(h.scheduler.is_running(Policy::Wifi));
        assert!(!h.scheduler.is_running(Policy::Data));

        h.scheduler.stop();
        let writes = h.settings.put_count();
        run_for(5500).await;
        assert_eq!(h.settings.put_count(), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_generation_leaves_running_task_alone() {
        let h = harness();
        h.observer.wifi.store(true, Ordering::SeqCst);
        let enabled_at = h
            .scheduler
            .engine()
            .set_policy_enabled(Policy::Wifi, true)
            .unwrap();
        h.scheduler.start();
        {
            let mut tasks = h.scheduler.tasks.lock().unwrap();
            h.scheduler.replace_task(&mut tasks, Policy::Wifi, Some(enabled_at));
        }

        run_for(1500).await;
        assert!(h.scheduler.is_running(Policy::Wifi));
        assert_eq!(h.stored().as_deref(), Some("mobile"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_toggle_and_start_keep_policy_running() {
        let h = harness();
        h.observer.wifi.store(true, Ordering::SeqCst);
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..50 {
                    h.scheduler.set_smart_wifi_enabled(true).unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..50 {
                    h.scheduler.start();
                }
            });
        });

        run_for(1500).await;
        assert!(h.scheduler.engine().automation_config().smart_wifi_enabled);
        assert!(h.scheduler.is_running(Policy::Wifi));
        assert_eq!(h.stored().as_deref(), Some("mobile"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_sample_holds_off_later_ticks() {
        let settings = Arc::new(MemorySettings::new());
        let engine = Arc::new(engine_with(two_icon_catalog(), settings.clone()));
        engine.initialize();
        let observer = Arc::new(GatedObserver::default());
        let scheduler = AutomationScheduler::new(engine, observer.clone());
        scheduler.set_smart_wifi_enabled(true).unwrap();
        wait_until(|| observer.entered.load(Ordering::SeqCst) == 1).await;

        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(1000)).await;
            for _ in 0..20 {
                tokio::task::yield_now().await;
            }
        }
        assert_eq!(observer.entered.load(Ordering::SeqCst), 1);
        assert_eq!(observer.max_active.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_running(Policy::Wifi));
        assert_eq!(settings.value(ICON_BLACKLIST_SETTING).as_deref(), Some(""));

        observer.release();
        wait_until(|| !scheduler.wifi_sample.0.load(Ordering::SeqCst)).await;
        tokio::time::advance(Duration::from_millis(1000)).await;
        wait_until(|| settings.value(ICON_BLACKLIST_SETTING).as_deref() == Some("mobile")).await;
        assert!(observer.entered.load(Ordering::SeqCst) >= 2);
        assert_eq!(observer.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sample_slot_admits_one_claim_at_a_time() {
        let slot = SampleSlot::default();
        let guard = slot.try_claim().unwrap();
        assert!(slot.try_claim().is_none());
        drop(guard);
        assert!(slot.try_claim().is_some());
    }
}
