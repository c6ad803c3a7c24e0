pub mod cmd;
pub mod commands;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod services;

use std::sync::Arc;

use anyhow::Context;

use crate::cmd::{CommandExecutor, RealCommandExecutor};
use crate::commands::AppState;
use crate::core::{
    ConfigWriter, IconSnapshot, IndicatorCatalog, ShellSettings, SystemNetworkObserver,
    VisibilityEngine, VisibilityStore,
};
use crate::services::AutomationScheduler;

pub fn run() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in IconGuard: {info}");
        default_hook(info);
    }));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config::DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("iconguard")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve()) {
        tracing::error!("IconGuard stopped: {e:#}");
        std::process::exit(1);
    }
}

async fn serve() -> anyhow::Result<()> {
    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let db_path = data_dir.join(config::DB_FILE_NAME);
    let database = Arc::new(db::Database::open(&db_path).context("failed to open SQLite database")?);
    tracing::info!("Database opened at {}", db_path.display());

    let catalog = Arc::new(IndicatorCatalog::builtin());
    let store = VisibilityStore::load(database, catalog)?;
    let executor: Arc<dyn CommandExecutor> = Arc::new(RealCommandExecutor::default());
    let writer = ConfigWriter::new(Arc::new(ShellSettings::new(Arc::clone(&executor))));
    let engine = Arc::new(VisibilityEngine::new(store, writer));

    let privileged = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.initialize()).await?
    };
    if !privileged {
        tracing::info!(
            "Grant write access with: {}",
            commands::grant_command(config::APP_PACKAGE)
        );
    }

    let observer = Arc::new(SystemNetworkObserver::new(executor));
    let state = AppState::new(AutomationScheduler::new(engine, observer));
    state.scheduler.start();
    tracing::info!("IconGuard running");

    let mut updates = commands::system::subscribe_snapshots(&state);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                log_snapshot(&updates.borrow_and_update());
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::warn!("Signal handler failed: {e}");
                }
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    state.scheduler.stop();
    Ok(())
}

fn log_snapshot(snapshot: &IconSnapshot) {
    let hidden = snapshot.visibility.values().filter(|v| !**v).count();
    tracing::info!(
        privileged = snapshot.privileged,
        smart_wifi = snapshot.smart_wifi_enabled,
        smart_data = snapshot.smart_data_enabled,
        "{hidden} indicators hidden, blacklist: {}",
        snapshot
            .blacklist
            .as_ref()
            .map(|tokens| tokens.iter().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_else(|| "<not written>".into())
    );
}
