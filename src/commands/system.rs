//! Privilege status, resume check and the reactive snapshot feed.

use tokio::sync::watch;

use crate::core::engine::IconSnapshot;
use crate::error::AppError;

use super::logic::{permission_status, PermissionStatus};
use super::state::AppState;

/// Cached privilege flag plus the command that grants it.
pub fn get_permission_status(state: &AppState) -> Result<PermissionStatus, AppError> {
    Ok(permission_status(state.engine.is_privileged()))
}

/// Run when the host returns to the foreground: re-probe, reload, restart.
pub fn check_permission(state: &AppState) -> Result<PermissionStatus, AppError> {
    let privileged = state.scheduler.resume()?;
    Ok(permission_status(privileged))
}

pub fn get_snapshot(state: &AppState) -> Result<IconSnapshot, AppError> {
    Ok(state.engine.snapshot())
}

pub fn subscribe_snapshots(state: &AppState) -> watch::Receiver<IconSnapshot> {
    state.engine.subscribe()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::icons::set_indicator_visible;
    use crate::commands::state::tests::test_state;

    #[tokio::test]
    async fn test_permission_status_follows_grant() {
        let (state, settings) = test_state();
        assert!(get_permission_status(&state).unwrap().privileged);

        settings.set_deny_writes(true);
        assert!(!check_permission(&state).unwrap().privileged);
        assert!(!get_snapshot(&state).unwrap().privileged);

        settings.set_deny_writes(false);
        let status = check_permission(&state).unwrap();
        assert!(status.privileged);
        assert!(status.grant_command.starts_with("adb shell pm grant "));
    }

    #[tokio::test]
    async fn test_subscription_sees_manual_edits() {
        let (state, _) = test_state();
        let mut rx = subscribe_snapshots(&state);
        rx.borrow_and_update();
        set_indicator_visible(&state, "nfc".into(), false).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow().visibility["nfc"]);
    }
}
