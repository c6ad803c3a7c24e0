//! Centralized runtime constants for IconGuard.
//!
//! All tunable intervals, setting names, and persisted keys are collected here
//! so they can be found and adjusted in a single place rather than scattered
//! across modules.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Interval between WiFi-policy ticks (seconds).
pub const WIFI_POLICY_INTERVAL_SECS: u64 = 1;

/// Interval between Data-policy ticks (seconds).
pub const DATA_POLICY_INTERVAL_SECS: u64 = 10;

/// Upper bound on one shell command (`settings`, `getprop`) before it is killed.
pub const COMMAND_TIMEOUT_SECS: u64 = 5;

/// Kernel interface directory holding per-interface `operstate` files.
pub const SYSFS_NET_DIR: &str = "/sys/class/net";

/// Name of the privileged system setting holding the comma-joined token list.
pub const ICON_BLACKLIST_SETTING: &str = "icon_blacklist";

/// Separator used when joining raw tokens into the setting value.
pub const TOKEN_SEPARATOR: char = ',';

/// Catalog id of the indicator the automation policies act on.
pub const MOBILE_DATA_ID: &str = "mobile_data";

/// Package name used in the out-of-band privilege grant command.
pub const APP_PACKAGE: &str = "com.sameerasw.essentials";

/// Environment variable overriding the data directory used by `run()`.
pub const DATA_DIR_ENV: &str = "ICONGUARD_DATA_DIR";

/// SQLite database file name inside the data directory.
pub const DB_FILE_NAME: &str = "iconguard.db";

/// Directory under `$HOME` used when no override is set.
pub const DEFAULT_DATA_SUBDIR: &str = ".iconguard";

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "iconguard=info";

// ---- Persisted preference keys ----

pub const PREF_SMART_WIFI_ENABLED: &str = "smart_wifi_enabled";
pub const PREF_SMART_DATA_ENABLED: &str = "smart_data_enabled";
pub const PREF_SELECTED_NETWORK_CLASSES: &str = "selected_network_classes";

/// Prefix shared by all per-indicator visibility keys.
pub const INDICATOR_KEY_PREFIX: &str = "indicator_";

/// Persisted key for one indicator's manual visibility flag.
pub fn indicator_key(id: &str) -> String {
    format!("{INDICATOR_KEY_PREFIX}{id}_visible")
}

/// Data directory: the override if set, else `$HOME/.iconguard`, else the
/// working directory.
pub fn resolve_data_dir(override_dir: Option<OsString>, home: Option<OsString>) -> PathBuf {
    match (override_dir, home) {
        (Some(dir), _) if !dir.is_empty() => PathBuf::from(dir),
        (_, Some(home)) => PathBuf::from(home).join(DEFAULT_DATA_SUBDIR),
        _ => PathBuf::from("."),
    }
}

pub fn data_dir() -> PathBuf {
    resolve_data_dir(std::env::var_os(DATA_DIR_ENV), std::env::var_os("HOME"))
}

pub fn wifi_policy_interval() -> Duration {
    Duration::from_secs(WIFI_POLICY_INTERVAL_SECS)
}

pub fn command_timeout() -> Duration {
    Duration::from_secs(COMMAND_TIMEOUT_SECS)
}

pub fn data_policy_interval() -> Duration {
    Duration::from_secs(DATA_POLICY_INTERVAL_SECS)
}
