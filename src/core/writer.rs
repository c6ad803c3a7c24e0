//! Privileged boundary for the `icon_blacklist` system setting.
//!
//! Reads are unrestricted; writes need an out-of-band grant. Every platform
//! failure is caught here and reported as [`AppError::PermissionDenied`] or
//! [`AppError::Write`], never propagated as a panic.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::cmd::{args_to_strings, CommandExecutor};
use crate::config;
use crate::error::AppError;

/// Key-value access to the secure system settings namespace.
pub trait SecureSettings: Send + Sync {
    /// Current value, `None` when the key is unset.
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn put(&self, key: &str, value: &str) -> Result<(), AppError>;
    /// Remove the key so it reads back as unset.
    fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Join tokens in sorted order so equal sets always produce equal strings.
pub fn join_tokens(tokens: &BTreeSet<String>) -> String {
    let parts: Vec<&str> = tokens.iter().map(String::as_str).collect();
    parts.join(&config::TOKEN_SEPARATOR.to_string())
}

/// Split a stored setting value back into its token set.
pub fn parse_blacklist(value: &str) -> BTreeSet<String> {
    value
        .split(config::TOKEN_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Writes the compiled blacklist and tracks whether the write privilege is held.
pub struct ConfigWriter {
    settings: Arc<dyn SecureSettings>,
    key: String,
    privileged: AtomicBool,
}

impl ConfigWriter {
    pub fn new(settings: Arc<dyn SecureSettings>) -> Self {
        Self {
            settings,
            key: config::ICON_BLACKLIST_SETTING.to_string(),
            privileged: AtomicBool::new(false),
        }
    }

    /// Push `tokens` as the new setting value with a single privileged write.
    ///
    /// A `PermissionDenied` result also clears the cached privilege flag.
    pub fn write(&self, tokens: &BTreeSet<String>) -> Result<(), AppError> {
        let value = join_tokens(tokens);
        match self.settings.put(&self.key, &value) {
            Ok(()) => {
                tracing::debug!("{} <- \"{value}\"", self.key);
                Ok(())
            }
            Err(e) => {
                if e.is_permission_denied() {
                    self.privileged.store(false, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    /// Tokens currently stored in the setting (empty when unset).
    pub fn read(&self) -> Result<BTreeSet<String>, AppError> {
        Ok(self
            .settings
            .get(&self.key)?
            .map(|v| parse_blacklist(&v))
            .unwrap_or_default())
    }

    /// Probe write privilege by writing the current value back unchanged.
    ///
    /// An unset key is probed with an empty write followed by a delete, so it
    /// reads back as unset afterwards. Does not touch the cached flag.
    pub fn can_write(&self) -> bool {
        let result = self.settings.get(&self.key).and_then(|current| match current {
            Some(value) => self.settings.put(&self.key, &value),
            None => self
                .settings
                .put(&self.key, "")
                .and_then(|()| self.settings.delete(&self.key)),
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Write probe on {} failed: {e}", self.key);
                false
            }
        }
    }

    /// Re-run the probe and cache its outcome.
    pub fn probe(&self) -> bool {
        let ok = self.can_write();
        self.privileged.store(ok, Ordering::SeqCst);
        ok
    }

    /// Cached outcome of the last probe or write.
    pub fn is_privileged(&self) -> bool {
        self.privileged.load(Ordering::SeqCst)
    }
}

// ---- Shell back end ----

/// `settings get|put|delete secure <key>` through the system shell.
pub struct ShellSettings {
    executor: Arc<dyn CommandExecutor>,
}

impl ShellSettings {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn run(&self, args: &[&str]) -> Result<String, AppError> {
        let output = self
            .executor
            .execute("settings", &args_to_strings(args))
            .map_err(|e| AppError::Write(format!("settings command failed: {e}")))?;
        if output.success {
            return Ok(output.stdout);
        }
        let stderr = output.stderr.trim().to_string();
        if is_permission_failure(&stderr) {
            Err(AppError::PermissionDenied(stderr))
        } else {
            Err(AppError::Write(format!(
                "settings {} exited with {:?}: {stderr}",
                args.first().copied().unwrap_or_default(),
                output.code
            )))
        }
    }
}

fn is_permission_failure(stderr: &str) -> bool {
    stderr.contains("SecurityException")
        || stderr.contains("Permission Denial")
        || stderr.contains("WRITE_SECURE_SETTINGS")
}

impl SecureSettings for ShellSettings {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let stdout = self.run(&["get", "secure", key])?;
        let value = stdout.trim_end_matches(['\r', '\n']);
        if value == "null" {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.run(&["put", "secure", key, value]).map(|_| ())
    }

    fn delete(&self, key: &str) -> Result<(), AppError> {
        self.run(&["delete", "secure", key]).map(|_| ())
    }
}

// ---- In-memory back end ----

/// Process-local settings store for tests and builds without the privilege.
///
/// Records every attempted `put` payload, and can be told to reject writes
/// as denied or failed.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
    put_log: Mutex<Vec<String>>,
    deny_writes: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let settings = Self::default();
        settings
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        settings
    }

    /// Make subsequent writes fail with `PermissionDenied`.
    pub fn set_deny_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with `Write`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    /// Every payload passed to `put`, oldest first.
    pub fn put_log(&self) -> Vec<String> {
        self.put_log.lock().unwrap().clone()
    }

    pub fn put_count(&self) -> usize {
        self.put_log.lock().unwrap().len()
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.deny_writes.load(Ordering::SeqCst) {
            return Err(AppError::PermissionDenied(
                "WRITE_SECURE_SETTINGS not granted".into(),
            ));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Write("settings provider unavailable".into()));
        }
        Ok(())
    }
}

impl SecureSettings for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.value(key))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.put_log.lock().unwrap().push(value.to_string());
        self.check_writable()?;
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AppError> {
        self.check_writable()?;
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}
