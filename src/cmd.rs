//! Shell command execution behind a trait, so platform back ends can be
//! exercised in tests without touching the device.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

#[cfg(test)]
use mockall::automock;

use crate::config;

/// Captured result of one command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code 0.
    pub success: bool,
    pub code: Option<i32>,
}

/// Runs a system command. Injected into the settings and network back ends.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute `cmd` with `args`. `Err` when the process could not be spawned
    /// or did not exit in time.
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Executor that spawns real processes and kills any that overrun `timeout`.
#[derive(Debug, Clone)]
pub struct RealCommandExecutor {
    timeout: Duration,
}

impl RealCommandExecutor {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::with_timeout(config::command_timeout())
    }
}

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                bail!("`{cmd}` did not exit within {:?}, killed", self.timeout);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&collect(stdout)).to_string(),
            stderr: String::from_utf8_lossy(&collect(stderr)).to_string(),
            success: status.success(),
            code: status.code(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn collect(reader: JoinHandle<Vec<u8>>) -> Vec<u8> {
    reader.join().unwrap_or_default()
}

/// mockall cannot express `&[&str]` lifetimes, so the trait takes owned strings.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
