//! Live connectivity facts sampled on demand.
//!
//! The observer never mutates state and never fails outward: every read error
//! or missing permission resolves to a documented fallback (`false` for WiFi,
//! [`NetworkClass::Other`] for the cellular class).

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sysinfo::Networks;

use crate::cmd::{args_to_strings, CommandExecutor};
use crate::config;
use crate::error::AppError;

/// Cellular generation buckets the Data policy can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NetworkClass {
    #[serde(rename = "CLASS_5G")]
    Class5G,
    #[serde(rename = "CLASS_4G")]
    Class4G,
    #[serde(rename = "CLASS_3G")]
    Class3G,
    #[serde(rename = "CLASS_OTHER")]
    Other,
}

impl NetworkClass {
    pub const ALL: [NetworkClass; 4] = [
        NetworkClass::Class5G,
        NetworkClass::Class4G,
        NetworkClass::Class3G,
        NetworkClass::Other,
    ];

    /// Classify a radio-technology name as reported by the telephony stack
    /// (`NR`, `LTE`, `HSPA+`, `UMTS`, ...).
    pub fn from_radio_technology(name: &str) -> Self {
        let normalized = name.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "NR" | "NR_SA" | "NR_NSA" => NetworkClass::Class5G,
            // HSPA+ is reported alongside LTE as 4G.
            "LTE" | "LTE_CA" | "HSPA+" | "HSPAP" => NetworkClass::Class4G,
            "HSDPA" | "HSUPA" | "HSPA" | "UMTS" | "TD_SCDMA" => NetworkClass::Class3G,
            _ => NetworkClass::Other,
        }
    }
}

/// Read-only source of live network facts.
pub trait NetworkObserver: Send + Sync {
    /// Whether the active transport is WiFi. `false` on any failure.
    fn sample_wifi_connected(&self) -> bool;

    /// Generation of the active cellular network. [`NetworkClass::Other`] when
    /// on WiFi, without read permission, or on any failure.
    fn sample_cellular_class(&self) -> NetworkClass;
}

/// Whether an interface name belongs to a wireless LAN adapter.
pub fn is_wifi_interface(name: &str) -> bool {
    name.starts_with("wlan") || name.starts_with("wlp") || name.starts_with("wifi")
}

/// Current state of one network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceLink {
    pub name: String,
    /// Contents of `/sys/class/net/<name>/operstate`, when readable.
    pub operstate: Option<String>,
    pub addresses: Vec<IpAddr>,
}

impl InterfaceLink {
    /// Up and holding a routable address. Link-local addresses survive a
    /// disassociation on some drivers, so they do not count.
    pub fn is_connected(&self) -> bool {
        let up = self
            .operstate
            .as_deref()
            .map_or(true, |state| state.trim() == "up");
        up && self.addresses.iter().any(is_routable)
    }
}

fn is_routable(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified(),
        IpAddr::V6(v6) => {
            !v6.is_loopback() && !v6.is_unspecified() && (v6.segments()[0] & 0xffc0) != 0xfe80
        }
    }
}

/// WiFi is the active transport while a wireless interface is connected.
pub fn wifi_active<'a>(links: impl IntoIterator<Item = &'a InterfaceLink>) -> bool {
    links
        .into_iter()
        .any(|link| is_wifi_interface(&link.name) && link.is_connected())
}

/// Snapshot the interface table from `sysinfo`, adding the kernel's
/// operational state where sysfs exposes it.
pub fn read_interface_links() -> Result<Vec<InterfaceLink>, AppError> {
    let networks = Networks::new_with_refreshed_list();
    if networks.list().is_empty() {
        return Err(AppError::ObserverUnavailable(
            "no network interfaces visible".into(),
        ));
    }
    Ok(networks
        .list()
        .iter()
        .map(|(name, data)| InterfaceLink {
            name: name.clone(),
            operstate: std::fs::read_to_string(
                Path::new(config::SYSFS_NET_DIR).join(name).join("operstate"),
            )
            .ok(),
            addresses: data.ip_networks().iter().map(|net| net.addr).collect(),
        })
        .collect())
}

/// Pick the class of the first SIM slot that reports a known technology.
/// `getprop gsm.network.type` yields one entry per slot, e.g. `LTE,Unknown`.
pub fn classify_network_type_prop(value: &str) -> NetworkClass {
    value
        .split(',')
        .map(NetworkClass::from_radio_technology)
        .find(|class| *class != NetworkClass::Other)
        .unwrap_or(NetworkClass::Other)
}

type LinkReader = fn() -> Result<Vec<InterfaceLink>, AppError>;

/// Observer backed by the interface table (`sysinfo`) and the telephony
/// system properties (`getprop`).
pub struct SystemNetworkObserver {
    executor: Arc<dyn CommandExecutor>,
    read_links: LinkReader,
}

impl SystemNetworkObserver {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::with_link_reader(executor, read_interface_links)
    }

    pub fn with_link_reader(executor: Arc<dyn CommandExecutor>, read_links: LinkReader) -> Self {
        Self {
            executor,
            read_links,
        }
    }

    fn try_wifi_connected(&self) -> Result<bool, AppError> {
        let links = (self.read_links)()?;
        Ok(wifi_active(&links))
    }

    fn try_cellular_class(&self) -> Result<NetworkClass, AppError> {
        let output = self
            .executor
            .execute("getprop", &args_to_strings(&["gsm.network.type"]))
            .map_err(|e| AppError::ObserverUnavailable(e.to_string()))?;
        if !output.success {
            return Err(AppError::ObserverUnavailable(format!(
                "getprop exited with {:?}: {}",
                output.code,
                output.stderr.trim()
            )));
        }
        Ok(classify_network_type_prop(&output.stdout))
    }
}

impl NetworkObserver for SystemNetworkObserver {
    fn sample_wifi_connected(&self) -> bool {
        self.try_wifi_connected().unwrap_or_else(|e| {
            tracing::debug!("WiFi sample unavailable, assuming disconnected: {e}");
            false
        })
    }

    fn sample_cellular_class(&self) -> NetworkClass {
        if self.sample_wifi_connected() {
            return NetworkClass::Other;
        }
        self.try_cellular_class().unwrap_or_else(|e| {
            tracing::debug!("Cellular sample unavailable, assuming OTHER: {e}");
            NetworkClass::Other
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{CommandOutput, MockCommandExecutor};

    #[test]
    fn test_radio_technology_classification() {
        assert_eq!(NetworkClass::from_radio_technology("NR"), NetworkClass::Class5G);
        assert_eq!(NetworkClass::from_radio_technology("LTE"), NetworkClass::Class4G);
        assert_eq!(NetworkClass::from_radio_technology("lte_ca"), NetworkClass::Class4G);
        assert_eq!(NetworkClass::from_radio_technology("HSPA+"), NetworkClass::Class4G);
        assert_eq!(NetworkClass::from_radio_technology("UMTS"), NetworkClass::Class3G);
        assert_eq!(NetworkClass::from_radio_technology("TD-SCDMA"), NetworkClass::Class3G);
        assert_eq!(NetworkClass::from_radio_technology("EDGE"), NetworkClass::Other);
        assert_eq!(NetworkClass::from_radio_technology(""), NetworkClass::Other);
    }

    #[test]
    fn test_network_type_prop_uses_first_known_slot() {
        assert_eq!(classify_network_type_prop("Unknown,NR\n"), NetworkClass::Class5G);
        assert_eq!(classify_network_type_prop("LTE,Unknown"), NetworkClass::Class4G);
        assert_eq!(classify_network_type_prop("Unknown,Unknown"), NetworkClass::Other);
    }

    #[test]
    fn test_network_class_serializes_with_class_prefix() {
        let json = serde_json::to_string(&NetworkClass::Class5G).unwrap();
        assert_eq!(json, "\"CLASS_5G\"");
        let back: NetworkClass = serde_json::from_str("\"CLASS_OTHER\"").unwrap();
        assert_eq!(back, NetworkClass::Other);
    }

    fn link(name: &str, operstate: Option<&str>, addresses: &[&str]) -> InterfaceLink {
        InterfaceLink {
            name: name.to_string(),
            operstate: operstate.map(|s| format!("{s}\n")),
            addresses: addresses.iter().map(|a| a.parse::<IpAddr>().unwrap()).collect(),
        }
    }

    fn wlan_up() -> Result<Vec<InterfaceLink>, AppError> {
        Ok(vec![
            link("rmnet0", Some("up"), &["10.20.0.7"]),
            link("wlan0", Some("up"), &["192.168.1.23", "fe80::1"]),
        ])
    }

    fn wlan_down() -> Result<Vec<InterfaceLink>, AppError> {
        Ok(vec![
            link("rmnet0", Some("up"), &["10.20.0.7"]),
            link("wlan0", Some("down"), &[]),
        ])
    }

    fn no_interfaces() -> Result<Vec<InterfaceLink>, AppError> {
        Err(AppError::ObserverUnavailable("no network interfaces visible".into()))
    }

    fn getprop_returning(stdout: &'static str) -> MockCommandExecutor {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(move |_, _| {
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                success: true,
                code: Some(0),
            })
        });
        mock
    }

    #[test]
    fn test_wifi_active_requires_connected_wireless_interface() {
        assert!(wifi_active(&wlan_up().unwrap()));
        assert!(!wifi_active(&wlan_down().unwrap()));
        assert!(!wifi_active(&[link("eth0", Some("up"), &["192.168.1.5"])]));
        assert!(!wifi_active(&Vec::<InterfaceLink>::new()));
    }

    #[test]
    fn test_disassociated_wifi_is_not_connected() {
        // Still administratively present, only a link-local address left.
        assert!(!link("wlan0", Some("dormant"), &["192.168.1.23"]).is_connected());
        assert!(!link("wlan0", Some("up"), &["fe80::a00:27ff:fe4e:66a1"]).is_connected());
        assert!(!link("wlan0", Some("up"), &["169.254.10.2"]).is_connected());
        assert!(!link("wlan0", None, &[]).is_connected());
    }

    #[test]
    fn test_missing_operstate_falls_back_to_addresses() {
        assert!(link("wlan0", None, &["2001:db8::5"]).is_connected());
    }

    #[test]
    fn test_wifi_sample_follows_link_state() {
        let idle = || Arc::new(MockCommandExecutor::new());
        assert!(SystemNetworkObserver::with_link_reader(idle(), wlan_up).sample_wifi_connected());
        assert!(!SystemNetworkObserver::with_link_reader(idle(), wlan_down).sample_wifi_connected());
    }

    #[test]
    fn test_unreadable_interfaces_assume_disconnected() {
        let mock = MockCommandExecutor::new();
        let observer = SystemNetworkObserver::with_link_reader(Arc::new(mock), no_interfaces);
        assert!(!observer.sample_wifi_connected());
    }

    #[test]
    fn test_cellular_class_is_other_on_wifi_without_getprop() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().never();
        let observer = SystemNetworkObserver::with_link_reader(Arc::new(mock), wlan_up);
        assert_eq!(observer.sample_cellular_class(), NetworkClass::Other);
    }

    #[test]
    fn test_cellular_class_sampled_after_wifi_disconnects() {
        let mock = getprop_returning("LTE\n");
        let observer = SystemNetworkObserver::with_link_reader(Arc::new(mock), wlan_down);
        assert_eq!(observer.sample_cellular_class(), NetworkClass::Class4G);
    }

    #[test]
    fn test_cellular_class_falls_back_to_other_on_error() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Err(anyhow::anyhow!("getprop did not finish in time")));
        let observer = SystemNetworkObserver::with_link_reader(Arc::new(mock), wlan_down);
        assert_eq!(observer.sample_cellular_class(), NetworkClass::Other);
    }

    #[test]
    fn test_failed_getprop_reports_observer_unavailable() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(|_, _| {
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: "permission denied".to_string(),
                success: false,
                code: Some(1),
            })
        });
        let observer = SystemNetworkObserver::new(Arc::new(mock));
        assert_eq!(observer.try_cellular_class().unwrap_err().kind(), "ObserverUnavailable");
    }

    #[test]
    fn test_cellular_class_reads_getprop() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "getprop" && args == ["gsm.network.type".to_string()])
            .returning(|_, _| {
                Ok(CommandOutput {
                    stdout: "NR,Unknown\n".to_string(),
                    stderr: String::new(),
                    success: true,
                    code: Some(0),
                })
            });
        let observer = SystemNetworkObserver::new(Arc::new(mock));
        assert_eq!(observer.try_cellular_class().unwrap(), NetworkClass::Class5G);
    }
}
