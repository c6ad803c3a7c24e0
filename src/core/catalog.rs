//! Immutable table of logical status-bar indicators.
//!
//! Each [`LogicalIndicator`] maps to one or more raw blacklist tokens, since
//! different ROMs and OEM builds name the same icon differently. The catalog
//! is built once at startup and shared by reference (`Arc`) afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::error::AppError;

/// Indicator id -> visible flag.
pub type VisibilityMap = BTreeMap<String, bool>;

pub const CAT_CONNECTIVITY: &str = "Connectivity";
pub const CAT_PHONE_NETWORK: &str = "Phone & Network";
pub const CAT_AUDIO_MEDIA: &str = "Audio & Media";
pub const CAT_SYSTEM_STATUS: &str = "System Status";
pub const CAT_OEM_SPECIFIC: &str = "OEM Specific";

/// Extra keywords every indicator answers to in catalog search.
const SEARCH_KEYWORDS: [&str; 3] = ["hide", "show", "visibility"];

/// A user-facing indicator and every raw token it can appear as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalIndicator {
    pub id: String,
    pub display_name: String,
    pub raw_tokens: BTreeSet<String>,
    pub default_visible: bool,
    pub category: String,
}

impl LogicalIndicator {
    pub fn new(id: &str, display_name: &str, raw_tokens: &[&str], category: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            raw_tokens: raw_tokens.iter().map(|t| t.to_string()).collect(),
            default_visible: true,
            category: category.to_string(),
        }
    }

    /// Mark the indicator as hidden unless the user shows it explicitly.
    pub fn hidden_by_default(mut self) -> Self {
        self.default_visible = false;
        self
    }

    /// Effective visibility under `visibility`, falling back to the default.
    pub fn resolve(&self, visibility: &VisibilityMap) -> bool {
        visibility
            .get(&self.id)
            .copied()
            .unwrap_or(self.default_visible)
    }

    fn matches(&self, query: &str) -> bool {
        self.display_name.to_lowercase().contains(query)
            || self.category.to_lowercase().contains(query)
            || self.raw_tokens.iter().any(|t| t.to_lowercase().contains(query))
            || SEARCH_KEYWORDS.iter().any(|k| k.contains(query))
    }
}

/// Ordered, immutable indicator table with forward and reverse indexes.
#[derive(Debug, Clone)]
pub struct IndicatorCatalog {
    indicators: Vec<LogicalIndicator>,
    by_id: HashMap<String, usize>,
    by_token: HashMap<String, usize>,
}

impl IndicatorCatalog {
    /// Build a catalog, rejecting duplicate ids and empty token sets.
    ///
    /// A token shared by two indicators resolves to the first one registered
    /// in reverse lookups.
    pub fn new(indicators: Vec<LogicalIndicator>) -> Result<Self, AppError> {
        let mut by_id = HashMap::with_capacity(indicators.len());
        let mut by_token = HashMap::new();

        for (idx, indicator) in indicators.iter().enumerate() {
            if indicator.raw_tokens.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "indicator '{}' has no raw tokens",
                    indicator.id
                )));
            }
            if by_id.insert(indicator.id.clone(), idx).is_some() {
                return Err(AppError::InvalidInput(format!(
                    "duplicate indicator id '{}'",
                    indicator.id
                )));
            }
            for token in &indicator.raw_tokens {
                if let Some(&owner) = by_token.get(token) {
                    let owner: &LogicalIndicator = &indicators[owner];
                    tracing::warn!(
                        "Token '{token}' of '{}' already owned by '{}'",
                        indicator.id,
                        owner.id
                    );
                    continue;
                }
                by_token.insert(token.clone(), idx);
            }
        }

        Ok(Self {
            indicators,
            by_id,
            by_token,
        })
    }

    /// The built-in table covering stock Android and common OEM variants.
    pub fn builtin() -> Self {
        // The table is static data; a failure here is an authoring bug caught by tests.
        Self::new(builtin_indicators()).unwrap_or_else(|e| panic!("builtin catalog invalid: {e}"))
    }

    pub fn indicators(&self) -> &[LogicalIndicator] {
        &self.indicators
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&LogicalIndicator> {
        self.by_id.get(id).map(|&idx| &self.indicators[idx])
    }

    /// Reverse lookup: the indicator owning `token` (first registered wins).
    pub fn get_by_token(&self, token: &str) -> Option<&LogicalIndicator> {
        self.by_token.get(token).map(|&idx| &self.indicators[idx])
    }

    /// Union of raw tokens over every indicator that resolves to hidden.
    pub fn compile_tokens(&self, visibility: &VisibilityMap) -> BTreeSet<String> {
        self.indicators
            .iter()
            .filter(|indicator| !indicator.resolve(visibility))
            .flat_map(|indicator| indicator.raw_tokens.iter().cloned())
            .collect()
    }

    /// Per-indicator visibility implied by a blacklist: visible iff none of
    /// its tokens is present.
    ///
    /// Exact inverse of [`compile_tokens`](Self::compile_tokens) only when
    /// token sets are pairwise disjoint. With shared tokens, hiding one
    /// indicator also reports its token-siblings as hidden.
    pub fn derive_visibility(&self, blacklist: &BTreeSet<String>) -> VisibilityMap {
        self.indicators
            .iter()
            .map(|indicator| {
                let hidden = indicator.raw_tokens.iter().any(|t| blacklist.contains(t));
                (indicator.id.clone(), !hidden)
            })
            .collect()
    }

    /// Whether no token is shared between two indicators.
    pub fn has_disjoint_tokens(&self) -> bool {
        let total: usize = self.indicators.iter().map(|i| i.raw_tokens.len()).sum();
        total == self.by_token.len()
    }

    /// Category names in first-appearance order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for indicator in &self.indicators {
            if !seen.contains(&indicator.category.as_str()) {
                seen.push(indicator.category.as_str());
            }
        }
        seen
    }

    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a LogicalIndicator> {
        self.indicators.iter().filter(move |i| i.category == category)
    }

    /// Case-insensitive search over names, categories, and tokens.
    /// Display-name prefix matches rank first.
    pub fn search(&self, query: &str) -> Vec<&LogicalIndicator> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<&LogicalIndicator> =
            self.indicators.iter().filter(|i| i.matches(&q)).collect();
        // Stable sort keeps catalog order within each rank.
        hits.sort_by_key(|i| !i.display_name.to_lowercase().starts_with(&q));
        hits
    }
}

fn builtin_indicators() -> Vec<LogicalIndicator> {
    use LogicalIndicator as I;

    vec![
        // --- Connectivity ---
        I::new("wifi", "WiFi", &["wifi", "wifi_oxygen", "wifi_p2p"], CAT_CONNECTIVITY),
        I::new(
            "bluetooth",
            "Bluetooth",
            &["bluetooth", "bluetooth_handsfree_battery", "ble_unlock_mode"],
            CAT_CONNECTIVITY,
        ),
        I::new("nfc", "NFC / Felica", &["nfc", "nfc_on", "nfclock", "felica_lock"], CAT_CONNECTIVITY),
        I::new("vpn", "VPN", &["vpn"], CAT_CONNECTIVITY),
        I::new("airplane_mode", "Airplane Mode", &["airplane", "airplane_mode"], CAT_CONNECTIVITY),
        I::new("hotspot", "Hotspot", &["hotspot", "wifi_ap"], CAT_CONNECTIVITY),
        I::new("cast", "Cast", &["cast"], CAT_CONNECTIVITY),
        // --- Phone & Network ---
        I::new("mobile_data", "Mobile Data", &["mobile", "data_connection"], CAT_PHONE_NETWORK),
        I::new(
            "phone_signal",
            "Phone Signal",
            &["phone_signal", "phone_signal_second_stub", "phone_evdo_signal", "cdma_eri", "wimax"],
            CAT_PHONE_NETWORK,
        ),
        I::new(
            "volte",
            "VoLTE / VoNR",
            &["volte", "ims_volte", "volte_call", "unicom_call"],
            CAT_PHONE_NETWORK,
        ),
        I::new("wifi_calling", "WiFi Calling / VoWiFi", &["wifi_calling", "vowifi"], CAT_PHONE_NETWORK),
        I::new(
            "remote_call",
            "Call Status / Sync",
            &["remote_call", "call_record", "answering_memo", "missed_call"],
            CAT_PHONE_NETWORK,
        ),
        I::new("tty", "TTY", &["tty"], CAT_PHONE_NETWORK),
        // --- Audio & Media ---
        I::new("volume", "Volume", &["volume", "mute", "quiet"], CAT_AUDIO_MEDIA),
        I::new("headset", "Headset", &["headset", "earphone"], CAT_AUDIO_MEDIA).hidden_by_default(),
        I::new("speakerphone", "Speakerphone", &["speakerphone"], CAT_AUDIO_MEDIA),
        I::new("dmb", "DMB", &["dmb"], CAT_AUDIO_MEDIA),
        // --- System Status ---
        I::new("clock", "Clock", &["clock"], CAT_SYSTEM_STATUS),
        I::new("ime", "Input Method (IME)", &["ime"], CAT_SYSTEM_STATUS),
        I::new("alarm", "Alarm", &["alarm", "alarm_clock"], CAT_SYSTEM_STATUS).hidden_by_default(),
        I::new("battery", "Battery", &["battery"], CAT_SYSTEM_STATUS),
        I::new("power_saver", "Power Saving", &["power_saver", "powersavingmode"], CAT_SYSTEM_STATUS),
        I::new("data_saver", "Data Saver", &["data_saver"], CAT_SYSTEM_STATUS),
        I::new("rotate", "Rotation Lock", &["rotate"], CAT_SYSTEM_STATUS).hidden_by_default(),
        I::new("location", "Location / GPS", &["location", "gps", "lbs"], CAT_SYSTEM_STATUS),
        I::new("sync", "Sync", &["sync_active", "sync_failing"], CAT_SYSTEM_STATUS),
        I::new("managed_profile", "Managed Profile", &["managed_profile"], CAT_SYSTEM_STATUS),
        I::new("dnd", "Do Not Disturb", &["do_not_disturb", "dnd", "zen"], CAT_SYSTEM_STATUS),
        I::new(
            "privacy",
            "Privacy & Secure Folder",
            &["privacy_mode", "private_mode", "knox_container"],
            CAT_SYSTEM_STATUS,
        ),
        I::new("secure", "Security Status (SU)", &["secure", "su"], CAT_SYSTEM_STATUS),
        // --- OEM Specific ---
        I::new("otg", "OTG Mouse / Keyboard", &["otg_mouse", "otg_keyboard"], CAT_OEM_SPECIFIC),
        I::new(
            "samsung_smart",
            "Samsung Smart Features",
            &["glove", "gesture", "smart_scroll", "face", "smart_network", "smart_bonding"],
            CAT_OEM_SPECIFIC,
        ),
        I::new(
            "samsung_services",
            "Samsung Services",
            &["wearable_gear", "femtoicon", "com.samsung.rcs", "toddler", "keyguard_wakeup", "safezone"],
            CAT_OEM_SPECIFIC,
        ),
    ]
}
