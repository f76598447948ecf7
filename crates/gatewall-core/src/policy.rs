//! Policy configuration loading and validation
//!
//! The settings collaborator hands us a raw key/value document; this module
//! turns it into an immutable, validated `PolicyConfig` snapshot. Loading
//! never fails: every malformed or insecure field falls back to a documented
//! default and produces a human-readable warning instead.

use std::fmt;

use serde::Deserialize;
use tracing::{error, warn};

use crate::secret::SecretString;

/// Passphrases still carrying this marker came straight out of a shipped
/// example config and must not be trusted.
pub const PLACEHOLDER_MARKER: &str = "change_to";

/// Floor for the proxy session expiry window.
pub const MIN_SESSION_EXPIRY_SECS: u64 = 60;

const DEFAULT_SESSION_EXPIRY_SECS: i64 = 600;
const DEFAULT_KICK_MESSAGE: &str = "&cPlease connect using the official domain";

/// Available security modes.
///
/// The mode drives load-time consistency diagnostics only; per-attempt
/// evaluation is gated by the individual `*_enabled` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    WhitelistOnly,
    ProxyProtected,
    Hybrid,
    HostnameOnly,
}

impl SecurityMode {
    /// Parse the configured mode string, tolerant of case and whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "WHITELIST_ONLY" => Some(Self::WhitelistOnly),
            "PROXY_PROTECTED" => Some(Self::ProxyProtected),
            "HYBRID" => Some(Self::Hybrid),
            "HOSTNAME_ONLY" => Some(Self::HostnameOnly),
            _ => None,
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WhitelistOnly => write!(f, "WHITELIST_ONLY"),
            Self::ProxyProtected => write!(f, "PROXY_PROTECTED"),
            Self::Hybrid => write!(f, "HYBRID"),
            Self::HostnameOnly => write!(f, "HOSTNAME_ONLY"),
        }
    }
}

/// Raw settings document, one-to-one with the external configuration
/// contract. Unknown fields are ignored; missing fields take defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawPolicy {
    pub security_mode: String,
    pub whitelist: RawWhitelist,
    pub proxy_protection: RawProxyProtection,
    pub hostname: RawHostname,
    pub logging: RawLogging,
}

impl Default for RawPolicy {
    fn default() -> Self {
        Self {
            security_mode: "WHITELIST_ONLY".to_string(),
            whitelist: RawWhitelist::default(),
            proxy_protection: RawProxyProtection::default(),
            hostname: RawHostname::default(),
            logging: RawLogging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawWhitelist {
    pub enabled: bool,
    pub ips: Vec<String>,
}

impl Default for RawWhitelist {
    fn default() -> Self {
        Self {
            enabled: true,
            ips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawProxyProtection {
    pub enabled: bool,
    pub passphrase: String,
    pub session_expiry_seconds: i64,
}

impl Default for RawProxyProtection {
    fn default() -> Self {
        Self {
            enabled: false,
            passphrase: String::new(),
            session_expiry_seconds: DEFAULT_SESSION_EXPIRY_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawHostname {
    pub enabled: bool,
    pub allowed_hostnames: Vec<String>,
    pub use_reverse_dns: bool,
    pub server_public_ip: String,
    pub kick_message: String,
}

impl Default for RawHostname {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_hostnames: Vec::new(),
            use_reverse_dns: true,
            server_public_ip: String::new(),
            kick_message: DEFAULT_KICK_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawLogging {
    pub log_blocked_connections: bool,
    pub log_allowed_connections: bool,
    pub log_hostname_details: bool,
}

impl Default for RawLogging {
    fn default() -> Self {
        Self {
            log_blocked_connections: true,
            log_allowed_connections: false,
            log_hostname_details: true,
        }
    }
}

/// Everything the loader corrected or found suspicious.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyWarning {
    /// Unknown `security-mode` string, fell back to WHITELIST_ONLY.
    InvalidSecurityMode { given: String },
    /// Passphrase empty or still the shipped placeholder; proxy protection
    /// was forced off.
    InsecurePassphrase,
    /// Session expiry below the floor, clamped up.
    SessionExpiryClamped { given: i64 },
    /// Whitelist enabled with no addresses configured.
    WhitelistEmpty,
    /// Hostname protection enabled with no allowed patterns.
    NoHostnamePatterns,
    /// Hostname protection enabled but no public address configured.
    NoServerPublicAddress,
    /// Mode is PROXY_PROTECTED but proxy protection is disabled.
    ModeRequiresProxyProtection,
    /// Mode is HOSTNAME_ONLY but hostname protection is disabled.
    ModeRequiresHostnameProtection,
    /// Mode is HYBRID but whitelist or proxy protection is disabled.
    ModeRequiresBothProtections,
}

impl PolicyWarning {
    /// Insecure credentials warrant a louder log level than plain
    /// misconfiguration.
    pub fn severe(&self) -> bool {
        matches!(self, Self::InsecurePassphrase)
    }
}

impl fmt::Display for PolicyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSecurityMode { given } => {
                write!(f, "Invalid security-mode: {given} -> fallback to WHITELIST_ONLY")
            }
            Self::InsecurePassphrase => write!(
                f,
                "Proxy passphrase is empty or still default! Proxy protection is NOT secure and has been disabled."
            ),
            Self::SessionExpiryClamped { given } => write!(
                f,
                "session-expiry-seconds {given} is below the floor, clamped to {MIN_SESSION_EXPIRY_SECS}"
            ),
            Self::WhitelistEmpty => {
                write!(f, "Whitelist is enabled but contains no addresses.")
            }
            Self::NoHostnamePatterns => write!(
                f,
                "Hostname protection enabled but no allowed hostnames are defined."
            ),
            Self::NoServerPublicAddress => write!(
                f,
                "server-public-ip is not set while hostname protection is enabled."
            ),
            Self::ModeRequiresProxyProtection => {
                write!(f, "Mode is PROXY_PROTECTED but proxy-protection is disabled.")
            }
            Self::ModeRequiresHostnameProtection => {
                write!(f, "Mode is HOSTNAME_ONLY but hostname protection is disabled.")
            }
            Self::ModeRequiresBothProtections => {
                write!(f, "Mode is HYBRID but one or more protections are disabled.")
            }
        }
    }
}

/// Immutable, validated snapshot of all security settings for one
/// admission cycle. Produced once per (re)load and replaced wholesale.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub security_mode: SecurityMode,

    pub whitelist_enabled: bool,
    pub whitelisted_addresses: Vec<String>,

    pub proxy_protection_enabled: bool,
    pub passphrase: SecretString,
    pub session_expiry_seconds: u64,

    pub hostname_enabled: bool,
    pub allowed_hostname_patterns: Vec<String>,
    pub use_reverse_dns: bool,
    pub server_public_address: String,
    pub kick_message: String,

    pub log_blocked: bool,
    pub log_allowed: bool,
    pub log_hostname_detail: bool,
}

impl PolicyConfig {
    /// Validate a raw settings document. Never fails; corrections and
    /// suspicious fields come back as warnings for the caller to surface.
    pub fn from_raw(raw: RawPolicy) -> (Self, Vec<PolicyWarning>) {
        let mut warnings = Vec::new();

        let security_mode = match SecurityMode::parse(&raw.security_mode) {
            Some(mode) => mode,
            None => {
                warnings.push(PolicyWarning::InvalidSecurityMode {
                    given: raw.security_mode.trim().to_uppercase(),
                });
                SecurityMode::WhitelistOnly
            }
        };

        let passphrase = raw.proxy_protection.passphrase.trim().to_string();
        let mut proxy_protection_enabled = raw.proxy_protection.enabled;
        if proxy_protection_enabled
            && (passphrase.is_empty() || passphrase.contains(PLACEHOLDER_MARKER))
        {
            warnings.push(PolicyWarning::InsecurePassphrase);
            proxy_protection_enabled = false;
        }

        let raw_expiry = raw.proxy_protection.session_expiry_seconds;
        let session_expiry_seconds = if raw_expiry < MIN_SESSION_EXPIRY_SECS as i64 {
            warnings.push(PolicyWarning::SessionExpiryClamped { given: raw_expiry });
            MIN_SESSION_EXPIRY_SECS
        } else {
            raw_expiry as u64
        };

        let whitelist_enabled = raw.whitelist.enabled;
        if whitelist_enabled && raw.whitelist.ips.is_empty() {
            warnings.push(PolicyWarning::WhitelistEmpty);
        }

        let hostname_enabled = raw.hostname.enabled;
        if hostname_enabled {
            if raw.hostname.allowed_hostnames.is_empty() {
                warnings.push(PolicyWarning::NoHostnamePatterns);
            }
            if raw.hostname.server_public_ip.trim().is_empty() {
                warnings.push(PolicyWarning::NoServerPublicAddress);
            }
        }

        // Mode consistency checks run against the corrected flags
        match security_mode {
            SecurityMode::ProxyProtected if !proxy_protection_enabled => {
                warnings.push(PolicyWarning::ModeRequiresProxyProtection);
            }
            SecurityMode::HostnameOnly if !hostname_enabled => {
                warnings.push(PolicyWarning::ModeRequiresHostnameProtection);
            }
            SecurityMode::Hybrid if !whitelist_enabled || !proxy_protection_enabled => {
                warnings.push(PolicyWarning::ModeRequiresBothProtections);
            }
            _ => {}
        }

        let config = Self {
            security_mode,
            whitelist_enabled,
            whitelisted_addresses: raw.whitelist.ips,
            proxy_protection_enabled,
            passphrase: SecretString::new(passphrase),
            session_expiry_seconds,
            hostname_enabled,
            allowed_hostname_patterns: raw.hostname.allowed_hostnames,
            use_reverse_dns: raw.hostname.use_reverse_dns,
            server_public_address: raw.hostname.server_public_ip.trim().to_string(),
            kick_message: translate_color_codes(&raw.hostname.kick_message),
            log_blocked: raw.logging.log_blocked_connections,
            log_allowed: raw.logging.log_allowed_connections,
            log_hostname_detail: raw.logging.log_hostname_details,
        };

        (config, warnings)
    }

    /// Convenience wrapper: validate and emit every warning through the
    /// log, severe ones at error level.
    pub fn load(raw: RawPolicy) -> Self {
        let (config, warnings) = Self::from_raw(raw);
        for warning in &warnings {
            if warning.severe() {
                error!("{warning}");
            } else {
                warn!("{warning}");
            }
        }
        config
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let (config, _) = Self::from_raw(RawPolicy::default());
        config
    }
}

/// Translate `&x` color escapes to the rendered `§x` form, for color codes
/// 0-9, a-f, k-o and r (case-insensitive). Everything else passes through.
pub fn translate_color_codes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '&' {
            if let Some(&next) = chars.peek() {
                if is_color_code(next) {
                    out.push('§');
                    out.push(next.to_ascii_lowercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}

fn is_color_code(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let (config, warnings) = PolicyConfig::from_raw(RawPolicy::default());

        assert_eq!(config.security_mode, SecurityMode::WhitelistOnly);
        assert!(config.whitelist_enabled);
        assert!(config.whitelisted_addresses.is_empty());
        assert!(!config.proxy_protection_enabled);
        assert_eq!(config.session_expiry_seconds, 600);
        assert!(!config.hostname_enabled);
        assert!(config.use_reverse_dns);
        assert!(config.log_blocked);
        assert!(!config.log_allowed);
        assert!(config.log_hostname_detail);

        // Whitelist on with no entries is suspicious, but only a warning
        assert_eq!(warnings, vec![PolicyWarning::WhitelistEmpty]);
    }

    #[test]
    fn unknown_mode_falls_back_with_warning() {
        let raw = RawPolicy {
            security_mode: "  fortress_mode  ".to_string(),
            ..RawPolicy::default()
        };
        let (config, warnings) = PolicyConfig::from_raw(raw);

        assert_eq!(config.security_mode, SecurityMode::WhitelistOnly);
        assert!(warnings.contains(&PolicyWarning::InvalidSecurityMode {
            given: "FORTRESS_MODE".to_string()
        }));
    }

    #[test]
    fn mode_parsing_is_case_and_whitespace_tolerant() {
        assert_eq!(SecurityMode::parse(" hybrid "), Some(SecurityMode::Hybrid));
        assert_eq!(
            SecurityMode::parse("hostname_only"),
            Some(SecurityMode::HostnameOnly)
        );
        assert_eq!(SecurityMode::parse("nope"), None);
    }

    #[test]
    fn placeholder_passphrase_disables_proxy_protection() {
        let raw = RawPolicy {
            proxy_protection: RawProxyProtection {
                enabled: true,
                passphrase: "change_to_secret".to_string(),
                session_expiry_seconds: 600,
            },
            ..RawPolicy::default()
        };
        let (config, warnings) = PolicyConfig::from_raw(raw);

        assert!(!config.proxy_protection_enabled);
        assert!(warnings.contains(&PolicyWarning::InsecurePassphrase));
        assert!(warnings.iter().any(|w| w.severe()));
    }

    #[test]
    fn empty_passphrase_disables_proxy_protection() {
        let raw = RawPolicy {
            proxy_protection: RawProxyProtection {
                enabled: true,
                passphrase: "   ".to_string(),
                session_expiry_seconds: 600,
            },
            ..RawPolicy::default()
        };
        let (config, warnings) = PolicyConfig::from_raw(raw);

        assert!(!config.proxy_protection_enabled);
        assert!(warnings.contains(&PolicyWarning::InsecurePassphrase));
    }

    #[test]
    fn healthy_passphrase_keeps_proxy_protection_on() {
        let raw = RawPolicy {
            proxy_protection: RawProxyProtection {
                enabled: true,
                passphrase: "relay-shared-secret".to_string(),
                session_expiry_seconds: 900,
            },
            ..RawPolicy::default()
        };
        let (config, _) = PolicyConfig::from_raw(raw);

        assert!(config.proxy_protection_enabled);
        assert_eq!(config.passphrase.expose(), "relay-shared-secret");
        assert_eq!(config.session_expiry_seconds, 900);
    }

    #[test]
    fn session_expiry_is_floor_clamped() {
        let raw = RawPolicy {
            proxy_protection: RawProxyProtection {
                enabled: false,
                passphrase: String::new(),
                session_expiry_seconds: 5,
            },
            ..RawPolicy::default()
        };
        let (config, warnings) = PolicyConfig::from_raw(raw);

        assert_eq!(config.session_expiry_seconds, MIN_SESSION_EXPIRY_SECS);
        assert!(warnings.contains(&PolicyWarning::SessionExpiryClamped { given: 5 }));

        let raw = RawPolicy {
            proxy_protection: RawProxyProtection {
                session_expiry_seconds: -1,
                ..RawProxyProtection::default()
            },
            ..RawPolicy::default()
        };
        let (config, _) = PolicyConfig::from_raw(raw);
        assert_eq!(config.session_expiry_seconds, MIN_SESSION_EXPIRY_SECS);
    }

    #[test]
    fn mode_consistency_warnings() {
        let raw = RawPolicy {
            security_mode: "PROXY_PROTECTED".to_string(),
            ..RawPolicy::default()
        };
        let (_, warnings) = PolicyConfig::from_raw(raw);
        assert!(warnings.contains(&PolicyWarning::ModeRequiresProxyProtection));

        let raw = RawPolicy {
            security_mode: "HOSTNAME_ONLY".to_string(),
            ..RawPolicy::default()
        };
        let (_, warnings) = PolicyConfig::from_raw(raw);
        assert!(warnings.contains(&PolicyWarning::ModeRequiresHostnameProtection));

        let raw = RawPolicy {
            security_mode: "HYBRID".to_string(),
            ..RawPolicy::default()
        };
        let (_, warnings) = PolicyConfig::from_raw(raw);
        assert!(warnings.contains(&PolicyWarning::ModeRequiresBothProtections));
    }

    #[test]
    fn hostname_section_warnings() {
        let raw = RawPolicy {
            hostname: RawHostname {
                enabled: true,
                ..RawHostname::default()
            },
            ..RawPolicy::default()
        };
        let (_, warnings) = PolicyConfig::from_raw(raw);

        assert!(warnings.contains(&PolicyWarning::NoHostnamePatterns));
        assert!(warnings.contains(&PolicyWarning::NoServerPublicAddress));
    }

    #[test]
    fn kick_message_color_codes_are_rendered_at_load() {
        let raw = RawPolicy {
            hostname: RawHostname {
                kick_message: "&cPlease connect via &6play.example.com".to_string(),
                ..RawHostname::default()
            },
            ..RawPolicy::default()
        };
        let (config, _) = PolicyConfig::from_raw(raw);

        assert_eq!(
            config.kick_message,
            "§cPlease connect via §6play.example.com"
        );
    }

    #[test]
    fn color_translation_leaves_non_codes_alone() {
        assert_eq!(translate_color_codes("fish & chips"), "fish & chips");
        assert_eq!(translate_color_codes("&zno-code"), "&zno-code");
        assert_eq!(translate_color_codes("trailing &"), "trailing &");
        assert_eq!(translate_color_codes("&C&Lloud"), "§c§lloud");
    }

    #[test]
    fn raw_policy_deserializes_from_the_external_document() {
        let doc = r#"{
            "security-mode": "hostname_only",
            "whitelist": { "enabled": false, "ips": ["10.0.0.1"] },
            "proxy-protection": {
                "enabled": true,
                "passphrase": "relay-shared-secret",
                "session-expiry-seconds": 300
            },
            "hostname": {
                "enabled": true,
                "allowed-hostnames": ["*.example.com"],
                "use-reverse-dns": true,
                "server-public-ip": "203.0.113.7",
                "kick-message": "&cUse the official domain"
            },
            "logging": { "log-allowed-connections": true }
        }"#;

        let raw: RawPolicy = serde_json::from_str(doc).expect("deserialize");
        let (config, warnings) = PolicyConfig::from_raw(raw);

        assert_eq!(config.security_mode, SecurityMode::HostnameOnly);
        assert!(!config.whitelist_enabled);
        assert!(config.proxy_protection_enabled);
        assert_eq!(config.session_expiry_seconds, 300);
        assert_eq!(config.allowed_hostname_patterns, vec!["*.example.com"]);
        assert_eq!(config.server_public_address, "203.0.113.7");
        assert_eq!(config.kick_message, "§cUse the official domain");
        assert!(config.log_allowed);
        assert!(warnings.is_empty());
    }

    #[test]
    fn missing_sections_take_defaults() {
        let raw: RawPolicy = serde_json::from_str("{}").expect("deserialize");
        let (config, _) = PolicyConfig::from_raw(raw);
        assert_eq!(config.security_mode, SecurityMode::WhitelistOnly);
        assert_eq!(config.kick_message, translate_color_codes(DEFAULT_KICK_MESSAGE));
    }
}
