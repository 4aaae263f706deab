//! Configuration types for ddns6
//!
//! One immutable [`Ddns6Config`] is built at startup and handed to every
//! pipeline. Nothing reads configuration from globals after that point.

use crate::address::AddressFamily;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default STUN server
pub const DEFAULT_STUN_SERVER: &str = "stun.cloudflare.com:3478";

/// Main ddns6 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ddns6Config {
    /// Provider zone identifier holding every managed record
    pub zone_id: String,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Discovery strategy, bound once at startup
    #[serde(default)]
    pub strategy: DiscoveryStrategy,

    /// Records to manage, at most one per address family
    pub records: Vec<RecordConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Ddns6Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.zone_id.trim().is_empty() {
            return Err(crate::Error::config("Zone ID cannot be empty"));
        }

        if self.records.is_empty() {
            return Err(crate::Error::config("No records configured"));
        }

        for (i, record) in self.records.iter().enumerate() {
            record.validate()?;
            if self.records[..i].iter().any(|r| r.family == record.family) {
                return Err(crate::Error::config(format!(
                    "More than one {} record configured",
                    record.family
                )));
            }
        }

        self.provider.validate()?;
        self.strategy.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// DNS provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Perform reads but only log intended updates
        #[serde(default)]
        dry_run: bool,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
        }
    }
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Cloudflare { dry_run, .. } => f
                .debug_struct("Cloudflare")
                .field("api_token", &"<REDACTED>")
                .field("dry_run", dry_run)
                .finish(),
        }
    }
}

/// Address discovery strategy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryStrategy {
    /// Local interface enumeration with egress-probe disambiguation
    Interface {
        #[serde(default)]
        prefix_policy: PrefixPolicy,
    },

    /// Kernel routing table lookup, driven by address-change events (Linux)
    #[default]
    Netlink,

    /// External STUN binding request
    Stun {
        /// STUN server as `host:port`
        #[serde(default = "default_stun_server")]
        server: String,
    },
}

impl DiscoveryStrategy {
    /// Strategy name as used in configuration
    pub fn name(&self) -> &'static str {
        match self {
            DiscoveryStrategy::Interface { .. } => "interface",
            DiscoveryStrategy::Netlink => "netlink",
            DiscoveryStrategy::Stun { .. } => "stun",
        }
    }

    /// Whether pipelines are triggered by change events instead of a timer
    pub fn is_event_driven(&self) -> bool {
        matches!(self, DiscoveryStrategy::Netlink)
    }

    /// Validate the strategy configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DiscoveryStrategy::Stun { server } => {
                if server.rsplit_once(':').is_none_or(|(host, port)| {
                    host.is_empty() || port.parse::<u16>().is_err()
                }) {
                    return Err(crate::Error::config(format!(
                        "STUN server must be host:port, got {:?}",
                        server
                    )));
                }
                Ok(())
            }
            DiscoveryStrategy::Interface { .. } | DiscoveryStrategy::Netlink => Ok(()),
        }
    }
}

/// How interface candidates are narrowed relative to the egress address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrefixPolicy {
    /// Only drop candidates equal to the egress address (it is already first)
    #[default]
    DedupEgress,
    /// Also drop candidates outside the egress address's prefix
    /// (/64 for IPv6, /24 for IPv4)
    SamePrefix,
}

impl std::str::FromStr for PrefixPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dedup-egress" => Ok(PrefixPolicy::DedupEgress),
            "same-prefix" => Ok(PrefixPolicy::SamePrefix),
            other => Err(crate::Error::config(format!(
                "Unknown prefix policy '{}'. Valid: dedup-egress, same-prefix",
                other
            ))),
        }
    }
}

/// DNS record configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// DNS record name (e.g., "home.example.com")
    pub domain: String,

    /// Address family published in this record
    pub family: AddressFamily,
}

impl RecordConfig {
    /// Create a new record configuration
    pub fn new(domain: impl Into<String>, family: AddressFamily) -> Self {
        Self {
            domain: domain.into(),
            family,
        }
    }

    /// Record type derived from the family
    pub fn record_type(&self) -> &'static str {
        self.family.record_type()
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_domain_name(&self.domain)
    }
}

/// Validate that a string is a valid domain name
///
/// This implements basic DNS domain name validation per RFC 1035.
/// It's not comprehensive but catches common errors.
pub fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    if domain.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(crate::Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period between timer-driven cycles (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Deadline for one timer-driven cycle including retries (in seconds)
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// Bound on a single discovery + reconcile attempt (in seconds)
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Delay before the first retry (in seconds)
    #[serde(default = "default_retry_initial_delay_secs")]
    pub retry_initial_delay_secs: u64,

    /// Upper bound on the delay between retries (in seconds)
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,

    /// Pending change wake-ups per event-driven pipeline
    ///
    /// Bursts beyond this are coalesced. Default: 1
    #[serde(default = "default_change_channel_capacity")]
    pub change_channel_capacity: usize,

    /// Capacity of the pipeline event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.cycle_timeout_secs == 0 {
            return Err(crate::Error::config("Cycle timeout must be > 0"));
        }
        if self.attempt_timeout_secs == 0 {
            return Err(crate::Error::config("Attempt timeout must be > 0"));
        }
        if self.retry_initial_delay_secs > self.retry_max_delay_secs {
            return Err(crate::Error::config(
                "Initial retry delay cannot exceed maximum retry delay",
            ));
        }
        if self.change_channel_capacity == 0 || self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Channel capacities must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    /// Retry policy built from these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs(self.retry_initial_delay_secs),
            max_delay: Duration::from_secs(self.retry_max_delay_secs),
            multiplier: 2,
            attempt_timeout: Some(Duration::from_secs(self.attempt_timeout_secs)),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            retry_initial_delay_secs: default_retry_initial_delay_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
            change_channel_capacity: default_change_channel_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_stun_server() -> String {
    DEFAULT_STUN_SERVER.to_string()
}

fn default_poll_interval_secs() -> u64 {
    180
}

fn default_cycle_timeout_secs() -> u64 {
    120
}

fn default_attempt_timeout_secs() -> u64 {
    60
}

fn default_retry_initial_delay_secs() -> u64 {
    3
}

fn default_retry_max_delay_secs() -> u64 {
    300
}

fn default_change_channel_capacity() -> usize {
    1
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Ddns6Config {
        Ddns6Config {
            zone_id: "zone".to_string(),
            provider: ProviderConfig::Cloudflare {
                api_token: "secret-token-value".to_string(),
                dry_run: false,
            },
            strategy: DiscoveryStrategy::Netlink,
            records: vec![RecordConfig::new("home.example.com", AddressFamily::V6)],
            engine: EngineConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_duplicate_family_rejected() {
        let mut cfg = config();
        cfg.records
            .push(RecordConfig::new("other.example.com", AddressFamily::V6));
        assert!(cfg.validate().is_err());

        cfg.records[1].family = AddressFamily::V4;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_domain_validation() {
        assert!(validate_domain_name("home.example.com").is_ok());
        assert!(validate_domain_name("").is_err());
        assert!(validate_domain_name("bad..example.com").is_err());
        assert!(validate_domain_name("-bad.example.com").is_err());
        assert!(validate_domain_name("sp ace.example.com").is_err());
    }

    #[test]
    fn test_stun_server_validation() {
        let ok = DiscoveryStrategy::Stun {
            server: DEFAULT_STUN_SERVER.to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = DiscoveryStrategy::Stun {
            server: "stun.example.com".to_string(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_prefix_policy_parsing() {
        assert_eq!(
            "same-prefix".parse::<PrefixPolicy>().unwrap(),
            PrefixPolicy::SamePrefix
        );
        assert_eq!(
            "dedup-egress".parse::<PrefixPolicy>().unwrap(),
            PrefixPolicy::DedupEgress
        );
        assert!("closest".parse::<PrefixPolicy>().is_err());
    }

    #[test]
    fn test_strategy_deserialization_defaults() {
        let strategy: DiscoveryStrategy =
            serde_json::from_str(r#"{"type":"stun"}"#).unwrap();
        assert_eq!(
            strategy,
            DiscoveryStrategy::Stun {
                server: DEFAULT_STUN_SERVER.to_string()
            }
        );

        let strategy: DiscoveryStrategy =
            serde_json::from_str(r#"{"type":"interface","prefix_policy":"same-prefix"}"#)
                .unwrap();
        assert_eq!(
            strategy,
            DiscoveryStrategy::Interface {
                prefix_policy: PrefixPolicy::SamePrefix
            }
        );
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let debug_str = format!("{:?}", config());
        assert!(!debug_str.contains("secret-token-value"));
        assert!(debug_str.contains("REDACTED"));
    }

    #[test]
    fn test_engine_retry_policy() {
        let policy = EngineConfig::default().retry_policy();
        assert_eq!(policy.initial_delay, Duration::from_secs(3));
        assert_eq!(policy.max_delay, Duration::from_secs(300));
        assert_eq!(policy.attempt_timeout, Some(Duration::from_secs(60)));
    }
}
