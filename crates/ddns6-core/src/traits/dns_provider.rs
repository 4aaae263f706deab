// # DNS Provider Trait
//
// Defines the interface for reading and updating a single authoritative DNS
// record via a provider API.
//
// ## Implementations
//
// - Cloudflare: `ddns6-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns6_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> ddns6_core::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let records = provider.list_records("zone-id", "home.example.com", "AAAA").await?;
//     if let Some(record) = records.first() {
//         provider.update_record("zone-id", record, "2001:db8::1").await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A DNS record as held by the provider
///
/// Fetched fresh by each reconciliation attempt and never persisted beyond it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// The record ID (provider-specific)
    pub id: String,
    /// The record name
    pub name: String,
    /// Record type (A or AAAA)
    #[serde(rename = "type")]
    pub record_type: String,
    /// Record content: an address as text
    pub content: String,
    /// Time-to-live, preserved on update
    #[serde(default)]
    pub ttl: Option<u32>,
    /// Provider-specific proxy flag, preserved on update
    #[serde(default)]
    pub proxied: Option<bool>,
}

/// Trait for DNS provider implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure (the retry scheduler handles retry)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff (owned by `RetryScheduler`)
/// - ❌ Decide whether an update is needed (owned by `Reconciler`)
/// - ❌ Create records that do not exist
/// - ❌ Cache state beyond a single request
///
/// ## Error Classification
///
/// - Rejected credentials → `Error::Authentication` (not retried)
/// - Network failures, rate limits, 5xx → `Error::Provider` / `Error::Http` (retried)
///
/// Each method performs exactly one API call.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List records matching `name` and `record_type` in `zone_id`
    ///
    /// An empty vector means the record does not exist; it is not an error at
    /// this layer.
    async fn list_records(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Set `record`'s content to `content`, preserving its other attributes
    async fn update_record(
        &self,
        zone_id: &str,
        record: &DnsRecord,
        content: &str,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
