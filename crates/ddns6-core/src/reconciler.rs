//! Reconciliation of one discovered address set against DNS
//!
//! Policy, in order:
//!
//! 1. An empty set fails with `EmptyDiscovery`
//! 2. Preferred address equals the last applied one → done, no provider call
//! 3. List the record; none → `RecordNotFound` (records are never created)
//! 4. Parse its content; malformed → `RecordParse`
//! 5. Content already equals the preferred address → done, no update call
//! 6. Otherwise update the record
//!
//! At most one read and one update per invocation.

use crate::address::AddressSet;
use crate::config::RecordConfig;
use crate::error::{Error, Result};
use crate::traits::DnsProvider;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Local cache already matched, provider untouched
    Cached {
        current_ip: IpAddr,
    },
    /// Provider already held the address (local cache was stale)
    AlreadyCurrent {
        current_ip: IpAddr,
    },
    /// Record was updated
    Updated {
        previous_ip: IpAddr,
        new_ip: IpAddr,
    },
}

impl ReconcileOutcome {
    /// The address now known to be published
    pub fn applied(&self) -> IpAddr {
        match self {
            ReconcileOutcome::Cached { current_ip }
            | ReconcileOutcome::AlreadyCurrent { current_ip } => *current_ip,
            ReconcileOutcome::Updated { new_ip, .. } => *new_ip,
        }
    }
}

/// Decides whether a DNS update is needed and issues it
pub struct Reconciler {
    provider: Arc<dyn DnsProvider>,
    zone_id: String,
    record: RecordConfig,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn DnsProvider>, zone_id: impl Into<String>, record: RecordConfig) -> Self {
        Self {
            provider,
            zone_id: zone_id.into(),
            record,
        }
    }

    pub fn record(&self) -> &RecordConfig {
        &self.record
    }

    /// Reconcile `discovered` against `last_applied` and the provider
    ///
    /// On error the caller's `last_applied` stays as it was.
    pub async fn reconcile(
        &self,
        discovered: &AddressSet,
        last_applied: Option<IpAddr>,
    ) -> Result<ReconcileOutcome> {
        let preferred = discovered.preferred().ok_or(Error::EmptyDiscovery)?.ip();

        if !self.record.family.matches(&preferred) {
            return Err(Error::discovery(format!(
                "Discovered {} but record {} publishes {}",
                preferred, self.record.domain, self.record.family
            )));
        }

        if last_applied == Some(preferred) {
            debug!(
                "Record {} already has IP {} (cached), skipping provider",
                self.record.domain, preferred
            );
            return Ok(ReconcileOutcome::Cached {
                current_ip: preferred,
            });
        }

        let record_type = self.record.record_type();
        let records = self
            .provider
            .list_records(&self.zone_id, &self.record.domain, record_type)
            .await?;

        let existing = records
            .first()
            .ok_or_else(|| Error::record_not_found(&self.record.domain, record_type))?;

        let current_ip: IpAddr = existing
            .content
            .trim()
            .parse()
            .map_err(|e| Error::record_parse(&self.record.domain, &existing.content, e))?;

        if current_ip == preferred {
            debug!(
                "Provider already has {} -> {}, no update needed",
                self.record.domain, preferred
            );
            return Ok(ReconcileOutcome::AlreadyCurrent {
                current_ip: preferred,
            });
        }

        self.provider
            .update_record(&self.zone_id, existing, &preferred.to_string())
            .await?;

        info!(
            "Updated {} -> {} (previous: {})",
            self.record.domain, preferred, current_ip
        );
        Ok(ReconcileOutcome::Updated {
            previous_ip: current_ip,
            new_ip: preferred,
        })
    }
}
