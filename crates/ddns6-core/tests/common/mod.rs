//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that verify pipeline behavior
//! without touching the network or the OS.

#![allow(dead_code)]

use ddns6_core::error::{Error, Result};
use ddns6_core::{
    Address, AddressFamily, AddressSet, AddressSource, DnsProvider, DnsRecord, Pipeline,
    PipelineEvent, RecordConfig, Reconciler, RetryPolicy,
};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const ZONE: &str = "zone-123";

/// An AddressSource whose answer the test controls
pub struct ControlledSource {
    /// Addresses returned by discover(), most preferred first
    current: Mutex<Vec<IpAddr>>,
    /// Call counter for discover()
    discover_calls: AtomicUsize,
    /// Remaining discover() calls that fail
    failures: AtomicUsize,
    /// Simulated discovery latency
    delay: Option<Duration>,
}

impl ControlledSource {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            current: Mutex::new(vec![ip]),
            discover_calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_addresses(ips: Vec<IpAddr>) -> Self {
        let source = Self::new(IpAddr::from([0, 0, 0, 0]));
        *source.current.lock().unwrap() = ips;
        source
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change what the next discovery sees
    pub fn set(&self, ip: IpAddr) {
        *self.current.lock().unwrap() = vec![ip];
    }

    /// Make the next `n` discoveries fail
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Get the number of times discover() was called
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressSource for ControlledSource {
    async fn discover(&self, family: AddressFamily) -> Result<AddressSet> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if take_one(&self.failures) {
            return Err(Error::discovery("discovery failed"));
        }

        let addresses: Vec<Address> = self
            .current
            .lock()
            .unwrap()
            .iter()
            .filter(|ip| family.matches(ip))
            .map(|ip| Address::new(*ip))
            .collect();

        if addresses.is_empty() {
            return Err(Error::NoAddressFound(family));
        }
        Ok(AddressSet::new(addresses))
    }

    fn name(&self) -> &'static str {
        "controlled"
    }
}

/// A mock DnsProvider that holds records in memory and tracks calls
pub struct MockDnsProvider {
    /// Records held by the "provider"
    records: Mutex<Vec<DnsRecord>>,
    /// Call counter for list_records()
    list_calls: AtomicUsize,
    /// Call counter for update_record()
    update_calls: AtomicUsize,
    /// Remaining list_records() calls that fail transiently
    failures: AtomicUsize,
    /// Reject every call as unauthenticated
    reject_credentials: bool,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            reject_credentials: false,
        }
    }

    /// Provider holding a single record
    pub fn with_record(name: &str, record_type: &str, content: &str) -> Self {
        let provider = Self::new();
        provider.insert(name, record_type, content);
        provider
    }

    pub fn rejecting_credentials() -> Self {
        Self {
            reject_credentials: true,
            ..Self::new()
        }
    }

    pub fn insert(&self, name: &str, record_type: &str, content: &str) {
        let mut records = self.records.lock().unwrap();
        let id = format!("rec-{}", records.len() + 1);
        records.push(DnsRecord {
            id,
            name: name.to_string(),
            record_type: record_type.to_string(),
            content: content.to_string(),
            ttl: Some(300),
            proxied: Some(false),
        });
    }

    /// Make the next `n` list calls fail transiently
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Current content of a record
    pub fn content_of(&self, name: &str, record_type: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name == name && r.record_type == record_type)
            .map(|r| r.content.clone())
    }

    /// Get the number of times list_records() was called
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Get the number of times update_record() was called
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_records(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<DnsRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(zone_id, ZONE);

        if self.reject_credentials {
            return Err(Error::auth("invalid token"));
        }
        if take_one(&self.failures) {
            return Err(Error::provider("mock", "service unavailable"));
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == name && r.record_type == record_type)
            .cloned()
            .collect())
    }

    async fn update_record(&self, zone_id: &str, record: &DnsRecord, content: &str) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(zone_id, ZONE);

        let mut records = self.records.lock().unwrap();
        let existing = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| Error::record_not_found(&record.name, &record.record_type))?;
        existing.content = content.to_string();
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Short backoff so paused-clock tests stay readable
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(4),
        multiplier: 2,
        attempt_timeout: None,
    }
}

pub fn v6(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Build a pipeline for `domain`/`family` over the given doubles
pub fn pipeline(
    source: &Arc<ControlledSource>,
    provider: &Arc<MockDnsProvider>,
    domain: &str,
    family: AddressFamily,
    cancel: &CancellationToken,
) -> (Pipeline, mpsc::Receiver<PipelineEvent>) {
    let reconciler = Reconciler::new(
        Arc::clone(provider) as Arc<dyn DnsProvider>,
        ZONE,
        RecordConfig::new(domain, family),
    );
    Pipeline::new(
        Arc::clone(source) as Arc<dyn AddressSource>,
        reconciler,
        fast_policy(),
        cancel.clone(),
        100,
    )
}

/// Wait until an event matching `pred` arrives
pub async fn wait_for_event<F>(rx: &mut mpsc::Receiver<PipelineEvent>, pred: F) -> PipelineEvent
where
    F: Fn(&PipelineEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(3600), rx.recv())
            .await
            .expect("event arrives in time")
            .expect("pipeline still running");
        if pred(&event) {
            return event;
        }
    }
}
