// # ddns6-core
//
// Core library for the ddns6 record synchronizer.
//
// ## Architecture Overview
//
// This library keeps one DNS record per address family pointed at the host's
// current public address:
// - **AddressSource**: Trait for discovering candidate addresses for a family
// - **ChangeNotifier**: Trait for address-change wake-ups (event-driven strategies)
// - **DnsProvider**: Trait for reading and updating DNS records via provider APIs
// - **Reconciler**: Decides whether an update is needed and issues it
// - **RetryScheduler**: Unbounded retry with capped exponential backoff
// - **Pipeline**: One (domain, family) synchronization loop with owned state
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Discovery, reconciliation and retry are independent
// 2. **Event-Driven Where Possible**: Change notifications replace polling when available
// 3. **Isolation**: Pipelines share no mutable state; one family failing never blocks the other
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: A cached or already-current address never produces an update call

pub mod address;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reconciler;
pub mod retry;
pub mod traits;

// Re-export core types for convenience
pub use address::{Address, AddressFamily, AddressSet, Scope};
pub use config::{
    Ddns6Config, DiscoveryStrategy, EngineConfig, PrefixPolicy, ProviderConfig, RecordConfig,
};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineEvent, SyncState, Trigger};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use retry::{RetryPolicy, RetryScheduler};
pub use traits::{
    AddressSource, ChangeNotifier, ChangeSender, ChangeStream, DnsProvider, DnsRecord,
    change_channel,
};
