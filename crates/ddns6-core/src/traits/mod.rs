//! Core traits for ddns6
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`AddressSource`]: Discover candidate addresses for a family
//! - [`ChangeNotifier`]: Wake pipelines when local addresses change
//! - [`DnsProvider`]: Read and update the published DNS record

pub mod address_source;
pub mod change_notifier;
pub mod dns_provider;

pub use address_source::AddressSource;
pub use change_notifier::{ChangeNotifier, ChangeSender, ChangeStream, change_channel};
pub use dns_provider::{DnsProvider, DnsRecord};
