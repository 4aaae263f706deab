// # Change Notifier Trait
//
// Event-driven triggering for pipelines whose discovery strategy can observe
// the kernel's address table (netlink).
//
// A notifier converts OS address-change events into payload-free wake-ups.
// The wake-ups travel through a bounded channel; when the channel is full the
// wake-up is dropped. Nothing is lost by dropping: the pending wake-up already
// guarantees one more discovery, and discovery re-reads current state instead
// of replaying the event.

use async_trait::async_trait;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Stream of coalesced change wake-ups
pub type ChangeStream = Pin<Box<dyn Stream<Item = ()> + Send + 'static>>;

/// Trait for address-change notifiers
///
/// # Contract
///
/// - `subscribe` fails immediately if the OS subscription cannot be established
/// - The returned stream yields `()` at least once per underlying change event,
///   coalescing bursts
/// - After `cancel` fires the stream terminates, the OS resource is released and
///   no further items are yielded
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Subscribe to address changes until `cancel` fires
    async fn subscribe(&self, cancel: CancellationToken) -> Result<ChangeStream, crate::Error>;
}

/// Sending half of a coalescing change channel
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::Sender<()>,
}

impl ChangeSender {
    /// Signal a change
    ///
    /// Returns `false` once the receiving pipeline is gone.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Change wake-up already pending, coalescing");
                true
            }
            Err(TrySendError::Closed(())) => false,
        }
    }

    /// Whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a bounded change channel
///
/// `capacity` is the number of wake-ups that may be pending at once; with the
/// default of 1 any burst of events collapses into a single follow-up run.
pub fn change_channel(capacity: usize) -> (ChangeSender, ChangeStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChangeSender { tx }, Box::pin(ReceiverStream::new(rx)))
}
