//! Per-record synchronization pipeline
//!
//! A [`Pipeline`] owns everything needed to keep one (domain, family) record
//! in sync:
//! - the bound [`AddressSource`]
//! - a [`Reconciler`] for its record
//! - a [`RetryScheduler`]
//! - its [`SyncState`], which no other task can see
//!
//! ## Architecture
//!
//! ```text
//!  Trigger (timer tick | change event)
//!         │
//!         ▼
//! ┌───────────────────────────── RetryScheduler ─────────────────────────────┐
//! │  AddressSource::discover ──► Reconciler::reconcile ──► DnsProvider        │
//! │          ▲                                   │                            │
//! │          └──────── transient failure ◄───────┘                            │
//! └───────────────────────────────────────────────────────────────────────────┘
//!         │ success
//!         ▼
//!   SyncState.last_applied ← applied address          PipelineEvent ──► observers
//! ```
//!
//! ## Cycle Flow
//!
//! `Idle → Discovering → Reconciling → (Success: Idle) | (Failure: Retrying → Discovering)`
//!
//! Each trigger runs to completion before the next trigger is consumed. A
//! configuration-class error halts the pipeline; every other failure only
//! abandons the current cycle.

use crate::address::AddressFamily;
use crate::error::{Error, Result};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::retry::{RetryPolicy, RetryScheduler};
use crate::traits::{AddressSource, ChangeStream};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events emitted by a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Pipeline started
    Started {
        domain: String,
        family: AddressFamily,
    },

    /// DNS record updated
    UpdateSucceeded {
        domain: String,
        new_ip: IpAddr,
        previous_ip: IpAddr,
    },

    /// No update needed
    UpdateSkipped {
        domain: String,
        current_ip: IpAddr,
    },

    /// Cycle abandoned after transient failures; state unchanged
    CycleFailed {
        domain: String,
        error: String,
    },

    /// Configuration-class failure; pipeline stopped
    Halted {
        domain: String,
        error: String,
    },

    /// Pipeline stopped
    Stopped {
        domain: String,
        reason: String,
    },
}

/// What drives a pipeline's cycles
pub enum Trigger {
    /// Run a cycle, then sleep the period
    Interval(Duration),
    /// Run a cycle per (coalesced) address-change wake-up
    Changes(ChangeStream),
}

/// Last address applied for a pipeline's record
///
/// Starts unknown; only a successful reconciliation moves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    last_applied: Option<IpAddr>,
}

impl SyncState {
    pub fn last_applied(&self) -> Option<IpAddr> {
        self.last_applied
    }

    fn apply(&mut self, outcome: &ReconcileOutcome) {
        self.last_applied = Some(outcome.applied());
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Synchronization pipeline for one (domain, family)
///
/// ## Lifecycle
///
/// 1. Create with [`Pipeline::new()`]
/// 2. Start with [`Pipeline::run()`], usually on its own task
/// 3. Runs until its cancellation token fires or a configuration error halts it
///
/// ## Load Resistance
///
/// - **Coalesced triggers**: change wake-ups are bounded upstream; a burst
///   collapses into one follow-up cycle that re-reads current state
/// - **Cache short-circuit**: an unchanged address costs no provider call
/// - **Backoff**: retries grow up to the policy's maximum delay
/// - **Bounded event channel**: observers that fall behind lose events, not memory
pub struct Pipeline {
    source: Arc<dyn AddressSource>,
    reconciler: Reconciler,
    retry: RetryScheduler,
    cycle_timeout: Option<Duration>,
    state: SyncState,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<PipelineEvent>,
}

impl Pipeline {
    /// Create a new pipeline
    ///
    /// # Returns
    ///
    /// A tuple of (pipeline, event_receiver) where event_receiver yields pipeline events
    pub fn new(
        source: Arc<dyn AddressSource>,
        reconciler: Reconciler,
        policy: RetryPolicy,
        cancel: CancellationToken,
        event_channel_capacity: usize,
    ) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(event_channel_capacity.max(1));

        let pipeline = Self {
            source,
            reconciler,
            retry: RetryScheduler::new(policy, cancel.clone()),
            cycle_timeout: None,
            state: SyncState::default(),
            cancel,
            event_tx: tx,
        };

        (pipeline, rx)
    }

    /// Bound each cycle, including its retries, by `timeout`
    pub fn with_cycle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    pub fn family(&self) -> AddressFamily {
        self.reconciler.record().family
    }

    pub fn domain(&self) -> &str {
        &self.reconciler.record().domain
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Run one retry-wrapped discovery + reconcile cycle
    ///
    /// `SyncState` advances only on success.
    pub async fn run_cycle(&mut self) -> Result<ReconcileOutcome> {
        let deadline = self.cycle_timeout.map(|t| Instant::now() + t);
        let family = self.family();
        let last_applied = self.state.last_applied;
        let source = &self.source;
        let reconciler = &self.reconciler;

        let outcome = self
            .retry
            .run(deadline, move |attempt| async move {
                debug!(attempt, "Discovering {} candidates via {}", family, source.name());
                let discovered = source.discover(family).await?;
                debug!("Discovered {}", discovered);
                reconciler.reconcile(&discovered, last_applied).await
            })
            .await?;

        self.state.apply(&outcome);
        Ok(outcome)
    }

    /// Run the pipeline until cancelled
    ///
    /// An initial cycle runs immediately, then one per trigger.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Cancelled
    /// - `Err(Error)`: Halted by a configuration-class error
    pub async fn run(mut self, trigger: Trigger) -> Result<()> {
        self.emit_event(PipelineEvent::Started {
            domain: self.domain().to_string(),
            family: self.family(),
        });
        info!(
            "Pipeline started for {} ({}) via {}",
            self.domain(),
            self.family(),
            self.source.name()
        );

        let reason = match trigger {
            Trigger::Interval(period) => self.run_interval(period).await?,
            Trigger::Changes(stream) => self.run_changes(stream).await?,
        };

        info!("Pipeline for {} stopped: {}", self.domain(), reason);
        self.emit_event(PipelineEvent::Stopped {
            domain: self.domain().to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn run_interval(&mut self, period: Duration) -> Result<&'static str> {
        loop {
            if let Flow::Stop = self.cycle().await? {
                return Ok("Shutdown signal");
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok("Shutdown signal"),
                _ = tokio::time::sleep(period) => {}
            }
        }
    }

    async fn run_changes(&mut self, mut stream: ChangeStream) -> Result<&'static str> {
        if let Flow::Stop = self.cycle().await? {
            return Ok("Shutdown signal");
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok("Shutdown signal"),
                next = stream.next() => match next {
                    Some(()) => {
                        debug!("Address change signalled for {}", self.domain());
                        if let Flow::Stop = self.cycle().await? {
                            return Ok("Shutdown signal");
                        }
                    }
                    None => {
                        if self.cancel.is_cancelled() {
                            return Ok("Shutdown signal");
                        }
                        let error = Error::Other("Change notifications ended".to_string());
                        error!("Pipeline for {} halted: {}", self.domain(), error);
                        self.emit_event(PipelineEvent::Halted {
                            domain: self.domain().to_string(),
                            error: error.to_string(),
                        });
                        return Err(error);
                    }
                },
            }
        }
    }

    /// Run a cycle and report its outcome
    async fn cycle(&mut self) -> Result<Flow> {
        match self.run_cycle().await {
            Ok(outcome) => {
                self.report(&outcome);
                Ok(Flow::Continue)
            }
            Err(Error::Cancelled) => Ok(Flow::Stop),
            Err(e) if e.is_configuration() => {
                error!("Pipeline for {} halted: {}", self.domain(), e);
                self.emit_event(PipelineEvent::Halted {
                    domain: self.domain().to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
            Err(e) => {
                warn!(
                    "Cycle for {} abandoned, waiting for next trigger: {}",
                    self.domain(),
                    e
                );
                self.emit_event(PipelineEvent::CycleFailed {
                    domain: self.domain().to_string(),
                    error: e.to_string(),
                });
                Ok(Flow::Continue)
            }
        }
    }

    fn report(&self, outcome: &ReconcileOutcome) {
        let domain = self.domain().to_string();
        let event = match *outcome {
            ReconcileOutcome::Updated {
                previous_ip,
                new_ip,
            } => {
                info!("{} updated to {}", domain, new_ip);
                PipelineEvent::UpdateSucceeded {
                    domain,
                    new_ip,
                    previous_ip,
                }
            }
            ReconcileOutcome::Cached { current_ip }
            | ReconcileOutcome::AlreadyCurrent { current_ip } => {
                PipelineEvent::UpdateSkipped { domain, current_ip }
            }
        };
        self.emit_event(event);
    }

    /// Emit a pipeline event
    fn emit_event(&self, event: PipelineEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.event_tx.try_send(event).is_err() && !self.event_tx.is_closed() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}
