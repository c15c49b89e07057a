//! Background reconcile worker
//!
//! Rotations only mark records pending. This worker is what actually talks
//! to the providers: it drains a bounded queue of domain ids fed by the
//! rotation engine and, on a fixed interval, pushes whatever is still
//! pending across all domains. Records a rotation retired are deleted at
//! the provider after the pending records went out.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::Reconciler;
use crate::error::Result;
use crate::model::DomainId;

/// Sending half used to request a push for a domain
#[derive(Debug, Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<DomainId>,
}

impl ReconcileHandle {
    /// Queue a push; returns false when the queue is full or closed
    ///
    /// A dropped request is not lost work: the record stays pending and the
    /// next periodic pass picks it up.
    pub fn enqueue(&self, domain_id: DomainId) -> bool {
        match self.tx.try_send(domain_id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(domain_id, "Reconcile queue full, deferring to next pass");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(domain_id, "Reconcile worker stopped, push not queued");
                false
            }
        }
    }
}

pub struct ReconcileWorker {
    reconciler: Arc<Reconciler>,
    rx: mpsc::Receiver<DomainId>,
    pass_interval: Duration,
}

impl ReconcileWorker {
    /// Create a worker and the handle that feeds it
    pub fn new(
        reconciler: Arc<Reconciler>,
        queue_capacity: usize,
        pass_interval: Duration,
    ) -> (Self, ReconcileHandle) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        (
            Self {
                reconciler,
                rx,
                pass_interval,
            },
            ReconcileHandle { tx },
        )
    }

    /// Push one domain, then remove its retired records; true when in sync
    async fn converge(&self, domain_id: DomainId) -> Result<bool> {
        let report = self.reconciler.push_pending(domain_id).await?;
        self.reconciler.purge_retired(domain_id).await?;
        Ok(report.is_in_sync())
    }

    /// Push pending records for every domain; returns how many domains failed
    pub async fn pass(&self) -> usize {
        let domains = match self.reconciler.store().list_domains().await {
            Ok(domains) => domains,
            Err(e) => {
                tracing::error!(error = %e, "Reconcile pass could not list domains");
                return 1;
            }
        };

        let mut failed = 0;
        for domain in domains {
            match self.converge(domain.id).await {
                Ok(true) => {}
                Ok(false) => failed += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(domain = %domain.name, error = %e, "Reconcile pass failed");
                }
            }
        }
        failed
    }

    /// Run until `shutdown` fires
    ///
    /// The first pass runs immediately, which pushes anything left pending
    /// by a previous run.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        tracing::info!(
            pass_interval_secs = self.pass_interval.as_secs(),
            "Reconcile worker started"
        );
        let mut ticker = tokio::time::interval(self.pass_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Reconcile worker stopping");
                    break;
                }
                Some(domain_id) = self.rx.recv() => {
                    if let Err(e) = self.converge(domain_id).await {
                        tracing::warn!(domain_id, error = %e, "Push after rotation failed");
                    }
                }
                _ = ticker.tick() => {
                    let failed = self.pass().await;
                    if failed > 0 {
                        tracing::warn!(failed, "Reconcile pass finished with failures");
                    }
                }
            }
        }
    }
}
