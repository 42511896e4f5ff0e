//! Draining the pending queue.
//!
//! A sync pass walks the queue oldest first and tries each survey once. A
//! survey leaves the queue only after its own acknowledgement; failures stay
//! for the next pass. There is no attempt cap.
//!
//! Overlapping passes on clones of one [`SyncEngine`] never deliver the same
//! record twice: each record is claimed for the duration of its attempt and
//! re-checked against the store right before it is sent.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::endpoint::SubmissionEndpoint;
use crate::error::{Error, Result};
use crate::status::StatusEvent;
use crate::storage::{PendingQueue, PendingSubmission};

/// Summary of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Deliveries started.
    pub attempted: usize,
    /// Surveys acknowledged and removed.
    pub delivered: usize,
    /// Surveys left pending after a failed attempt.
    pub failed: usize,
    /// Records skipped because another pass owned them or already removed them.
    pub skipped: usize,
    /// The pass did nothing because the device was offline.
    pub offline: bool,
}

impl SyncReport {
    fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }
}

/// When [`SyncEngine::run_auto`] starts passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSyncSchedule {
    /// How long the device must stay online after a reconnect.
    pub debounce: Duration,
    /// Periodic pass interval, if any.
    pub interval: Option<Duration>,
    /// Run one pass before waiting for triggers.
    pub on_start: bool,
}

/// Marks a record as owned by a running attempt until dropped.
struct Claim {
    in_flight: Arc<Mutex<HashSet<i64>>>,
    id: i64,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.id);
        }
    }
}

/// Drains the pending queue to the endpoint.
#[derive(Clone)]
pub struct SyncEngine {
    queue: PendingQueue,
    endpoint: Arc<dyn SubmissionEndpoint>,
    connectivity: watch::Receiver<Connectivity>,
    in_flight: Arc<Mutex<HashSet<i64>>>,
    pipeline_depth: usize,
    stale_after: Option<chrono::Duration>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("endpoint", &self.endpoint.describe())
            .field("pipeline_depth", &self.pipeline_depth)
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create an engine delivering one survey at a time.
    #[must_use]
    pub fn new(
        queue: PendingQueue,
        endpoint: Arc<dyn SubmissionEndpoint>,
        connectivity: &ConnectivityMonitor,
    ) -> Self {
        Self {
            queue,
            endpoint,
            connectivity: connectivity.subscribe(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            pipeline_depth: 1,
            stale_after: None,
        }
    }

    /// Allow up to `depth` deliveries in flight. Values below 1 mean 1.
    #[must_use]
    pub fn with_pipeline_depth(mut self, depth: usize) -> Self {
        self.pipeline_depth = depth.max(1);
        self
    }

    /// Warn about surveys pending longer than `age`.
    #[must_use]
    pub fn with_stale_after(mut self, age: Option<chrono::Duration>) -> Self {
        self.stale_after = age;
        self
    }

    fn is_online(&self) -> bool {
        self.connectivity.borrow().is_online()
    }

    fn claim(&self, id: i64) -> Result<Option<Claim>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| Error::internal("in-flight set lock poisoned"))?;
        if !in_flight.insert(id) {
            return Ok(None);
        }
        Ok(Some(Claim {
            in_flight: Arc::clone(&self.in_flight),
            id,
        }))
    }

    /// Claim a record for this pass if it is still pending and not owned by
    /// another pass. `None` means skip.
    fn admit(&self, id: i64) -> Result<Option<Claim>> {
        let Some(claim) = self.claim(id)? else {
            debug!(id, "Survey already in flight, skipping");
            return Ok(None);
        };
        if !self.queue.contains(id)? {
            debug!(id, "Survey already synced, skipping");
            return Ok(None);
        }
        Ok(Some(claim))
    }

    fn warn_stale(&self, pending: &[PendingSubmission]) {
        let Some(age) = self.stale_after else {
            return;
        };
        let cutoff = Utc::now() - age;
        for record in pending.iter().filter(|r| r.enqueued_at < cutoff) {
            warn!(
                id = record.id,
                enqueued_at = %record.enqueued_at,
                "Survey has been pending for longer than {} days",
                age.num_days()
            );
        }
    }

    /// Run one pass over the queue.
    ///
    /// Does nothing if the device is offline when the pass starts. An offline
    /// transition during the pass does not stop it.
    ///
    /// A record that cannot be checked against the store counts as failed
    /// for this pass; the rest of the pass goes on.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be listed.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        if !self.is_online() {
            debug!("Offline, skipping sync");
            return Ok(SyncReport::offline());
        }

        let pending = self.queue.list_all()?;
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }
        debug!(pending = pending.len(), depth = self.pipeline_depth, "Sync pass started");
        self.warn_stale(&pending);

        let mut report = SyncReport::default();
        let mut tasks: JoinSet<bool> = JoinSet::new();

        for record in pending {
            while tasks.len() >= self.pipeline_depth {
                if let Some(joined) = tasks.join_next().await {
                    tally(&mut report, joined);
                }
            }

            let claim = match self.admit(record.id) {
                Ok(Some(claim)) => claim,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        id = record.id,
                        error = %e,
                        "Could not check pending survey, leaving it for the next pass"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            report.attempted += 1;
            let endpoint = Arc::clone(&self.endpoint);
            let queue = self.queue.clone();
            tasks.spawn(deliver_one(endpoint, queue, record, claim));
        }

        while let Some(joined) = tasks.join_next().await {
            tally(&mut report, joined);
        }

        if report.delivered > 0 {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                "Pending surveys synced"
            );
            self.queue.notifier().publish(StatusEvent::Synced {
                count: report.delivered,
            });
        }
        Ok(report)
    }

    async fn run_pass(&self, trigger: &'static str) {
        debug!(trigger, "Starting sync pass");
        match self.sync_all().await {
            Ok(report) if report.attempted > 0 => {
                debug!(trigger, ?report, "Sync pass finished");
            }
            Ok(_) => {}
            Err(e) => error!(trigger, error = %e, "Sync pass failed"),
        }
    }

    /// React to connectivity and timers until `shutdown` changes or either
    /// channel closes.
    ///
    /// A transition already pending on `connectivity` when this starts is
    /// acted on.
    ///
    /// Every transition to online starts one pass once the device has stayed
    /// online for the debounce window; transitions inside the window
    /// coalesce. Passes started here run one after another, never
    /// overlapping. A pass in progress when shutdown is requested finishes
    /// before this returns.
    pub async fn run_auto(
        &self,
        mut connectivity: watch::Receiver<Connectivity>,
        schedule: AutoSyncSchedule,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if schedule.on_start {
            self.run_pass("startup").await;
        }

        let mut ticker = schedule.interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !connectivity.borrow_and_update().is_online() {
                        continue;
                    }
                    if !schedule.debounce.is_zero() {
                        tokio::time::sleep(schedule.debounce).await;
                    }
                    if connectivity.borrow_and_update().is_online() {
                        self.run_pass("reconnect").await;
                    } else {
                        debug!("Connection dropped during debounce, not syncing");
                    }
                }
                () = next_tick(&mut ticker) => {
                    self.run_pass("interval").await;
                }
            }
        }
        debug!("Auto-sync stopped");
    }
}

/// Deliver one record and remove it on acknowledgement.
async fn deliver_one(
    endpoint: Arc<dyn SubmissionEndpoint>,
    queue: PendingQueue,
    record: PendingSubmission,
    claim: Claim,
) -> bool {
    let acknowledged = match endpoint.deliver(&record.payload).await {
        Ok(()) => {
            if let Err(e) = queue.remove(record.id) {
                error!(
                    id = record.id,
                    error = %e,
                    "Delivered survey could not be removed and will be sent again"
                );
            }
            debug!(id = record.id, digest = %record.digest, "Survey synced");
            true
        }
        Err(e) => {
            warn!(id = record.id, error = %e, "Survey sync failed, will retry later");
            false
        }
    };
    drop(claim);
    acknowledged
}

fn tally(report: &mut SyncReport, joined: std::result::Result<bool, tokio::task::JoinError>) {
    match joined {
        Ok(true) => report.delivered += 1,
        Ok(false) => report.failed += 1,
        Err(e) => {
            error!(error = %e, "Sync task panicked");
            report.failed += 1;
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
