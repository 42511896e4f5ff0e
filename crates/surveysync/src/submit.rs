//! First-attempt submission.
//!
//! A survey is delivered straight away when the device is online. If it is
//! offline, or the one attempt fails for any reason, the survey goes to the
//! pending queue instead. The only error a caller ever sees is a persistence
//! failure: the survey could be neither delivered nor saved.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::endpoint::SubmissionEndpoint;
use crate::error::{Error, Result};
use crate::payload::{SerializedPayload, SurveyPayload};
use crate::status::{StatusEvent, SubmissionOutcome};
use crate::storage::PendingQueue;

/// What happened to a submitted survey.
///
/// Exactly one of `delivered` and `queued` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// The endpoint acknowledged the survey.
    pub delivered: bool,
    /// The survey was saved locally for a later sync pass.
    pub queued: bool,
    /// Local id of the queued survey.
    pub pending_id: Option<i64>,
}

impl SubmitReceipt {
    fn delivered() -> Self {
        Self {
            delivered: true,
            queued: false,
            pending_id: None,
        }
    }

    fn queued(id: i64) -> Self {
        Self {
            delivered: false,
            queued: true,
            pending_id: Some(id),
        }
    }

    /// The user-facing end state.
    #[must_use]
    pub fn outcome(&self) -> SubmissionOutcome {
        if self.delivered {
            SubmissionOutcome::SubmittedOnline
        } else {
            SubmissionOutcome::SavedOffline
        }
    }
}

/// Submits surveys, falling back to the pending queue.
#[derive(Clone)]
pub struct SubmissionClient {
    queue: PendingQueue,
    endpoint: Arc<dyn SubmissionEndpoint>,
    connectivity: ConnectivityMonitor,
}

impl std::fmt::Debug for SubmissionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionClient")
            .field("endpoint", &self.endpoint.describe())
            .field("connectivity", &self.connectivity.current())
            .finish_non_exhaustive()
    }
}

impl SubmissionClient {
    /// Create a client.
    #[must_use]
    pub fn new(
        queue: PendingQueue,
        endpoint: Arc<dyn SubmissionEndpoint>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            queue,
            endpoint,
            connectivity,
        }
    }

    /// Submit one serialized survey.
    ///
    /// Makes at most one delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailure`] if the survey was not delivered
    /// and the local store refused it.
    pub async fn submit(&self, payload: &SerializedPayload) -> Result<SubmitReceipt> {
        let digest = payload.digest();

        if self.connectivity.is_online() {
            match self.endpoint.deliver(payload).await {
                Ok(()) => {
                    info!(digest = %digest, "Survey submitted");
                    self.queue.notifier().publish(StatusEvent::SubmittedOnline);
                    return Ok(SubmitReceipt::delivered());
                }
                Err(e) => {
                    warn!(
                        digest = %digest,
                        endpoint = %self.endpoint.describe(),
                        error = %e,
                        "Submission failed, saving survey locally"
                    );
                }
            }
        } else {
            debug!(digest = %digest, "Offline, saving survey locally");
        }

        self.save_locally(payload)
    }

    /// Serialize and submit a survey.
    ///
    /// # Errors
    ///
    /// Returns a parse failure if the payload cannot be serialized, or a
    /// persistence failure as in [`submit`](Self::submit).
    pub async fn submit_survey(&self, payload: &SurveyPayload) -> Result<SubmitReceipt> {
        let serialized = payload.serialize()?;
        self.submit(&serialized).await
    }

    fn save_locally(&self, payload: &SerializedPayload) -> Result<SubmitReceipt> {
        match self.queue.add(payload) {
            Ok(id) => {
                info!(id, "Survey saved offline");
                self.queue
                    .notifier()
                    .publish(StatusEvent::SavedOffline { id });
                Ok(SubmitReceipt::queued(id))
            }
            Err(e) => {
                error!(error = %e, "Survey could not be saved locally");
                self.queue
                    .notifier()
                    .publish(StatusEvent::PersistenceFailed {
                        message: e.to_string(),
                    });
                Err(Error::persistence(e))
            }
        }
    }
}
