//! Status surface for the UI layer.
//!
//! The pipeline reports what happened through [`StatusEvent`]s on a
//! broadcast channel. The UI decides how to render them; the message helpers
//! here give it the same wording the survey has always used.

use tokio::sync::broadcast;
use tracing::trace;

use crate::connectivity::Connectivity;

/// Capacity of the status broadcast channel.
const CHANNEL_CAPACITY: usize = 64;

/// Something the UI may want to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The number of pending surveys changed.
    PendingChanged {
        /// Current number of pending surveys.
        count: u64,
    },
    /// A survey was delivered on its first attempt.
    SubmittedOnline,
    /// A survey was saved locally for later delivery.
    SavedOffline {
        /// Local id of the queued survey.
        id: i64,
    },
    /// The local store refused a survey. It is lost.
    PersistenceFailed {
        /// Human-readable cause.
        message: String,
    },
    /// A sync pass delivered at least one pending survey.
    Synced {
        /// How many surveys the pass delivered.
        count: usize,
    },
    /// The device went online or offline.
    ConnectivityChanged(Connectivity),
}

/// The three end states of a submission, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Delivered to the endpoint.
    SubmittedOnline,
    /// Saved locally, will sync later.
    SavedOffline,
    /// Neither delivered nor saved.
    Failed,
}

impl std::fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubmittedOnline => write!(f, "Survey submitted successfully!"),
            Self::SavedOffline => write!(
                f,
                "Survey saved offline! It will be submitted when connection is restored."
            ),
            Self::Failed => write!(f, "Error submitting survey. Please try again."),
        }
    }
}

fn plural(count: u64) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Notification text after a sync pass, e.g. `✅ 2 surveys synced!`.
#[must_use]
pub fn synced_message(count: usize) -> String {
    let count = count as u64;
    format!("✅ {count} survey{} synced!", plural(count))
}

/// Badge text for pending surveys, or `None` when nothing is pending.
#[must_use]
pub fn pending_badge(count: u64) -> Option<String> {
    (count > 0).then(|| format!("📁 {count} survey{} pending sync", plural(count)))
}

/// Connection indicator text.
#[must_use]
pub fn connection_label(state: Connectivity) -> &'static str {
    match state {
        Connectivity::Online => "🟢 Online",
        Connectivity::Offline => "🔴 Offline - Surveys will be saved locally",
    }
}

/// Publishes status events to any number of subscribers.
///
/// Publishing never fails: with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<StatusEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Create a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Publish an event.
    pub fn publish(&self, event: StatusEvent) {
        trace!(?event, "Status event");
        let _ = self.tx.send(event);
    }
}
