//! Connectivity monitoring.
//!
//! The monitor tracks one boolean, whether the device believes it can reach
//! the network, and broadcasts transitions on a `watch` channel. The belief
//! comes from the platform's link state and is never verified against the
//! endpoint: the delivery attempt itself is the real reachability test.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::status::{Notifier, StatusEvent};

/// Whether the device is online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// The platform reports a usable network link.
    Online,
    /// No usable network link.
    Offline,
}

impl Connectivity {
    /// Convert a platform boolean.
    #[must_use]
    pub fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }

    /// Whether this state is [`Connectivity::Online`].
    #[must_use]
    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A source of the platform's online/offline signal.
pub trait LinkSignal: Send + Sync {
    /// Name of this signal (for logging).
    fn name(&self) -> &'static str;

    /// Sample the signal now.
    fn current(&self) -> Connectivity;
}

/// The native link-state signal of the current platform.
///
/// On Linux this reads interface state from sysfs. Elsewhere there is no
/// native signal and the device is assumed online.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSignal;

impl LinkSignal for NativeSignal {
    fn name(&self) -> &'static str {
        "native"
    }

    #[cfg(target_os = "linux")]
    fn current(&self) -> Connectivity {
        Connectivity::from_online(surveysync_linux::link_is_up())
    }

    #[cfg(not(target_os = "linux"))]
    fn current(&self) -> Connectivity {
        Connectivity::Online
    }
}

/// A signal pinned to one state, for configuration overrides and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSignal(pub Connectivity);

impl LinkSignal for FixedSignal {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn current(&self) -> Connectivity {
        self.0
    }
}

/// A handle to stop a polling task.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    stop_signal: Arc<AtomicBool>,
}

impl MonitorHandle {
    fn new() -> Self {
        Self {
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal the polling task to stop.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// Tracks the current connectivity state and notifies subscribers.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<Connectivity>>,
    notifier: Notifier,
}

impl ConnectivityMonitor {
    /// Create a monitor starting in the given state.
    #[must_use]
    pub fn new(initial: Connectivity, notifier: Notifier) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            notifier,
        }
    }

    /// Create a monitor seeded from a signal's current reading.
    #[must_use]
    pub fn from_signal(signal: &dyn LinkSignal, notifier: Notifier) -> Self {
        Self::new(signal.current(), notifier)
    }

    /// The current state.
    #[must_use]
    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    /// Whether the device is currently considered online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Record a new state. Returns `true` if this was a transition.
    pub fn set(&self, state: Connectivity) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            info!(state = %state, "Connectivity changed");
            self.notifier.publish(StatusEvent::ConnectivityChanged(state));
        }
        changed
    }

    /// Subscribe to state transitions.
    ///
    /// The receiver starts with the current state marked as seen.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }

    /// Poll a signal at a fixed interval and publish its transitions.
    ///
    /// The task ends when the returned handle is stopped.
    pub fn spawn_polling(
        &self,
        signal: Arc<dyn LinkSignal>,
        interval: Duration,
    ) -> (MonitorHandle, JoinHandle<()>) {
        let handle = MonitorHandle::new();
        let task_handle = handle.clone();
        let monitor = self.clone();

        let task = tokio::spawn(async move {
            debug!(signal = signal.name(), ?interval, "Connectivity polling started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if task_handle.should_stop() {
                    break;
                }
                monitor.set(signal.current());
            }
            debug!(signal = signal.name(), "Connectivity polling stopped");
        });

        (handle, task)
    }
}
