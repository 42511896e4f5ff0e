//! `surveysync` - Offline-first survey submission
//!
//! Survey responses are delivered to a collection endpoint when the device is
//! online and kept in a durable local queue when it is not. A sync engine
//! drains the queue once connectivity returns.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod connectivity;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod payload;
pub mod pipeline;
pub mod session;
pub mod status;
pub mod storage;
pub mod submit;
pub mod sync;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use connectivity::{Connectivity, ConnectivityMonitor, LinkSignal};
pub use endpoint::{DeliveryError, HttpEndpoint, SubmissionEndpoint};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use payload::{FieldValue, SerializedPayload, SurveyPayload};
pub use pipeline::{Pipeline, WatchHandle};
pub use session::{Language, SurveySession};
pub use status::{Notifier, StatusEvent, SubmissionOutcome};
pub use storage::{KeyedDurableStore, PendingQueue, PendingSubmission, QueueStats, Storage};
pub use submit::{SubmissionClient, SubmitReceipt};
pub use sync::{AutoSyncSchedule, SyncEngine, SyncReport};
