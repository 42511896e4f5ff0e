//! Test doubles shared by the pipeline's unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::endpoint::{DeliveryError, DeliveryResult, SubmissionEndpoint};
use crate::error::{Error, Result};
use crate::payload::{SerializedPayload, SurveyPayload};
use crate::storage::{KeyedDurableStore, PendingSubmission, QueueStats, Storage};

/// What a [`ScriptedEndpoint`] does with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Accept,
    Reject(u16),
    Unreachable,
}

/// An endpoint that answers from a script and records what it saw.
///
/// Replies are consumed in call order; once the script runs out every call
/// gets the fallback reply.
#[derive(Debug)]
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Reply>,
    delay: Option<Duration>,
    accepted: Mutex<Vec<SerializedPayload>>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEndpoint {
    pub fn new(fallback: Reply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            delay: None,
            accepted: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn accepting() -> Self {
        Self::new(Reply::Accept)
    }

    pub fn with_script(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.lock().unwrap().extend(replies);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_fallback(&self, reply: Reply) {
        *self.fallback.lock().unwrap() = reply;
    }

    pub fn accepted(&self) -> Vec<SerializedPayload> {
        self.accepted.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| *self.fallback.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl SubmissionEndpoint for ScriptedEndpoint {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn deliver(&self, payload: &SerializedPayload) -> DeliveryResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Accept => {
                self.accepted.lock().unwrap().push(payload.clone());
                Ok(())
            }
            Reply::Reject(status) => Err(DeliveryError::Rejected {
                status,
                body: "scripted rejection".to_string(),
            }),
            Reply::Unreachable => Err(DeliveryError::Transport(
                "connection refused".to_string(),
            )),
        }
    }
}

/// A store that refuses every write.
#[derive(Debug, Default)]
pub struct FailingStore;

impl KeyedDurableStore for FailingStore {
    fn add(&self, _payload: &SerializedPayload) -> Result<i64> {
        Err(Error::Io(std::io::Error::other("disk full")))
    }

    fn remove(&self, _id: i64) -> Result<bool> {
        Ok(false)
    }

    fn list_all(&self) -> Result<Vec<PendingSubmission>> {
        Ok(Vec::new())
    }

    fn count(&self) -> Result<u64> {
        Ok(0)
    }

    fn contains(&self, _id: i64) -> Result<bool> {
        Ok(false)
    }

    fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats::default())
    }
}

/// A working store that cannot answer `contains` for one row.
#[derive(Debug)]
pub struct LockedRowStore {
    pub inner: Storage,
    pub locked_id: i64,
}

impl KeyedDurableStore for LockedRowStore {
    fn add(&self, payload: &SerializedPayload) -> Result<i64> {
        self.inner.add(payload)
    }

    fn remove(&self, id: i64) -> Result<bool> {
        self.inner.remove(id)
    }

    fn list_all(&self) -> Result<Vec<PendingSubmission>> {
        self.inner.list_all()
    }

    fn count(&self) -> Result<u64> {
        self.inner.count()
    }

    fn contains(&self, id: i64) -> Result<bool> {
        if id == self.locked_id {
            return Err(Error::internal("database is locked"));
        }
        self.inner.contains(id)
    }

    fn stats(&self) -> Result<QueueStats> {
        self.inner.stats()
    }
}

/// A small survey distinguished by `n`.
pub fn survey(n: i64) -> SerializedPayload {
    SurveyPayload::new()
        .with("pa1", n)
        .with("language", "en")
        .serialize()
        .unwrap()
}
