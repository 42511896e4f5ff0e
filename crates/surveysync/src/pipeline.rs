//! Wiring of the submission pipeline.
//!
//! One [`Pipeline`] per process: a single pending queue, connectivity
//! monitor and sync engine shared by everything that submits or drains.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{Config, ConnectivityMode};
use crate::connectivity::{
    Connectivity, ConnectivityMonitor, FixedSignal, LinkSignal, MonitorHandle, NativeSignal,
};
use crate::endpoint::{HttpEndpoint, SubmissionEndpoint};
use crate::error::Result;
use crate::status::Notifier;
use crate::storage::{KeyedDurableStore, PendingQueue, Storage};
use crate::submit::SubmissionClient;
use crate::sync::{AutoSyncSchedule, SyncEngine};

/// The link signal a connectivity mode selects.
#[must_use]
pub fn signal_for(mode: ConnectivityMode) -> Arc<dyn LinkSignal> {
    match mode {
        ConnectivityMode::Auto => Arc::new(NativeSignal),
        ConnectivityMode::Online => Arc::new(FixedSignal(Connectivity::Online)),
        ConnectivityMode::Offline => Arc::new(FixedSignal(Connectivity::Offline)),
    }
}

/// All pipeline components, wired together.
pub struct Pipeline {
    queue: PendingQueue,
    monitor: ConnectivityMonitor,
    signal: Arc<dyn LinkSignal>,
    client: SubmissionClient,
    engine: SyncEngine,
    poll_interval: Duration,
    schedule: AutoSyncSchedule,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("queue", &self.queue)
            .field("monitor", &self.monitor)
            .field("signal", &self.signal.name())
            .field("client", &self.client)
            .field("engine", &self.engine)
            .field("poll_interval", &self.poll_interval)
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl Pipeline {
    /// Open the configured store and endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the endpoint URL
    /// is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        let endpoint = Arc::new(HttpEndpoint::new(&config.endpoint)?);
        let signal = signal_for(config.connectivity.mode);
        Ok(Self::assemble(storage, endpoint, signal, config))
    }

    /// Wire the pipeline around explicit components.
    ///
    /// The monitor starts from the signal's current reading.
    pub fn assemble<S: KeyedDurableStore + 'static>(
        store: S,
        endpoint: Arc<dyn SubmissionEndpoint>,
        signal: Arc<dyn LinkSignal>,
        config: &Config,
    ) -> Self {
        let notifier = Notifier::new();
        let queue = PendingQueue::new(store, notifier.clone());
        let monitor = ConnectivityMonitor::from_signal(signal.as_ref(), notifier);
        let client = SubmissionClient::new(queue.clone(), Arc::clone(&endpoint), monitor.clone());
        let engine = SyncEngine::new(queue.clone(), endpoint, &monitor)
            .with_pipeline_depth(config.sync.pipeline_depth)
            .with_stale_after(config.stale_after());

        debug!(
            signal = signal.name(),
            state = %monitor.current(),
            "Pipeline assembled"
        );

        Self {
            queue,
            monitor,
            signal,
            client,
            engine,
            poll_interval: config.poll_interval(),
            schedule: AutoSyncSchedule {
                debounce: config.debounce(),
                interval: config.sync_interval(),
                on_start: config.sync.on_start,
            },
        }
    }

    /// The pending queue.
    #[must_use]
    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    /// The status notifier.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        self.queue.notifier()
    }

    /// The connectivity monitor.
    #[must_use]
    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// The submission client.
    #[must_use]
    pub fn client(&self) -> &SubmissionClient {
        &self.client
    }

    /// The sync engine.
    #[must_use]
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// The auto-sync schedule derived from configuration.
    #[must_use]
    pub fn schedule(&self) -> AutoSyncSchedule {
        self.schedule
    }

    /// Re-sample the link signal now.
    pub fn refresh_connectivity(&self) -> Connectivity {
        let state = self.signal.current();
        self.monitor.set(state);
        state
    }

    /// Start polling the link signal and syncing automatically.
    #[must_use]
    pub fn spawn_watch(&self) -> WatchHandle {
        let (polling_handle, polling) = self
            .monitor
            .spawn_polling(Arc::clone(&self.signal), self.poll_interval);

        let engine = self.engine.clone();
        let rx = self.monitor.subscribe();
        let schedule = self.schedule;
        let (stop, stop_rx) = watch::channel(false);
        let auto_sync = tokio::spawn(async move { engine.run_auto(rx, schedule, stop_rx).await });

        info!(
            signal = self.signal.name(),
            poll_interval = ?self.poll_interval,
            "Watching connectivity"
        );
        WatchHandle {
            polling_handle,
            polling,
            stop,
            auto_sync,
        }
    }
}

/// Background tasks started by [`Pipeline::spawn_watch`].
#[derive(Debug)]
pub struct WatchHandle {
    polling_handle: MonitorHandle,
    polling: JoinHandle<()>,
    stop: watch::Sender<bool>,
    auto_sync: JoinHandle<()>,
}

impl WatchHandle {
    /// Stop polling and auto-sync. No new pass starts; a pass in progress
    /// runs to completion first.
    pub async fn shutdown(self) {
        self.polling_handle.stop();
        let _ = self.stop.send(true);
        let _ = self.auto_sync.await;
        let _ = self.polling.await;
        debug!("Watch stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::status::{synced_message, StatusEvent, SubmissionOutcome};
    use crate::testing::{survey, Reply, ScriptedEndpoint};

    fn pipeline(
        store: Storage,
        endpoint: Arc<ScriptedEndpoint>,
        state: Connectivity,
    ) -> Pipeline {
        Pipeline::assemble(
            store,
            endpoint,
            Arc::new(FixedSignal(state)),
            &Config::default(),
        )
    }

    #[tokio::test]
    async fn test_offline_submission_syncs_after_reconnect() {
        let endpoint = Arc::new(ScriptedEndpoint::accepting());
        let p = pipeline(
            Storage::open_in_memory().unwrap(),
            endpoint.clone(),
            Connectivity::Offline,
        );
        let mut events = p.notifier().subscribe();

        let receipt = p.client().submit(&survey(1)).await.unwrap();
        assert_eq!(receipt.outcome(), SubmissionOutcome::SavedOffline);
        assert_eq!(p.queue().count().unwrap(), 1);

        p.monitor().set(Connectivity::Online);
        let report = p.engine().sync_all().await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(p.queue().count().unwrap(), 0);
        assert_eq!(endpoint.accepted(), vec![survey(1)]);

        let mut synced = None;
        while let Ok(event) = events.try_recv() {
            if let StatusEvent::Synced { count } = event {
                synced = Some(count);
            }
        }
        assert_eq!(synced.map(synced_message).unwrap(), "✅ 1 survey synced!");
    }

    #[tokio::test]
    async fn test_server_error_queues_like_offline() {
        let endpoint = Arc::new(ScriptedEndpoint::new(Reply::Reject(500)));
        let online = pipeline(
            Storage::open_in_memory().unwrap(),
            endpoint.clone(),
            Connectivity::Online,
        );
        let offline = pipeline(
            Storage::open_in_memory().unwrap(),
            endpoint,
            Connectivity::Offline,
        );

        let a = online.client().submit(&survey(5)).await.unwrap();
        let b = offline.client().submit(&survey(5)).await.unwrap();

        assert_eq!(a.outcome(), b.outcome());
        assert_eq!((a.delivered, a.queued), (b.delivered, b.queued));

        let a = online.queue().list_all().unwrap();
        let b = offline.queue().list_all().unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].payload, b[0].payload);
        assert_eq!(a[0].digest, b[0].digest);
        assert_eq!(a[0].synced, b[0].synced);
    }

    #[tokio::test]
    async fn test_partial_drain_retains_second_survey() {
        let endpoint = Arc::new(ScriptedEndpoint::new(Reply::Unreachable).with_script([Reply::Accept]));
        let p = pipeline(
            Storage::open_in_memory().unwrap(),
            endpoint,
            Connectivity::Offline,
        );
        p.client().submit(&survey(1)).await.unwrap();
        p.client().submit(&survey(2)).await.unwrap();

        p.monitor().set(Connectivity::Online);
        let report = p.engine().sync_all().await.unwrap();

        assert_eq!((report.delivered, report.failed), (1, 1));
        let left = p.queue().list_all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload, survey(2));
    }

    #[tokio::test]
    async fn test_queued_surveys_survive_restart_and_deliver_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("pending.db");

        {
            let p = pipeline(
                Storage::open(&db).unwrap(),
                Arc::new(ScriptedEndpoint::accepting()),
                Connectivity::Offline,
            );
            for n in 1..=3 {
                assert!(p.client().submit(&survey(n)).await.unwrap().queued);
            }
        }

        let endpoint = Arc::new(
            ScriptedEndpoint::accepting().with_script([Reply::Unreachable, Reply::Reject(503)]),
        );
        let p = pipeline(Storage::open(&db).unwrap(), endpoint.clone(), Connectivity::Online);
        assert_eq!(p.queue().count().unwrap(), 3);

        while p.queue().count().unwrap() > 0 {
            p.engine().sync_all().await.unwrap();
        }

        let mut accepted = endpoint.accepted();
        accepted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(accepted, vec![survey(1), survey(2), survey(3)]);
    }

    #[tokio::test]
    async fn test_watch_syncs_on_start() {
        let endpoint = Arc::new(ScriptedEndpoint::accepting().with_script([Reply::Unreachable]));
        let p = pipeline(
            Storage::open_in_memory().unwrap(),
            endpoint.clone(),
            Connectivity::Online,
        );
        assert!(p.client().submit(&survey(1)).await.unwrap().queued);

        let watch = p.spawn_watch();
        tokio::time::timeout(Duration::from_secs(5), async {
            while p.queue().count().unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("watch never synced");
        watch.shutdown().await;

        assert_eq!(endpoint.accepted(), vec![survey(1)]);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_pass() {
        let endpoint = Arc::new(
            ScriptedEndpoint::accepting()
                .with_script([Reply::Unreachable])
                .with_delay(Duration::from_millis(100)),
        );
        let p = pipeline(
            Storage::open_in_memory().unwrap(),
            endpoint.clone(),
            Connectivity::Online,
        );
        assert!(p.client().submit(&survey(1)).await.unwrap().queued);

        let watch = p.spawn_watch();
        tokio::time::sleep(Duration::from_millis(20)).await;
        watch.shutdown().await;

        assert_eq!(p.queue().count().unwrap(), 0);
        assert_eq!(endpoint.accepted(), vec![survey(1)]);
    }

    #[test]
    fn test_refresh_connectivity_follows_signal() {
        let p = pipeline(
            Storage::open_in_memory().unwrap(),
            Arc::new(ScriptedEndpoint::accepting()),
            Connectivity::Offline,
        );
        p.monitor().set(Connectivity::Online);

        assert_eq!(p.refresh_connectivity(), Connectivity::Offline);
        assert!(!p.monitor().is_online());
    }

    #[test]
    fn test_signal_for_modes() {
        assert_eq!(signal_for(ConnectivityMode::Online).current(), Connectivity::Online);
        assert_eq!(signal_for(ConnectivityMode::Offline).current(), Connectivity::Offline);
        assert_eq!(signal_for(ConnectivityMode::Auto).name(), "native");
    }

    #[test]
    fn test_schedule_from_config() {
        let p = pipeline(
            Storage::open_in_memory().unwrap(),
            Arc::new(ScriptedEndpoint::accepting()),
            Connectivity::Online,
        );
        assert_eq!(
            p.schedule(),
            AutoSyncSchedule {
                debounce: Duration::from_millis(500),
                interval: Some(Duration::from_secs(300)),
                on_start: true,
            }
        );
    }
}
