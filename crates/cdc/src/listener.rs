//! Supervised CDC dispatch loop.
//!
//! [`CdcListener`] bridges the replication session's pull-based read loop
//! into asynchronous processing: a reader task owns the session, a worker
//! task owns the [`EventProcessor`], and a bounded channel with a per-batch
//! acknowledgement joins them. Events flow strictly in order; the reader does
//! not acknowledge a WAL message to the server until the worker has finished
//! every event in it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vigil_events::EventProcessor;

use crate::config::CdcConfig;
use crate::error::Result;
use crate::session::{ReplicationSession, WalBatch};

/// How long `stop` waits for each task before giving up on it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle states of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ListenerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

/// Runs the replication session off the request path and feeds its events to
/// the processing pipeline.
pub struct CdcListener {
    config: CdcConfig,
    pool: PgPool,
    processor: Arc<EventProcessor>,
    state: Arc<Mutex<ListenerState>>,
    cancel: Mutex<CancellationToken>,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl CdcListener {
    pub fn new(config: CdcConfig, pool: PgPool, processor: Arc<EventProcessor>) -> Self {
        Self {
            config,
            pool,
            processor,
            state: Arc::new(Mutex::new(ListenerState::Stopped)),
            cancel: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.lock().expect("listener state lock poisoned")
    }

    /// Start the dispatch loop.
    ///
    /// Idempotent: calling while not stopped logs a warning and returns
    /// without effect. Publication/slot setup runs here and its errors
    /// propagate; once the tasks are spawned, a failing read loop only logs
    /// and lands the listener back in [`ListenerState::Stopped`] -- there is
    /// no automatic reconnect.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock().expect("listener state lock poisoned");
            if *state != ListenerState::Stopped {
                tracing::warn!(state = ?*state, "CDC listener already running, ignoring start");
                return Ok(());
            }
            *state = ListenerState::Starting;
        }

        let session = match ReplicationSession::prepare(self.config.clone(), &self.pool).await {
            Ok(session) => session,
            Err(e) => {
                *self.state.lock().expect("listener state lock poisoned") =
                    ListenerState::Stopped;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        *self.cancel.lock().expect("listener cancel lock poisoned") = cancel.clone();

        // Capacity 1: at most one undecoded message ahead of the worker, so
        // downstream latency directly backpressures the read loop.
        let (batch_tx, batch_rx) = mpsc::channel::<WalBatch>(1);

        *self.state.lock().expect("listener state lock poisoned") = ListenerState::Running;

        let state = Arc::clone(&self.state);
        let reader = tokio::spawn(async move {
            match session.run(batch_tx, cancel).await {
                Ok(()) => tracing::info!("Replication read loop finished"),
                Err(e) => tracing::error!(error = %e, "Replication read loop failed"),
            }
            // Restarting after a failure requires an external start().
            *state.lock().expect("listener state lock poisoned") = ListenerState::Stopped;
        });
        let worker = tokio::spawn(run_worker(batch_rx, Arc::clone(&self.processor)));

        *self.tasks.lock().expect("listener tasks lock poisoned") = Some((reader, worker));
        tracing::info!("CDC listener started");
        Ok(())
    }

    /// Stop the dispatch loop.
    ///
    /// Idempotent: calling while already stopped logs a warning and returns.
    /// Cancellation is cooperative -- the reader observes it between reads, so
    /// an in-flight delivery always completes -- and bounded: tasks that
    /// outlive the grace period are left behind rather than aborted.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().expect("listener state lock poisoned");
            match *state {
                ListenerState::Stopped | ListenerState::Stopping => {
                    tracing::warn!(state = ?*state, "CDC listener is not running, ignoring stop");
                    return;
                }
                _ => *state = ListenerState::Stopping,
            }
        }

        self.cancel
            .lock()
            .expect("listener cancel lock poisoned")
            .cancel();

        let tasks = self
            .tasks
            .lock()
            .expect("listener tasks lock poisoned")
            .take();
        if let Some((reader, worker)) = tasks {
            // Reader first: when it exits, the batch channel closes and the
            // worker drains out on its own.
            if tokio::time::timeout(SHUTDOWN_GRACE, reader).await.is_err() {
                tracing::warn!("Replication reader did not stop within the grace period");
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, worker).await.is_err() {
                tracing::warn!("Dispatch worker did not stop within the grace period");
            }
        }

        *self.state.lock().expect("listener state lock poisoned") = ListenerState::Stopped;
        tracing::info!("CDC listener stopped");
    }
}

/// Drain batches, processing each event to completion before acknowledging
/// the batch back to the reader.
async fn run_worker(mut batches: mpsc::Receiver<WalBatch>, processor: Arc<EventProcessor>) {
    while let Some(batch) = batches.recv().await {
        for event in &batch.events {
            processor.process_change_event(event).await;
        }
        // The reader is blocked on this before it acknowledges the message.
        let _ = batch.done.send(());
    }
    tracing::debug!("Dispatch worker finished");
}
