//! Logical-replication session.
//!
//! Owns one replication subscription end to end: idempotent publication and
//! slot setup, the streaming read loop, and position acknowledgement. Decoded
//! events are handed to the processing side through a channel of
//! [`WalBatch`]es; the server acknowledgement for a message is withheld until
//! the receiver confirms that every event in it has been fully processed.

use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use vigil_core::change::ChangeEvent;

use crate::client::{ReplicationClient, WalFrame};
use crate::config::CdcConfig;
use crate::decoder;
use crate::error::Result;

/// Tables exposed through the publication. `monitor_tags` is published for
/// completeness but maps to no entity type, so the decoder drops its changes.
const PUBLISHED_TABLES: &[&str] = &[
    "public.monitor",
    "public.monitor_statuses",
    "public.tags",
    "public.monitor_tags",
];

/// One decoded replication message in flight to the processing side.
///
/// The receiver must fire `done` once every event has been processed; the
/// reader holds back the server acknowledgement until then.
pub struct WalBatch {
    pub events: Vec<ChangeEvent>,
    pub done: oneshot::Sender<()>,
}

/// A prepared replication session for one slot/publication pair.
pub struct ReplicationSession {
    config: CdcConfig,
}

impl ReplicationSession {
    /// Verify that the publication and slot exist, creating either if absent.
    ///
    /// Both checks query current state first, so this is safe to repeat
    /// across process restarts.
    pub async fn prepare(config: CdcConfig, pool: &PgPool) -> Result<Self> {
        ensure_publication(pool, &config.publication_name).await?;
        ensure_slot(pool, &config.slot_name).await?;
        Ok(Self { config })
    }

    /// Open the replication connection and drive the read loop until
    /// cancellation, stream end, or a fatal error.
    pub async fn run(
        self,
        batches: mpsc::Sender<WalBatch>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let client = ReplicationClient::connect(&self.config.database_url).await?;
        let mut stream = client.start_replication(&self.config.slot_name).await?;
        tracing::info!(
            slot = %self.config.slot_name,
            publication = %self.config.publication_name,
            "Replication streaming started"
        );

        // Highest LSN whose events have been fully processed.
        let mut flushed_lsn: u64 = 0;

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(slot = %self.config.slot_name, "Replication session stopping");
                    return Ok(());
                }
                frame = stream.next_frame() => frame?,
            };

            match frame {
                WalFrame::Idle => continue,
                WalFrame::Closed => {
                    tracing::info!("Replication stream closed by server");
                    return Ok(());
                }
                WalFrame::Keepalive { reply_requested, .. } => {
                    if reply_requested {
                        // Report only what has actually been processed.
                        stream.send_status_update(flushed_lsn).await?;
                    }
                }
                WalFrame::XLogData { start_lsn, payload } => {
                    let events = match decoder::decode_payload(&payload) {
                        Ok(events) => events,
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                start_lsn,
                                "Skipping malformed replication message"
                            );
                            continue;
                        }
                    };

                    if !events.is_empty() {
                        let (done, processed) = oneshot::channel();
                        if batches.send(WalBatch { events, done }).await.is_err() {
                            tracing::info!("Batch receiver dropped, stopping session");
                            return Ok(());
                        }
                        // Acknowledging before this resolves could lose
                        // events on a crash.
                        if processed.await.is_err() {
                            tracing::info!(
                                "Processor dropped an unfinished batch, stopping session"
                            );
                            return Ok(());
                        }
                    }

                    stream.send_status_update(start_lsn).await?;
                    flushed_lsn = start_lsn;
                }
            }
        }
    }
}

/// Create the publication when `pg_publication` does not list it yet.
async fn ensure_publication(pool: &PgPool, name: &str) -> Result<()> {
    let exists: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM pg_publication WHERE pubname = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;

    if exists.is_none() {
        let statement = format!(
            "CREATE PUBLICATION {} FOR TABLE {}",
            quote_identifier(name),
            PUBLISHED_TABLES.join(", ")
        );
        sqlx::query(&statement).execute(pool).await?;
        tracing::info!(publication = %name, "Created publication");
    }
    Ok(())
}

/// Create the wal2json slot when `pg_replication_slots` does not list it yet.
async fn ensure_slot(pool: &PgPool, name: &str) -> Result<()> {
    let exists: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM pg_replication_slots WHERE slot_name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;

    if exists.is_none() {
        sqlx::query("SELECT pg_create_logical_replication_slot($1, 'wal2json')")
            .bind(name)
            .execute(pool)
            .await?;
        tracing::info!(slot = %name, "Created replication slot");
    }
    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
