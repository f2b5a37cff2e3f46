//! Change-data-capture pipeline.
//!
//! Consumes a PostgreSQL logical-replication stream (wal2json), decodes it
//! into [`ChangeEvent`](vigil_core::change::ChangeEvent)s, and drives them
//! through the trigger-matching and notification pipeline:
//!
//! - [`client`] -- wire-level replication-protocol client.
//! - [`decoder`] -- pure wal2json payload → change-event translation.
//! - [`session`] -- publication/slot setup, streaming, acknowledgement.
//! - [`listener`] -- the supervised dispatch loop with start/stop lifecycle.

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod listener;
pub mod session;

pub use config::CdcConfig;
pub use error::CdcError;
pub use listener::{CdcListener, ListenerState};
