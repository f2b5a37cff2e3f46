//! REST surface of the vigil service.
//!
//! Thin persistence-backed handlers for trigger definitions and recorded
//! trigger events, plus the config/state/error plumbing the binary wires
//! together. The CDC pipeline itself lives in `vigil-cdc`; the two share
//! nothing but the database.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
