//! Matchlog Server Library
//!
//! HTTP server that ingests free-text event logs streamed by game-server
//! processes and converts them into structured, typed events.
//!
//! # Overview
//!
//! Raw bytes arrive at the ingestion endpoint and are split into lines. Each
//! line is persisted verbatim, then routed through the pipeline:
//!
//! - **Envelope extraction** normalizes transport wrappers into the canonical
//!   event string ([`pipeline::envelope`])
//! - **Classification** runs the structured line grammar first and falls back
//!   to an ordered heuristic rule table ([`pipeline::classify`])
//! - **Block assembly** reconstructs multi-line JSON dumps that arrive
//!   interleaved with ordinary lines ([`pipeline::assembler`])
//! - **Dispatch** keeps one worker per source so lines are processed in
//!   arrival order ([`pipeline::dispatch`])
//!
//! Classified events and parse failures are appended through the
//! [`storage::LogStore`] trait; session correlation and source authorization
//! are pluggable collaborators ([`session`], [`access`]).
//!
//! # Framework Stack
//!
//! - **Axum**: HTTP ingestion boundary
//! - **SQLx**: PostgreSQL persistence
//! - **Tokio**: per-source worker tasks and background sweeps

pub mod access;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use error::{AppError, AppResult};
