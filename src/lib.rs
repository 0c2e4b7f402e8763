//! PromptPay payloads and member sessions for point-of-sale terminals.
//!
//! This crate is the `promptpos` command line tool. The payload encoder lives in
//! [`promptpos_types::promptpay`]; the token refresh coordinator and its
//! `reqwest` middleware live in [`promptpos_reqwest`]. What is here wires them
//! to a configuration file, a file-backed token store, logging and signal
//! handling.
//!
//! # Modules
//!
//! - [`config`] - Command line and JSON configuration
//! - [`reset`] - Operator notification and client reset on session end
//! - [`run`] - Command dispatch
//! - [`telemetry`] - `tracing` subscriber and optional OTLP export
//! - [`terminal`] - The authenticated API client of one terminal
//! - [`util`] - Signal handling

pub mod config;
pub mod reset;
pub mod run;
pub mod telemetry;
pub mod terminal;
pub mod util;

pub use promptpos_reqwest;
pub use promptpos_types;
