//! Process-level helpers for the `promptpos` binary.
//!
//! - [`sig_down`] - Graceful shutdown on SIGTERM/SIGINT

pub mod sig_down;

pub use sig_down::*;
