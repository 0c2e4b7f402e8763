#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the promptpos point-of-sale client.
//!
//! This crate holds the pieces of the POS client tier that have a real, testable
//! contract and no I/O of their own:
//!
//! - the PromptPay payload encoder, which turns a payee identifier and a baht amount
//!   into an EMVCo-compliant QR string,
//! - the wire and storage types shared by the member session machinery in
//!   `promptpos-reqwest`.
//!
//! # Modules
//!
//! - [`config`] - Environment variable resolution for configuration values
//! - [`promptpay`] - EMVCo TLV encoding, CRC16 checksum, PromptPay targets
//! - [`session`] - Token pairs, refresh/logout bodies, auth error codes, storage keys
//! - [`timestamp`] - Epoch-millisecond timestamps used for token expiry
//! - [`util`] - Helper types (baht amounts)
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod config;
pub mod promptpay;
pub mod session;
pub mod timestamp;
pub mod util;
