#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Reqwest middleware that keeps a promptpos member session authenticated.
//!
//! Every request sent through the wrapped client carries the stored access
//! token. When the API answers `401` with an expired or invalid token code, the
//! middleware refreshes the token pair once, no matter how many requests hit the
//! expiry at the same moment, and replays each of them with the new token. A
//! timer refreshes proactively two minutes before the access token lapses, and
//! a refresh that fails ends the session through a [`SessionListener`].
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use promptpos_reqwest::{
//!     FileTokenStore, HttpAuthApi, ReqwestWithSession, ReqwestWithSessionBuild, SessionCoordinator,
//! };
//! use reqwest::Client;
//!
//! let api = HttpAuthApi::try_from("https://pos.example.com/api")?;
//! let coordinator = SessionCoordinator::builder(FileTokenStore::new("session.json"), api).build();
//! coordinator.resume().await?;
//!
//! let http_client = Client::new().with_session(coordinator.clone()).build();
//! let points = http_client
//!     .get("https://pos.example.com/api/member/points")
//!     .send()
//!     .await?;
//! ```
//!
//! ## Pieces
//!
//! - [`TokenStore`] persists the token pair and its expiry ([`MemoryTokenStore`], [`FileTokenStore`]).
//! - [`AuthApi`] performs the refresh and logout calls ([`HttpAuthApi`]).
//! - [`SessionCoordinator`] serializes refreshes and owns the auto-refresh timer.
//! - [`SessionListener`] is told when the session ends and resets client state.

mod auth_api;
mod builder;
mod coordinator;
mod error;
mod listener;
mod middleware;
mod store;

pub use auth_api::*;
pub use builder::*;
pub use coordinator::{SessionCoordinator, SessionCoordinatorBuilder};
pub use error::*;
pub use listener::*;
pub use middleware::*;
pub use store::*;
