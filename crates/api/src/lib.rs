// API crate clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! TrustList API Library
//!
//! This crate contains the HTTP surface of the TrustList directory's
//! subscription engine: owner-facing subscription routes, payment
//! routes including the gateway webhook, and the admin back-office
//! for reviewing upgrade requests.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
