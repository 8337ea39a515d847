//! Core library for the FreelancePro business suite client.
//!
//! - [`api`]: the authenticated request gateway (bearer token, refresh and
//!   retry once on 401) and the typed `ApiClient`
//! - [`auth`]: token stores and session state
//! - [`config`]: persisted client configuration

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError, Gateway, Outcome, RequestOptions};
pub use auth::{Role, SessionState, TokenKey, TokenStore};
pub use config::Config;
