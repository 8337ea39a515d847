//! REST API access for the FreelancePro backend.
//!
//! This module provides the `Gateway`, which attaches the bearer token to
//! every request and recovers from an expired access token with a single
//! refresh-and-retry, and the `ApiClient` built on top of it for login,
//! registration and typed JSON calls.
//!
//! The API uses JWT bearer authentication; tokens come from `/api/login/`
//! and are renewed through `/api/token/refresh/`.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::ApiClient;
pub use error::ApiError;
pub use gateway::{Gateway, Outcome, RequestOptions, DEFAULT_BASE_URL, REFRESH_PATH};
