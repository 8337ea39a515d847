//! API client for the FreelancePro REST backend.
//!
//! `ApiClient` owns the session lifecycle (login, registration, logout) and
//! offers typed JSON helpers whose calls all go through the [`Gateway`], so
//! an expired access token is refreshed transparently.

use std::sync::Arc;

use reqwest::{header, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{LoginResponse, Role, SessionState, TokenStore, UserSummary};

use super::gateway::{Gateway, RequestOptions};
use super::ApiError;

/// Login endpoint, relative to the base URL
const LOGIN_PATH: &str = "/api/login/";

/// Registration endpoint, relative to the base URL
const REGISTER_PATH: &str = "/api/register/";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    role: Role,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    role: Role,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Typed client over the authenticated gateway.
/// Clone is cheap - the gateway shares its connection pool and token store.
#[derive(Clone)]
pub struct ApiClient {
    gateway: Gateway,
}

impl ApiClient {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Convenience constructor: default client, no timeout
    pub fn connect(base_url: &str, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Ok(Self::new(Gateway::new(base_url, store)?))
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_store(self.gateway.store())
    }

    /// Log in and store the issued access/refresh pair.
    ///
    /// The login call itself is unauthenticated and never goes through the
    /// refresh path.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Option<UserSummary>, ApiError> {
        let response = self
            .gateway
            .http()
            .post(self.gateway.url(LOGIN_PATH))
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest {
                email,
                password,
                role,
            })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let login: LoginResponse = Self::parse_json(response, LOGIN_PATH).await?;

        let tokens = login.token_pair().ok_or_else(|| {
            ApiError::InvalidResponse("Login response did not contain tokens".to_string())
        })?;
        tokens.store(self.gateway.store())?;

        info!(role = %role, "Logged in");
        Ok(login.user)
    }

    /// Create an account. Does not log in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<String, ApiError> {
        let response = self
            .gateway
            .http()
            .post(self.gateway.url(REGISTER_PATH))
            .header(header::ACCEPT, "application/json")
            .json(&RegisterRequest {
                username,
                email,
                password,
                role,
            })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body: MessageResponse = Self::parse_json(response, REGISTER_PATH).await?;
        info!(role = %role, "Registered account");
        Ok(body
            .message
            .unwrap_or_else(|| "User registered successfully".to_string()))
    }

    /// Forget both tokens locally. The backend keeps no server-side session.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.gateway.store().clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Exchange the refresh token for a new access token right now
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.gateway.refresh().await
    }

    // ===== Authenticated JSON helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(path, RequestOptions::get()).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.call(path, RequestOptions::post().json(body)?).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.call(path, RequestOptions::put().json(body)?).await
    }

    /// Delete a resource, returning the server's JSON reply (`null` if empty)
    pub async fn delete(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let response = self
            .gateway
            .request(path, &RequestOptions::delete())
            .await?;
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let options = options.header(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let response = self.gateway.request(path, &options).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, path).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(
        response: Response,
        path: &str,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        debug!(path = path, bytes = text.len(), "Response received");
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", path, e))
        })
    }
}
