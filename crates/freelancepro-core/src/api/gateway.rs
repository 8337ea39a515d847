//! Authenticated request gateway.
//!
//! Every call carries `Authorization: Bearer <access_token>` read from the
//! injected `TokenStore`. A 401 triggers one refresh against
//! `/api/token/refresh/` and, if that succeeds, exactly one retry of the
//! original request. Responses are handed back untouched.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{TokenKey, TokenStore};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when nothing else is configured (local Django dev server)
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Token refresh endpoint, relative to the base URL
pub const REFRESH_PATH: &str = "/api/token/refresh/";

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Method, headers and body of a gateway call.
///
/// Kept by value so the retry after a refresh is the identical request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as JSON and set the content type
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }
}

/// How a gateway call ended.
#[derive(Debug)]
pub enum Outcome {
    /// First attempt was not rejected as unauthorized
    Success(Response),
    /// First attempt got 401, refresh succeeded, this is the retry's response
    Retried(Response),
    /// First attempt got 401 and refresh failed; this is the original 401
    RefreshFailed(Response),
}

impl Outcome {
    pub fn response(&self) -> &Response {
        match self {
            Outcome::Success(r) | Outcome::Retried(r) | Outcome::RefreshFailed(r) => r,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            Outcome::Success(r) | Outcome::Retried(r) | Outcome::RefreshFailed(r) => r,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.response().status()
    }
}

/// Result of a single authorized attempt
enum Attempt {
    Success(Response),
    NeedsRefresh(Response),
}

impl Attempt {
    fn classify(response: Response) -> Self {
        if response.status() == StatusCode::UNAUTHORIZED {
            Attempt::NeedsRefresh(response)
        } else {
            Attempt::Success(response)
        }
    }

    fn into_response(self) -> Response {
        match self {
            Attempt::Success(r) | Attempt::NeedsRefresh(r) => r,
        }
    }
}

/// Bearer-token gateway over a shared `reqwest::Client`.
/// Clone is cheap - the client and the store are both reference counted.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
}

impl Gateway {
    /// Create a gateway with no request timeout
    pub fn new(base_url: &str, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, store, None)
    }

    pub fn with_timeout(
        base_url: &str,
        store: Arc<dyn TokenStore>,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, base_url, store))
    }

    /// Create a gateway sharing an existing connection pool
    pub fn with_client(client: Client, base_url: &str, store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }

    /// The underlying client, for calls that must not carry credentials
    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// Resolve a path against the base URL; absolute URLs pass through
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Perform an authenticated request, refreshing and retrying once on 401.
    ///
    /// Only transport failures are errors; any HTTP status, including a 401
    /// that could not be recovered, comes back as the response.
    pub async fn request(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response, ApiError> {
        self.send(url, options).await.map(Outcome::into_response)
    }

    /// Like [`Gateway::request`], but reports which path the call took.
    pub async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Outcome, ApiError> {
        let url = self.url(url);

        let original = match self.attempt(&url, options).await? {
            Attempt::Success(response) => return Ok(Outcome::Success(response)),
            Attempt::NeedsRefresh(response) => response,
        };

        debug!(url = %url, "Unauthorized, attempting token refresh");
        match self.refresh().await {
            Ok(()) => {
                let retried = self.attempt(&url, options).await?.into_response();
                debug!(url = %url, status = %retried.status(), "Retried after refresh");
                Ok(Outcome::Retried(retried))
            }
            Err(e) => {
                warn!(
                    url = %url,
                    error = %e,
                    "Token refresh failed, returning original response"
                );
                Ok(Outcome::RefreshFailed(original))
            }
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Makes at most one network call, directly on the HTTP client. On any
    /// failure the store is left as it was.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let refresh_token = self
            .store
            .get(TokenKey::Refresh)
            .ok_or(ApiError::RefreshUnavailable)?;

        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest {
                refresh: &refresh_token,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::RefreshRejected {
                status,
                body: ApiError::truncate_body(&body),
            });
        }

        let refreshed: RefreshResponse = serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!("Malformed token refresh response: {}", e))
        })?;

        self.store.set(TokenKey::Access, &refreshed.access)?;
        info!("Access token refreshed");
        Ok(())
    }

    async fn attempt(&self, url: &str, options: &RequestOptions) -> Result<Attempt, ApiError> {
        let token = self.store.get(TokenKey::Access);
        let headers = Self::authorized_headers(&options.headers, token.as_deref())?;

        let mut request = self
            .client
            .request(options.method.clone(), url)
            .headers(headers);
        if let Some(ref body) = options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        debug!(
            method = %options.method,
            url = url,
            status = %response.status(),
            "Request completed"
        );
        Ok(Attempt::classify(response))
    }

    /// Caller headers with `Authorization` replaced by the bearer token.
    /// A missing token still yields the header, with an empty credential.
    fn authorized_headers(
        headers: &HeaderMap,
        token: Option<&str>,
    ) -> Result<HeaderMap, ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.unwrap_or_default()))
            .map_err(|_| ApiError::InvalidToken)?;
        value.set_sensitive(true);

        let mut merged = headers.clone();
        merged.insert(header::AUTHORIZATION, value);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    fn gateway(base: &str) -> Gateway {
        Gateway::new(base, Arc::new(MemoryTokenStore::new())).unwrap()
    }

    #[test]
    fn test_url_resolution() {
        let gw = gateway("http://localhost:8000/");
        assert_eq!(gw.base_url(), "http://localhost:8000");
        assert_eq!(gw.url("/api/clients/"), "http://localhost:8000/api/clients/");
        assert_eq!(gw.url("api/bds/"), "http://localhost:8000/api/bds/");
        assert_eq!(gw.url(REFRESH_PATH), "http://localhost:8000/api/token/refresh/");
        assert_eq!(gw.url("https://other.example/api/x/"), "https://other.example/api/x/");
    }

    #[test]
    fn test_authorized_headers_override_caller_authorization() {
        let mut caller = HeaderMap::new();
        caller.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        caller.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let merged = Gateway::authorized_headers(&caller, Some("abc")).unwrap();
        assert_eq!(merged.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(merged.get_all(header::AUTHORIZATION).iter().count(), 1);
        assert_eq!(merged.get(header::ACCEPT).unwrap(), "application/json");
        // Caller's map is untouched
        assert_eq!(caller.get(header::AUTHORIZATION).unwrap(), "Basic Zm9vOmJhcg==");
    }

    #[test]
    fn test_authorized_headers_without_token() {
        let merged = Gateway::authorized_headers(&HeaderMap::new(), None).unwrap();
        assert_eq!(merged.get(header::AUTHORIZATION).unwrap(), "Bearer ");
    }

    #[test]
    fn test_authorized_headers_rejects_invalid_token() {
        let result = Gateway::authorized_headers(&HeaderMap::new(), Some("bad\ntoken"));
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_request_options_json() {
        let options = RequestOptions::post()
            .json(&serde_json::json!({"client_name": "Acme"}))
            .unwrap();
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(options.body.as_deref(), Some(br#"{"client_name":"Acme"}"#.as_slice()));
        assert_eq!(RequestOptions::default().method, Method::GET);
    }

    #[tokio::test]
    async fn test_refresh_without_token_fails_fast() {
        // Unroutable base URL: any network call would error differently
        let gw = gateway("http://127.0.0.1:9");
        assert!(matches!(gw.refresh().await, Err(ApiError::RefreshUnavailable)));
    }
}
