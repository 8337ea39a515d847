use std::fmt;

use serde::{Deserialize, Serialize};

use super::store::{TokenKey, TokenStore};

/// Where the local session stands, judged from what the token store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No tokens at all; only a login gets out of here
    Unauthenticated,
    /// An access token is current (it may still be rejected as expired)
    Authenticated,
    /// Only a refresh token is left
    NeedsRefresh,
}

impl SessionState {
    pub fn from_store(store: &dyn TokenStore) -> Self {
        match (store.get(TokenKey::Access), store.get(TokenKey::Refresh)) {
            (Some(_), _) => SessionState::Authenticated,
            (None, Some(_)) => SessionState::NeedsRefresh,
            (None, None) => SessionState::Unauthenticated,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticated => "authenticated",
            SessionState::NeedsRefresh => "needs refresh",
        };
        f.write_str(label)
    }
}

/// Account roles accepted by the backend's login and registration endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Assistant,
    Manager,
    Developer,
    Designer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Assistant => "assistant",
            Role::Manager => "manager",
            Role::Developer => "developer",
            Role::Designer => "designer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "assistant" => Ok(Role::Assistant),
            "manager" => Ok(Role::Manager),
            "developer" => Ok(Role::Developer),
            "designer" => Ok(Role::Designer),
            other => Err(format!(
                "unknown role '{}' (expected admin, assistant, manager, developer or designer)",
                other
            )),
        }
    }
}

/// Access/refresh pair as issued by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    /// Overwrite both stored tokens
    pub fn store(&self, store: &dyn TokenStore) -> anyhow::Result<()> {
        store.set(TokenKey::Access, &self.access)?;
        store.set(TokenKey::Refresh, &self.refresh)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserSummary {
    pub full_name: String,
    pub email: String,
    pub role: String,
}

/// Body returned by `POST /api/login/`.
///
/// The backend nests the pair under `tokens`; older deployments return it
/// flat as `access`/`refresh`. Both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<UserSummary>,
    #[serde(default)]
    tokens: Option<TokenPair>,
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
}

impl LoginResponse {
    pub fn token_pair(&self) -> Option<TokenPair> {
        if let Some(ref tokens) = self.tokens {
            return Some(tokens.clone());
        }
        match (&self.access, &self.refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair {
                access: access.clone(),
                refresh: refresh.clone(),
            }),
            _ => None,
        }
    }
}
