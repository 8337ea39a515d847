//! Session credentials and where they live.
//!
//! This module provides:
//! - `TokenStore`: the injected key-value interface holding the access and
//!   refresh tokens, with in-memory, JSON file and OS keyring backends
//! - `SessionState`: unauthenticated / authenticated / needs-refresh, derived
//!   from the store
//! - Login payload types (`Role`, `TokenPair`, `LoginResponse`)

pub mod keychain;
pub mod session;
pub mod store;

pub use keychain::KeyringTokenStore;
pub use session::{LoginResponse, Role, SessionState, TokenPair, UserSummary};
pub use store::{FileTokenStore, MemoryTokenStore, TokenKey, TokenStore};
