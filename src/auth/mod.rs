// Authentication module
// OAuth2 authorization-code flow: authorization URL, code exchange, refresh, expiry

mod grant;
mod manager;
mod types;

pub use manager::TokenManager;
pub use types::{OAuthRequestContext, TokenResponse, TokenSet};
