use serde::{Deserialize, Serialize};

/// Body of the token refresh request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshRequest {
    /// Long-lived refresh credential
    pub refresh: String,
}

/// Response of the token refresh endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshResponse {
    /// New short-lived access token
    pub access: String,
    /// Present when the server rotates refresh tokens
    #[serde(default)]
    pub refresh: Option<String>,
}
