use serde::{Deserialize, Serialize};

/// Error body returned by the REST API (`{"detail": "...", "code": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable error message
    pub detail: String,

    /// Machine-readable code, e.g. `token_not_valid`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
