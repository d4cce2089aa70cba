//! Wire shapes for the analysis agent API.

use serde::{Deserialize, Serialize};

/// `POST /createSession` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub owner: String,
    /// The formatted conversation transcript, used as the session's
    /// initial description.
    pub description: String,
    pub enhance_prompt: bool,
}

/// `POST /createSession` success response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// `POST /chat` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}
