//! Request and response types for the generative text service.
//!
//! All structs derive `Serialize` and `Deserialize` for JSON conversion
//! matching the service's `/v1/generate` endpoint.

use serde::{Deserialize, Serialize};

/// Request body for the `/v1/generate` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Label for the kind of content being requested (e.g. "outline").
    pub task: String,
    /// The full prompt, including any corrective feedback from a
    /// previous validation failure.
    pub prompt: String,
    /// Maximum number of tokens in the generated response.
    pub max_tokens: u32,
}

/// Response returned by the `/v1/generate` endpoint.
///
/// The `text` field is expected to parse into the JSON shape declared by
/// the requesting task kind; the caller validates that, not this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Unique identifier assigned by the service.
    pub id: String,
    /// Generated text. Free-form from the service's point of view.
    pub text: String,
    /// Model that produced the response.
    pub model: String,
    /// Token accounting for this call.
    pub usage: Usage,
}

/// Token consumption statistics for one service call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
