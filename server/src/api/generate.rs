use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of a generation request.
///
/// `prompt` is not validated here, a missing prompt is forwarded to the engine
/// which decides how to fail.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct DeploymentRequest {
    /// The prompt to generate from
    #[serde(default)]
    pub prompt: Option<String>,
    /// Whether the caller asked for incremental delivery. Accepted, but only
    /// the final output is ever returned.
    #[serde(default)]
    pub stream: bool,
    /// Maximum number of tokens to generate, defaults to 512
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

/// Final generated text, tagged with the id the request was submitted under.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct DeploymentResponse {
    /// Request id, 16 hex characters
    pub id: String,
    /// Generated text
    pub text: String,
}
