use serde::{Deserialize, Serialize};

/// `RequestOutput` - snapshot of the generation state of a request.
///
/// Engines emit a sequence of these, each one carrying the full text
/// generated so far (not a delta). The last element of the sequence
/// holds the final output.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RequestOutput {
    /// Request id
    pub request_id: String,
    /// The prompt, as submitted
    pub prompt: Option<String>,
    /// Completion outputs, one per generated sequence
    pub outputs: Vec<CompletionOutput>,
    /// Is finished
    pub finished: bool,
}

/// `CompletionOutput` - generated text of a single sequence
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CompletionOutput {
    /// The index of the output in the request
    pub index: usize,
    /// The generated output text so far
    pub text: String,
    /// The reason why the sequence is finished, `None` while running
    pub finish_reason: Option<String>,
}
