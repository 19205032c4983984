use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{
    config::EngineArgs,
    llm_engine::{AsyncEngine, EngineError, RequestOutputStream},
    sampling_params::SamplingParams,
    types::{CompletionOutput, RequestOutput},
};

const FINISH_REASON_STOP: &str = "stop";
const FINISH_REASON_LENGTH: &str = "length";

/// `EchoEngine` - in-process engine that streams the prompt back.
///
/// Every whitespace separated word counts as one token. The engine emits
/// one snapshot per token, until the prompt is exhausted or `max_tokens`
/// is reached. Handy for smoke runs of a deployment without GPUs.
pub struct EchoEngine {
    engine_args: EngineArgs,
}

impl EchoEngine {
    /// Constructor
    pub fn new(engine_args: EngineArgs) -> Self {
        Self { engine_args }
    }
}

#[async_trait]
impl AsyncEngine for EchoEngine {
    #[instrument(skip(self, prompt, sampling_params))]
    fn generate(
        &self,
        prompt: Option<String>,
        sampling_params: SamplingParams,
        request_id: String,
    ) -> Result<RequestOutputStream, EngineError> {
        let prompt = prompt.ok_or_else(|| EngineError::MissingPrompt(request_id.clone()))?;
        let snapshots = echo_snapshots(&request_id, &prompt, sampling_params.max_tokens());
        debug!(
            "Echoing {} snapshots for request with id = {request_id}",
            snapshots.len()
        );
        Ok(Box::pin(futures::stream::iter(snapshots.into_iter().map(Ok))))
    }

    async fn check_health(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn engine_args(&self) -> &EngineArgs {
        &self.engine_args
    }
}

/// Cumulative snapshots of echoing `prompt`, at most `max_tokens` words long.
fn echo_snapshots(request_id: &str, prompt: &str, max_tokens: usize) -> Vec<RequestOutput> {
    let words = prompt.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() {
        return vec![snapshot(request_id, prompt, String::new(), Some(FINISH_REASON_STOP))];
    }

    let num_tokens = words.len().min(max_tokens);
    (1..=num_tokens)
        .map(|n| {
            let finish_reason = match (n == num_tokens, num_tokens < words.len()) {
                (false, _) => None,
                (true, true) => Some(FINISH_REASON_LENGTH),
                (true, false) => Some(FINISH_REASON_STOP),
            };
            snapshot(request_id, prompt, words[..n].join(" "), finish_reason)
        })
        .collect()
}

fn snapshot(
    request_id: &str,
    prompt: &str,
    text: String,
    finish_reason: Option<&str>,
) -> RequestOutput {
    RequestOutput {
        request_id: request_id.to_string(),
        prompt: Some(prompt.to_string()),
        outputs: vec![CompletionOutput {
            index: 0,
            text,
            finish_reason: finish_reason.map(str::to_string),
        }],
        finished: finish_reason.is_some(),
    }
}
