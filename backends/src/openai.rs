use async_openai::{
    config::OpenAIConfig,
    types::{CompletionFinishReason, CreateCompletionRequest, CreateCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{error, info, instrument, trace};

use crate::{
    config::EngineArgs,
    llm_engine::{AsyncEngine, EngineError, RequestOutputStream},
    sampling_params::SamplingParams,
    types::{CompletionOutput, RequestOutput},
};

/// Number of completions requested per prompt
const NUM_CHOICES: u8 = 1;

/// `OpenAiEngine` - delegates generation to a remote OpenAI compatible
/// completions endpoint, such as the one served by vLLM.
///
/// The endpoint streams text deltas, which are folded into cumulative
/// `RequestOutput` snapshots so callers observe the same contract as
/// with an in-process engine.
pub struct OpenAiEngine {
    client: Client<OpenAIConfig>,
    engine_args: EngineArgs,
}

impl OpenAiEngine {
    /// Constructor
    pub fn new(engine_args: EngineArgs, api_base: String, api_key: Option<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_base(api_base);
        if let Some(api_key) = api_key {
            config = config.with_api_key(api_key);
        }
        Self {
            client: Client::with_config(config),
            engine_args,
        }
    }
}

#[async_trait]
impl AsyncEngine for OpenAiEngine {
    #[instrument(skip(self, prompt, sampling_params))]
    fn generate(
        &self,
        prompt: Option<String>,
        sampling_params: SamplingParams,
        request_id: String,
    ) -> Result<RequestOutputStream, EngineError> {
        let prompt = prompt.ok_or_else(|| EngineError::MissingPrompt(request_id.clone()))?;
        let max_tokens = u32::try_from(sampling_params.max_tokens())
            .map_err(|e| EngineError::Backend(e.to_string()))?;
        let request = CreateCompletionRequestArgs::default()
            .model(self.engine_args.model())
            .prompt(prompt.clone())
            .temperature(sampling_params.temperature())
            .top_p(sampling_params.top_p())
            .max_tokens(max_tokens)
            .n(NUM_CHOICES)
            .stream(true)
            .build()
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        Ok(Box::pin(completion_stream(
            self.client.clone(),
            request,
            request_id,
            prompt,
        )))
    }

    #[instrument(skip(self))]
    async fn check_health(&self) -> Result<(), EngineError> {
        let models = self
            .client
            .models()
            .list()
            .await
            .map_err(|e| EngineError::Backend(e.to_string()))?;
        let model = self.engine_args.model();
        if models.data.iter().any(|m| m.id == model) {
            info!("Backend is serving model {model}");
            Ok(())
        } else {
            Err(EngineError::ModelNotServed(model.to_string()))
        }
    }

    fn engine_args(&self) -> &EngineArgs {
        &self.engine_args
    }
}

/// Streams cumulative snapshots of a remote completion.
fn completion_stream(
    client: Client<OpenAIConfig>,
    request: CreateCompletionRequest,
    request_id: String,
    prompt: String,
) -> impl Stream<Item = Result<RequestOutput, EngineError>> {
    async_stream::try_stream! {
        let mut chunks = client
            .completions()
            .create_stream(request)
            .await
            .map_err(|e| EngineError::Backend(e.to_string()))?;
        let mut accumulator = OutputAccumulator::new(request_id.clone(), prompt);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| {
                error!("Completion stream failed for request with id = {request_id}: {e}");
                EngineError::Backend(e.to_string())
            })?;
            for choice in chunk.choices {
                trace!("Received delta for choice {}", choice.index);
                accumulator.push(
                    choice.index as usize,
                    &choice.text,
                    choice.finish_reason.as_ref().and_then(finish_reason_str),
                )?;
            }
            yield accumulator.snapshot();
        }
    }
}

fn finish_reason_str(reason: &CompletionFinishReason) -> Option<String> {
    serde_json::to_value(reason)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
}

/// Folds streamed text deltas into cumulative outputs, one per choice index.
pub(crate) struct OutputAccumulator {
    request_id: String,
    prompt: String,
    outputs: Vec<CompletionOutput>,
}

impl OutputAccumulator {
    pub(crate) fn new(request_id: String, prompt: String) -> Self {
        Self {
            request_id,
            prompt,
            outputs: vec![],
        }
    }

    /// Appends `delta` to the output at `index`, which must be one of the requested choices
    pub(crate) fn push(
        &mut self,
        index: usize,
        delta: &str,
        finish_reason: Option<String>,
    ) -> Result<(), EngineError> {
        if index >= usize::from(NUM_CHOICES) {
            return Err(EngineError::Backend(format!(
                "Unexpected choice index `{index}` for request with id = {}",
                self.request_id
            )));
        }
        while self.outputs.len() <= index {
            let next = self.outputs.len();
            self.outputs.push(CompletionOutput {
                index: next,
                text: String::new(),
                finish_reason: None,
            });
        }
        let output = &mut self.outputs[index];
        output.text.push_str(delta);
        if finish_reason.is_some() {
            output.finish_reason = finish_reason;
        }
        Ok(())
    }

    /// Current cumulative state
    pub(crate) fn snapshot(&self) -> RequestOutput {
        RequestOutput {
            request_id: self.request_id.clone(),
            prompt: Some(self.prompt.clone()),
            outputs: self.outputs.clone(),
            finished: !self.outputs.is_empty()
                && self.outputs.iter().all(|o| o.finish_reason.is_some()),
        }
    }
}
