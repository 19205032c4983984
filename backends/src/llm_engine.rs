use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    config::{EngineArgs, EngineArgsError, EngineBackend},
    echo::EchoEngine,
    openai::OpenAiEngine,
    sampling_params::SamplingParams,
    types::RequestOutput,
};

/// Lazy, finite and non restartable sequence of generation snapshots.
pub type RequestOutputStream = BoxStream<'static, Result<RequestOutput, EngineError>>;

/// `AsyncEngine` - interface to a continuously batching inference engine.
///
/// A single instance is built at startup and shared, behind an `Arc`,
/// by every in-flight request. Implementations are responsible for
/// interleaving concurrent callers; callers never lock.
#[async_trait]
pub trait AsyncEngine: Send + Sync {
    /// Submits a prompt for generation, under `request_id`.
    ///
    /// Each element of the returned stream holds progressively more
    /// complete output, the last one being final.
    fn generate(
        &self,
        prompt: Option<String>,
        sampling_params: SamplingParams,
        request_id: String,
    ) -> Result<RequestOutputStream, EngineError>;

    /// Checks the engine is able to serve requests
    async fn check_health(&self) -> Result<(), EngineError>;

    /// The arguments the engine was built from
    fn engine_args(&self) -> &EngineArgs;
}

/// Builds the process wide engine handle from `EngineArgs`.
#[instrument(skip_all, fields(model = %engine_args.model()))]
pub fn engine_from_args(engine_args: EngineArgs) -> Result<Arc<dyn AsyncEngine>, EngineError> {
    engine_args.verify_args()?;

    info!(
        tensor_parallel_size = engine_args.tensor_parallel_size(),
        gpu_memory_utilization = engine_args.gpu_memory_utilization(),
        quantization = ?engine_args.quantization(),
        max_num_seqs = engine_args.max_num_seqs(),
        trust_remote_code = engine_args.trust_remote_code(),
        "Building engine.."
    );

    let engine: Arc<dyn AsyncEngine> = match engine_args.backend().clone() {
        EngineBackend::Echo => Arc::new(EchoEngine::new(engine_args)),
        EngineBackend::OpenAi { api_base, api_key } => {
            Arc::new(OpenAiEngine::new(engine_args, api_base, api_key))
        }
    };
    Ok(engine)
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid engine args: `{0}`")]
    InvalidEngineArgs(#[from] EngineArgsError),
    #[error("Missing prompt for request with id = `{0}`")]
    MissingPrompt(String),
    #[error("Backend error: `{0}`")]
    Backend(String),
    #[error("Model `{0}` is not served by the backend")]
    ModelNotServed(String),
}
