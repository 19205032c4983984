//! Engine side of the deployment: the arguments an inference engine is built from,
//! per request sampling parameters, and the `AsyncEngine` interface behind which a
//! PagedAttention engine (vLLM and friends) is driven.

pub mod config;
pub mod echo;
pub mod llm_engine;
pub mod openai;
pub mod sampling_params;
#[cfg(test)]
pub mod tests;
pub mod types;

pub use config::{EngineArgs, EngineArgsError, EngineBackend, Quantization};
pub use llm_engine::{engine_from_args, AsyncEngine, EngineError, RequestOutputStream};
pub use sampling_params::{SamplingParams, SamplingParamsError, SamplingStrategy};
pub use types::{CompletionOutput, RequestOutput};
