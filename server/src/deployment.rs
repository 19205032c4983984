use std::{sync::Arc, time::Instant};

use futures::StreamExt;
use metrics::{counter, gauge};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, info, instrument, Span};
use vllm_deploy_backends::{
    engine_from_args, AsyncEngine, EngineArgs, EngineError, SamplingParams, SamplingParamsError,
};

use crate::{
    api::{DeploymentRequest, DeploymentResponse},
    config::DeploymentOptions,
};

/// Sampling temperature applied to every request
pub const TEMPERATURE: f32 = 0.7;
/// Nucleus sampling mass applied to every request
pub const TOP_P: f32 = 0.9;
/// Number of tokens generated when a request does not specify `max_tokens`
pub const DEFAULT_MAX_TOKENS: usize = 512;
/// Number of random bytes in a request id
const REQUEST_ID_NUM_BYTES: usize = 8;

/// `Deployment` - adapter between incoming requests and the inference engine.
///
/// Holds the process wide engine handle, built once from `EngineArgs`.
/// Cloning is cheap and every clone shares the same engine, concurrent
/// calls to `handle` interleave on it without any locking on our side.
#[derive(Clone)]
pub struct Deployment {
    /// Shared engine handle
    engine: Arc<dyn AsyncEngine>,
    /// Orchestrator facing options
    options: DeploymentOptions,
}

impl Deployment {
    /// Builds the engine from `engine_args` and wraps it in a new `Deployment`
    #[instrument(skip_all)]
    pub fn new(
        engine_args: EngineArgs,
        options: DeploymentOptions,
    ) -> Result<Self, DeploymentError> {
        options.verify()?;
        let model = engine_args.model().to_string();
        let engine = engine_from_args(engine_args)?;
        info!(
            health_check_period = ?options.health_check_period(),
            health_check_timeout = ?options.health_check_timeout(),
            "vLLM engine initialized for {model}"
        );
        Ok(Self::with_engine(engine, options))
    }

    /// Wraps an already built engine
    pub fn with_engine(engine: Arc<dyn AsyncEngine>, options: DeploymentOptions) -> Self {
        Self { engine, options }
    }

    /// Getter for the engine's `EngineArgs`
    pub fn engine_args(&self) -> &EngineArgs {
        self.engine.engine_args()
    }

    /// Getter for `options`
    pub fn options(&self) -> &DeploymentOptions {
        &self.options
    }

    /// Number of accelerators a replica requires, one per tensor parallel shard
    pub fn num_gpus(&self) -> usize {
        self.engine_args().tensor_parallel_size()
    }

    /// Builds the sampling parameters of a request
    pub fn sampling_params(max_tokens: Option<usize>) -> Result<SamplingParams, DeploymentError> {
        Ok(SamplingParams::new(
            TEMPERATURE,
            TOP_P,
            max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        )?)
    }

    /// Runs a request to completion and returns the final generated text.
    ///
    /// The engine's output stream is drained and only its last element is kept.
    /// An empty stream produces an empty text. Engine errors are returned as is,
    /// there is no retry and no timeout.
    #[instrument(skip_all, fields(request_id))]
    pub async fn handle(
        &self,
        request: DeploymentRequest,
    ) -> Result<DeploymentResponse, DeploymentError> {
        counter!("deployment-requests-total").increment(1);
        let start = Instant::now();
        let response = self.generate(request).await;
        match &response {
            Ok(response) => {
                gauge!("deployment-request-latency").set(start.elapsed().as_secs_f32());
                info!(
                    request_id = %response.id,
                    latency = ?start.elapsed(),
                    "Finished generation"
                );
            }
            Err(_) => counter!("deployment-requests-failed").increment(1),
        }
        response
    }

    async fn generate(
        &self,
        request: DeploymentRequest,
    ) -> Result<DeploymentResponse, DeploymentError> {
        let DeploymentRequest {
            prompt,
            stream,
            max_tokens,
        } = request;

        let sampling_params = Self::sampling_params(max_tokens)?;
        let request_id = generate_request_id();
        Span::current().record("request_id", request_id.as_str());
        info!(
            max_tokens = sampling_params.max_tokens(),
            "Submitting request with id = {request_id}"
        );

        if stream {
            debug!("Incremental delivery is not supported, only the final output is returned");
        }

        let mut results = self
            .engine
            .generate(prompt, sampling_params, request_id.clone())?;
        let mut final_output = None;
        while let Some(request_output) = results.next().await {
            final_output = Some(request_output?);
        }

        let text = match final_output {
            Some(request_output) => request_output
                .outputs
                .into_iter()
                .next()
                .map(|output| output.text)
                .ok_or_else(|| DeploymentError::MissingCompletionOutput(request_id.clone()))?,
            None => String::new(),
        };

        Ok(DeploymentResponse {
            id: request_id,
            text,
        })
    }

    /// Checks the engine health, failing if it takes longer than the configured timeout
    #[instrument(skip_all)]
    pub async fn check_health(&self) -> Result<(), DeploymentError> {
        let timeout = self.options.health_check_timeout();
        tokio::time::timeout(timeout, self.engine.check_health())
            .await
            .map_err(|_| DeploymentError::HealthCheckTimeout(self.options.health_check_timeout_s))??;
        Ok(())
    }
}

/// Generates a request id from 8 cryptographically random bytes, rendered as hex
pub fn generate_request_id() -> String {
    let mut bytes = [0u8; REQUEST_ID_NUM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("Engine error: `{0}`")]
    EngineError(#[from] EngineError),
    #[error("Sampling params error: `{0}`")]
    SamplingParamsError(#[from] SamplingParamsError),
    #[error("Deployment options error: `{0}`")]
    DeploymentOptionsError(#[from] crate::config::DeploymentOptionsError),
    #[error("Engine returned no completion output for request with id = `{0}`")]
    MissingCompletionOutput(String),
    #[error("Health check timed out after `{0}` seconds")]
    HealthCheckTimeout(u64),
}
