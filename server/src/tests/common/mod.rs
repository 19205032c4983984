use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use vllm_deploy_backends::{
    AsyncEngine, CompletionOutput, EngineArgs, EngineError, RequestOutput, RequestOutputStream,
    SamplingParams,
};

use crate::{
    api::DeploymentRequest,
    config::{DeploymentConfig, DeploymentOptions},
    deployment::Deployment,
    server::app_start,
};

static SERVER: OnceLock<String> = OnceLock::new();

impl DeploymentRequest {
    /// Creates a non streaming request for `prompt`
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// This test harness ensures only one server is spawned for all tests.
/// - It uses OnceLock to ensure the server is only started once and to store the server address.
/// - It binds to a random available port to avoid conflicts between test runs.
/// - It runs on its own thread and runtime, so it outlives each test's runtime.
/// - It serves the default configuration, backed by the echo engine.
pub fn spawn_server() -> &'static str {
    SERVER.get_or_init(|| {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let server_address = format!("http://{}", listener.local_addr().unwrap());
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = TcpListener::from_std(listener).unwrap();
                app_start(listener, DeploymentConfig::default(), metrics_handle).await
            })
        });

        server_address
    })
}

/// What a `ScriptedEngine` was asked to generate
#[derive(Clone, Debug)]
pub struct Submission {
    pub prompt: Option<String>,
    pub sampling_params: SamplingParams,
    pub request_id: String,
}

/// Engine replaying a fixed sequence of cumulative texts, recording every submission.
pub struct ScriptedEngine {
    engine_args: EngineArgs,
    texts: Vec<&'static str>,
    fail_after: Option<usize>,
    health_check_delay: Option<Duration>,
    pub submissions: Mutex<Vec<Submission>>,
}

impl ScriptedEngine {
    pub fn new(texts: Vec<&'static str>) -> Self {
        Self {
            engine_args: EngineArgs::default(),
            texts,
            fail_after: None,
            health_check_delay: None,
            submissions: Mutex::new(vec![]),
        }
    }

    /// Emits an error once `n` outputs have been yielded
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Makes `check_health` take `delay`
    pub fn with_health_check_delay(mut self, delay: Duration) -> Self {
        self.health_check_delay = Some(delay);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AsyncEngine for ScriptedEngine {
    fn generate(
        &self,
        prompt: Option<String>,
        sampling_params: SamplingParams,
        request_id: String,
    ) -> Result<RequestOutputStream, EngineError> {
        self.submissions.lock().unwrap().push(Submission {
            prompt: prompt.clone(),
            sampling_params,
            request_id: request_id.clone(),
        });

        let num_texts = self.texts.len();
        let mut outputs = self
            .texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                Ok(RequestOutput {
                    request_id: request_id.clone(),
                    prompt: prompt.clone(),
                    outputs: vec![CompletionOutput {
                        index: 0,
                        text: text.to_string(),
                        finish_reason: (i + 1 == num_texts).then(|| "stop".to_string()),
                    }],
                    finished: i + 1 == num_texts,
                })
            })
            .collect::<Vec<_>>();
        if let Some(n) = self.fail_after {
            outputs.truncate(n);
            outputs.push(Err(EngineError::Backend("out of memory".to_string())));
        }
        Ok(Box::pin(futures::stream::iter(outputs)))
    }

    async fn check_health(&self) -> Result<(), EngineError> {
        if let Some(delay) = self.health_check_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn engine_args(&self) -> &EngineArgs {
        &self.engine_args
    }
}

/// Engine whose output stream ends with a snapshot carrying no completion output
#[derive(Default)]
pub struct EmptyOutputEngine {
    engine_args: EngineArgs,
}

#[async_trait]
impl AsyncEngine for EmptyOutputEngine {
    fn generate(
        &self,
        prompt: Option<String>,
        _: SamplingParams,
        request_id: String,
    ) -> Result<RequestOutputStream, EngineError> {
        let output = RequestOutput {
            request_id,
            prompt,
            outputs: vec![],
            finished: true,
        };
        Ok(Box::pin(futures::stream::iter(vec![Ok(output)])))
    }

    async fn check_health(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn engine_args(&self) -> &EngineArgs {
        &self.engine_args
    }
}

/// Wraps `engine` in a `Deployment` with default options
pub fn deployment_with<E: AsyncEngine + 'static>(engine: Arc<E>) -> Deployment {
    Deployment::with_engine(engine, DeploymentOptions::default())
}
