use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HuggingFace identifier of the model served by default
pub const DEFAULT_MODEL_ID: &str = "meta-llama/Meta-Llama-3-70B-Instruct";
/// Number of GPUs a single replica is sharded across
pub const DEFAULT_TENSOR_PARALLEL_SIZE: usize = 4;
/// Fraction of GPU memory the engine is allowed to claim
pub const DEFAULT_GPU_MEMORY_UTILIZATION: f32 = 0.90;
/// Maximum number of sequences the engine keeps in flight
pub const DEFAULT_MAX_NUM_SEQS: usize = 256;

/// Weight quantization scheme used when loading the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    Awq,
    Gptq,
    SqueezeLlm,
    Fp8,
}

impl std::fmt::Display for Quantization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quantization::Awq => write!(f, "awq"),
            Quantization::Gptq => write!(f, "gptq"),
            Quantization::SqueezeLlm => write!(f, "squeezellm"),
            Quantization::Fp8 => write!(f, "fp8"),
        }
    }
}

/// Which engine implementation sits behind the deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineBackend {
    /// In-process engine that streams the prompt back, word by word
    #[default]
    Echo,
    /// Remote OpenAI compatible completions endpoint, such as the one
    /// exposed by a vLLM server
    OpenAi {
        /// Base url, e.g. `http://localhost:8000/v1`
        api_base: String,
        /// Bearer token, if the endpoint requires one
        #[serde(default)]
        api_key: Option<String>,
    },
}

/// Arguments handed to the engine factory, once, at startup.
///
/// Args:
///   model: HuggingFace model identifier.
///   tensor_parallel_size: Number of GPUs the model is sharded across.
///   gpu_memory_utilization: Fraction of GPU memory to use for the
///       engine execution, must be in (0, 1].
///   quantization: Optional weight quantization scheme.
///   max_num_seqs: Maximum number of sequences processed concurrently.
///   trust_remote_code: Whether to trust model code fetched from the hub.
///   backend: Engine implementation to instantiate.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineArgs {
    /// Model identifier
    pub model: String,
    /// Tensor parallel size
    pub tensor_parallel_size: usize,
    /// GPU memory utilization
    pub gpu_memory_utilization: f32,
    /// Quantization scheme (optional)
    pub quantization: Option<Quantization>,
    /// Maximum number of concurrent sequences
    pub max_num_seqs: usize,
    /// Trust remote code
    pub trust_remote_code: bool,
    /// Engine backend
    pub backend: EngineBackend,
}

impl Default for EngineArgs {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_ID.to_string(),
            tensor_parallel_size: DEFAULT_TENSOR_PARALLEL_SIZE,
            gpu_memory_utilization: DEFAULT_GPU_MEMORY_UTILIZATION,
            quantization: Some(Quantization::Awq),
            max_num_seqs: DEFAULT_MAX_NUM_SEQS,
            trust_remote_code: true,
            backend: EngineBackend::default(),
        }
    }
}

impl EngineArgs {
    /// Constructor
    pub fn new(
        model: String,
        tensor_parallel_size: usize,
        gpu_memory_utilization: f32,
        quantization: Option<Quantization>,
        max_num_seqs: usize,
        trust_remote_code: bool,
        backend: EngineBackend,
    ) -> Result<Self, EngineArgsError> {
        let this = Self {
            model,
            tensor_parallel_size,
            gpu_memory_utilization,
            quantization,
            max_num_seqs,
            trust_remote_code,
            backend,
        };

        this.verify_args()?;
        Ok(this)
    }

    /// Verify `EngineArgs` arguments
    pub fn verify_args(&self) -> Result<(), EngineArgsError> {
        if self.model.trim().is_empty() {
            return Err(EngineArgsError::EmptyModelId);
        }
        if self.tensor_parallel_size < 1 {
            return Err(EngineArgsError::InvalidTensorParallelSize(
                self.tensor_parallel_size,
            ));
        }
        if self.gpu_memory_utilization <= 0.0 || self.gpu_memory_utilization > 1.0 {
            return Err(EngineArgsError::InvalidGpuMemoryUtilization(
                self.gpu_memory_utilization,
            ));
        }
        if self.max_num_seqs < 1 {
            return Err(EngineArgsError::InvalidMaxNumSeqs(self.max_num_seqs));
        }
        if let EngineBackend::OpenAi { api_base, .. } = &self.backend {
            if api_base.trim().is_empty() {
                return Err(EngineArgsError::EmptyApiBase);
            }
        }
        Ok(())
    }

    /// Getter for `model`
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Getter for `tensor_parallel_size`
    pub fn tensor_parallel_size(&self) -> usize {
        self.tensor_parallel_size
    }

    /// Getter for `gpu_memory_utilization`
    pub fn gpu_memory_utilization(&self) -> f32 {
        self.gpu_memory_utilization
    }

    /// Getter for `quantization`
    pub fn quantization(&self) -> Option<Quantization> {
        self.quantization
    }

    /// Getter for `max_num_seqs`
    pub fn max_num_seqs(&self) -> usize {
        self.max_num_seqs
    }

    /// Getter for `trust_remote_code`
    pub fn trust_remote_code(&self) -> bool {
        self.trust_remote_code
    }

    /// Getter for `backend`
    pub fn backend(&self) -> &EngineBackend {
        &self.backend
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EngineArgsError {
    #[error("Model identifier cannot be empty")]
    EmptyModelId,
    #[error("Invalid tensor parallel size: `{0}`, must be at least 1")]
    InvalidTensorParallelSize(usize),
    #[error("Invalid GPU memory utilization: `{0}`, must be in (0, 1]")]
    InvalidGpuMemoryUtilization(f32),
    #[error("Invalid max number of sequences: `{0}`, must be at least 1")]
    InvalidMaxNumSeqs(usize),
    #[error("OpenAI backend requires a non empty `api_base`")]
    EmptyApiBase,
}
