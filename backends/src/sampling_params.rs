use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sampling epsilon
const SAMPLING_EPS: f32 = 1e-5;

/// Sampling strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingStrategy {
    Greedy,
    Random,
}

/// Sampling parameters for text generation.
///
/// We follow the naming of the OpenAI text completion API
/// (https://platform.openai.com/docs/api-reference/completions/create).
///
/// Args:
///    temperature: Float that controls the randomness of the sampling. Lower
///        values make the model more deterministic, while higher values make
///        the model more random. Zero means greedy sampling.
///    top_p: Float that controls the cumulative probability of the top tokens
///        to consider. Must be in (0, 1]. Set to 1 to consider all tokens.
///    max_tokens: Maximum number of tokens to generate per output sequence.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct SamplingParams {
    /// Temperature
    temperature: f32,
    /// Top p
    top_p: f32,
    /// Maximum number of tokens
    max_tokens: usize,
}

impl SamplingParams {
    /// Constructor
    pub fn new(temperature: f32, top_p: f32, max_tokens: usize) -> Result<Self, SamplingParamsError> {
        let this = Self {
            temperature,
            top_p,
            max_tokens,
        };
        this.verify_args()?;
        Ok(this)
    }

    /// Verify arguments
    fn verify_args(&self) -> Result<(), SamplingParamsError> {
        if self.temperature < 0.0 {
            return Err(SamplingParamsError::VerifyArgumentsError(format!(
                "temperature must be non-negative, got {}.",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) || self.top_p <= 0.0 {
            return Err(SamplingParamsError::VerifyArgumentsError(format!(
                "top_p must be in (0, 1], got {}.",
                self.top_p
            )));
        }
        if self.max_tokens < 1 {
            return Err(SamplingParamsError::VerifyArgumentsError(format!(
                "max_tokens must be at least 1, got {}.",
                self.max_tokens
            )));
        }
        Ok(())
    }

    /// Getter for `temperature`
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Getter for `top_p`
    pub fn top_p(&self) -> f32 {
        self.top_p
    }

    /// Getter for `max_tokens`
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Sampling strategy
    pub fn sampling_strategy(&self) -> SamplingStrategy {
        if self.temperature < SAMPLING_EPS {
            SamplingStrategy::Greedy
        } else {
            SamplingStrategy::Random
        }
    }
}

#[derive(Debug, Error)]
pub enum SamplingParamsError {
    #[error("Verify arguments error: `{0}`")]
    VerifyArgumentsError(String),
}
