use futures::StreamExt;
use serde_json::json;

use crate::{
    config::{
        EngineArgs, EngineArgsError, EngineBackend, Quantization, DEFAULT_MODEL_ID,
        DEFAULT_TENSOR_PARALLEL_SIZE,
    },
    llm_engine::{engine_from_args, EngineError},
    sampling_params::{SamplingParams, SamplingStrategy},
};

const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.9;

#[test]
fn test_default_engine_args() {
    let engine_args = EngineArgs::default();
    assert_eq!(engine_args.model(), DEFAULT_MODEL_ID);
    assert_eq!(engine_args.tensor_parallel_size(), DEFAULT_TENSOR_PARALLEL_SIZE);
    assert_eq!(engine_args.gpu_memory_utilization(), 0.90);
    assert_eq!(engine_args.quantization(), Some(Quantization::Awq));
    assert_eq!(engine_args.max_num_seqs(), 256);
    assert!(engine_args.trust_remote_code());
    assert_eq!(engine_args.backend(), &EngineBackend::Echo);
    assert!(engine_args.verify_args().is_ok());
}

#[test]
fn test_engine_args_verification() {
    let new = |tp, util, seqs| {
        EngineArgs::new(
            DEFAULT_MODEL_ID.to_string(),
            tp,
            util,
            None,
            seqs,
            false,
            EngineBackend::Echo,
        )
    };

    assert_eq!(
        new(0, 0.9, 256).unwrap_err(),
        EngineArgsError::InvalidTensorParallelSize(0)
    );
    assert_eq!(
        new(4, 1.5, 256).unwrap_err(),
        EngineArgsError::InvalidGpuMemoryUtilization(1.5)
    );
    assert_eq!(
        new(4, 0.0, 256).unwrap_err(),
        EngineArgsError::InvalidGpuMemoryUtilization(0.0)
    );
    assert_eq!(new(4, 0.9, 0).unwrap_err(), EngineArgsError::InvalidMaxNumSeqs(0));
    assert!(new(1, 1.0, 1).is_ok());

    let empty_model = EngineArgs {
        model: " ".to_string(),
        ..Default::default()
    };
    assert_eq!(empty_model.verify_args(), Err(EngineArgsError::EmptyModelId));

    let empty_api_base = EngineArgs {
        backend: EngineBackend::OpenAi {
            api_base: String::new(),
            api_key: None,
        },
        ..Default::default()
    };
    assert_eq!(empty_api_base.verify_args(), Err(EngineArgsError::EmptyApiBase));
}

#[test]
fn test_engine_args_deserialize_with_defaults() {
    let engine_args: EngineArgs = serde_json::from_value(json!({
        "model": "meta-llama/Llama-3.1-8B-Instruct",
        "quantization": "gptq",
        "backend": {
            "type": "open_ai",
            "api_base": "http://localhost:8000/v1"
        }
    }))
    .unwrap();

    assert_eq!(engine_args.model(), "meta-llama/Llama-3.1-8B-Instruct");
    assert_eq!(engine_args.quantization(), Some(Quantization::Gptq));
    assert_eq!(engine_args.tensor_parallel_size(), DEFAULT_TENSOR_PARALLEL_SIZE);
    assert_eq!(
        engine_args.backend(),
        &EngineBackend::OpenAi {
            api_base: "http://localhost:8000/v1".to_string(),
            api_key: None,
        }
    );
}

#[test]
fn test_sampling_params_verification() {
    let params = SamplingParams::new(TEMPERATURE, TOP_P, 512).unwrap();
    assert_eq!(params.temperature(), TEMPERATURE);
    assert_eq!(params.top_p(), TOP_P);
    assert_eq!(params.max_tokens(), 512);
    assert_eq!(params.sampling_strategy(), SamplingStrategy::Random);

    assert_eq!(
        SamplingParams::new(0.0, 1.0, 1).unwrap().sampling_strategy(),
        SamplingStrategy::Greedy
    );
    assert!(SamplingParams::new(-0.1, TOP_P, 512).is_err());
    assert!(SamplingParams::new(TEMPERATURE, 0.0, 512).is_err());
    assert!(SamplingParams::new(TEMPERATURE, 1.1, 512).is_err());
    assert!(SamplingParams::new(TEMPERATURE, TOP_P, 0).is_err());
}

#[tokio::test]
async fn test_echo_engine_generate() {
    let engine = engine_from_args(EngineArgs::default()).unwrap();
    assert!(engine.check_health().await.is_ok());

    let params = SamplingParams::new(TEMPERATURE, TOP_P, 512).unwrap();
    let outputs = engine
        .generate(Some("Hello world".to_string()), params, "abc".to_string())
        .unwrap()
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(outputs.len(), 2);
    assert!(outputs.iter().all(|o| o.request_id == "abc"));
    assert_eq!(outputs[0].outputs[0].text, "Hello");
    assert_eq!(outputs[1].outputs[0].text, "Hello world");
    assert!(outputs[1].finished);
}

#[tokio::test]
async fn test_echo_engine_missing_prompt() {
    let engine = engine_from_args(EngineArgs::default()).unwrap();
    let params = SamplingParams::new(TEMPERATURE, TOP_P, 512).unwrap();
    let result = engine.generate(None, params, "abc".to_string());
    assert!(matches!(result, Err(EngineError::MissingPrompt(id)) if id == "abc"));
}

#[test]
fn test_engine_from_invalid_args() {
    let engine_args = EngineArgs {
        tensor_parallel_size: 0,
        ..Default::default()
    };
    assert!(matches!(
        engine_from_args(engine_args),
        Err(EngineError::InvalidEngineArgs(
            EngineArgsError::InvalidTensorParallelSize(0)
        ))
    ));
}
