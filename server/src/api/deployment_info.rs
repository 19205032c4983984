use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::deployment::Deployment;

/// What an orchestrator needs to know to place and scale replicas
/// of this deployment.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DeploymentInfo {
    pub model: String,
    pub num_gpus: usize,
    pub tensor_parallel_size: usize,
    pub gpu_memory_utilization: f32,
    pub quantization: Option<String>,
    pub max_num_seqs: usize,
    pub trust_remote_code: bool,
    pub min_replicas: usize,
    pub max_replicas: usize,
    pub health_check_period_s: u64,
    pub health_check_timeout_s: u64,
}

impl From<&Deployment> for DeploymentInfo {
    fn from(deployment: &Deployment) -> Self {
        let engine_args = deployment.engine_args();
        let options = deployment.options();
        Self {
            model: engine_args.model().to_string(),
            num_gpus: deployment.num_gpus(),
            tensor_parallel_size: engine_args.tensor_parallel_size(),
            gpu_memory_utilization: engine_args.gpu_memory_utilization(),
            quantization: engine_args.quantization().map(|q| q.to_string()),
            max_num_seqs: engine_args.max_num_seqs(),
            trust_remote_code: engine_args.trust_remote_code(),
            min_replicas: options.autoscaling.min_replicas,
            max_replicas: options.autoscaling.max_replicas,
            health_check_period_s: options.health_check_period_s,
            health_check_timeout_s: options.health_check_timeout_s,
        }
    }
}
