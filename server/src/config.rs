use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vllm_deploy_backends::{EngineArgs, EngineArgsError};

/// Prefix of the environment variables overriding the configuration file,
/// e.g. `VLLM_DEPLOY__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "VLLM_DEPLOY";
const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_MIN_REPLICAS: usize = 1;
pub const DEFAULT_MAX_REPLICAS: usize = 10;
pub const DEFAULT_HEALTH_CHECK_PERIOD_S: u64 = 10;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_S: u64 = 30;

/// Full configuration of a deployment: where it listens, how its engine is
/// built and how the orchestrator should scale and health check it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Arguments the engine is built from
    pub engine: EngineArgs,
    /// Replica scaling and health checking
    pub deployment: DeploymentOptions,
}

impl DeploymentConfig {
    /// Loads the configuration from a TOML file, with environment overrides on top.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let this = config.try_deserialize::<Self>()?;
        this.verify()?;
        Ok(this)
    }

    /// Verifies every section
    pub fn verify(&self) -> Result<(), ConfigError> {
        self.engine.verify_args()?;
        self.deployment.verify()?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub address: String,
    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SERVER_ADDRESS.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

/// Bounds on the number of running replicas
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoscalingConfig {
    pub min_replicas: usize,
    pub max_replicas: usize,
}

impl Default for AutoscalingConfig {
    fn default() -> Self {
        Self {
            min_replicas: DEFAULT_MIN_REPLICAS,
            max_replicas: DEFAULT_MAX_REPLICAS,
        }
    }
}

/// Orchestrator facing options of the deployment.
///
/// The number of accelerators each replica requires is not configurable,
/// it always matches the engine's tensor parallel size.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploymentOptions {
    /// Autoscaling bounds
    pub autoscaling: AutoscalingConfig,
    /// Period between two health checks, in seconds
    pub health_check_period_s: u64,
    /// Time after which a health check is considered failed, in seconds
    pub health_check_timeout_s: u64,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            autoscaling: AutoscalingConfig::default(),
            health_check_period_s: DEFAULT_HEALTH_CHECK_PERIOD_S,
            health_check_timeout_s: DEFAULT_HEALTH_CHECK_TIMEOUT_S,
        }
    }
}

impl DeploymentOptions {
    /// Verify `DeploymentOptions` arguments
    pub fn verify(&self) -> Result<(), DeploymentOptionsError> {
        let AutoscalingConfig {
            min_replicas,
            max_replicas,
        } = self.autoscaling;
        if max_replicas < 1 {
            return Err(DeploymentOptionsError::InvalidMaxReplicas(max_replicas));
        }
        if min_replicas > max_replicas {
            return Err(DeploymentOptionsError::InvalidReplicaBounds {
                min_replicas,
                max_replicas,
            });
        }
        if self.health_check_period_s < 1 {
            return Err(DeploymentOptionsError::InvalidHealthCheckPeriod);
        }
        if self.health_check_timeout_s < 1 {
            return Err(DeploymentOptionsError::InvalidHealthCheckTimeout);
        }
        Ok(())
    }

    /// Getter for the health check period, as a `Duration`
    pub fn health_check_period(&self) -> Duration {
        Duration::from_secs(self.health_check_period_s)
    }

    /// Getter for the health check timeout, as a `Duration`
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeploymentOptionsError {
    #[error("Invalid max replicas: `{0}`, must be at least 1")]
    InvalidMaxReplicas(usize),
    #[error("Min replicas (`{min_replicas}`) must not exceed max replicas (`{max_replicas}`)")]
    InvalidReplicaBounds {
        min_replicas: usize,
        max_replicas: usize,
    },
    #[error("Health check period must be at least 1 second")]
    InvalidHealthCheckPeriod,
    #[error("Health check timeout must be at least 1 second")]
    InvalidHealthCheckTimeout,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: `{0}`")]
    FailedToLoadConfig(#[from] config::ConfigError),
    #[error("Invalid engine args: `{0}`")]
    EngineArgsError(#[from] EngineArgsError),
    #[error("Invalid deployment options: `{0}`")]
    DeploymentOptionsError(#[from] DeploymentOptionsError),
}
