use std::time::Duration;

use model_deploy_core::wait::WaitPolicy;
use thiserror::Error;

pub const ROLE_ARN_VAR: &str = "SAGEMAKER_ROLE_ARN";
pub const DELETE_TIMEOUT_VAR: &str = "ENDPOINT_DELETE_TIMEOUT_SECS";
pub const POLL_INITIAL_VAR: &str = "ENDPOINT_POLL_INITIAL_MS";
pub const POLL_MAX_VAR: &str = "ENDPOINT_POLL_MAX_MS";
pub const STATUS_TOPIC_VAR: &str = "STATUS_TOPIC_ARN";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{name} must be a positive integer, got '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployConfig {
    pub execution_role_arn: String,
    pub wait_policy: WaitPolicy,
}

impl DeployConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let execution_role_arn = required(&lookup, ROLE_ARN_VAR)?;

        let defaults = WaitPolicy::default();
        let wait_policy = WaitPolicy {
            initial_delay: optional_u64(&lookup, POLL_INITIAL_VAR)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: optional_u64(&lookup, POLL_MAX_VAR)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            multiplier: defaults.multiplier,
            timeout: optional_u64(&lookup, DELETE_TIMEOUT_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        Ok(Self {
            execution_role_arn,
            wait_policy,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusConfig {
    pub topic_arn: String,
}

impl StatusConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            topic_arn: required(&lookup, STATUS_TOPIC_VAR)?,
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::Invalid { name, value: raw }),
        Ok(value) => Ok(Some(value)),
    }
}
