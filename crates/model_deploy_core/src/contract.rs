use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::plan::Stage;

pub const STAGE_TAG: &str = "stage";

pub type Tags = BTreeMap<String, String>;

/// Deployment document uploaded to the descriptor bucket.
///
/// Every field defaults when absent so that acceptance is decided by
/// [`validate_descriptor`] rather than by deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeploymentDescriptor {
    pub model_name: String,
    pub version: String,
    pub containers: Vec<ContainerSpec>,
    pub tags: Tags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "PascalCase")]
pub struct ContainerSpec {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_data_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_hostname: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointSpec {
    pub config: EndpointConfigSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfigSpec {
    pub variants: Vec<VariantSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
pub struct VariantSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub initial_instance_count: i32,
    pub instance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_variant_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerator_type: Option<String>,
}

impl Default for VariantSpec {
    fn default() -> Self {
        Self {
            variant_name: None,
            model_name: None,
            initial_instance_count: 1,
            instance_type: String::new(),
            initial_variant_weight: None,
            accelerator_type: None,
        }
    }
}

impl DeploymentDescriptor {
    pub fn stage(&self) -> Stage {
        match self.tags.get(STAGE_TAG) {
            Some(value) => Stage::parse(value),
            None => Stage::Unset,
        }
    }

    pub fn variants(&self) -> &[VariantSpec] {
        self.endpoint
            .as_ref()
            .map(|endpoint| endpoint.config.variants.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn parse_descriptor(body: &[u8]) -> Result<DeploymentDescriptor, ValidationError> {
    serde_json::from_slice(body)
        .map_err(|error| ValidationError::new(format!("Malformed descriptor: {error}")))
}

pub fn validate_descriptor(descriptor: &DeploymentDescriptor) -> Result<(), ValidationError> {
    if descriptor.model_name.trim().is_empty() {
        return Err(ValidationError::new("model_name cannot be empty"));
    }

    if descriptor.version.trim().is_empty() {
        return Err(ValidationError::new("version cannot be empty"));
    }

    if descriptor.containers.is_empty() {
        return Err(ValidationError::new("containers must be a non-empty list"));
    }

    for (index, container) in descriptor.containers.iter().enumerate() {
        if container.image.trim().is_empty() {
            return Err(ValidationError::new(format!(
                "Container {index} is missing an Image"
            )));
        }
    }

    Ok(())
}

pub fn is_valid_descriptor(descriptor: &DeploymentDescriptor) -> bool {
    validate_descriptor(descriptor).is_ok()
}

pub fn descriptor_fingerprint(descriptor: &DeploymentDescriptor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json(descriptor));
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of contract value should not fail")
}
