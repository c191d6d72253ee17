use serde::{Deserialize, Serialize};

use crate::contract::{validate_descriptor, DeploymentDescriptor, ValidationError, VariantSpec};
use crate::naming::{resource_name, variant_name};

/// Value of the descriptor's `stage` tag. Matching is exact: `"Production"`
/// is an [`Stage::Other`] stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Test,
    Production,
    Other(String),
    Unset,
}

impl Stage {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "test" => Self::Test,
            "production" => Self::Production,
            "" => Self::Unset,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Test => "test",
            Self::Production => "production",
            Self::Other(value) => value,
            Self::Unset => "",
        }
    }

    pub fn deploys_endpoint(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStep {
    DeleteModel,
    CreateModel,
    DeleteEndpointConfig,
    CreateEndpointConfig,
    DeleteEndpoint,
    AwaitEndpointDeletion,
    CreateEndpoint,
}

const MODEL_STEPS: [DeploymentStep; 2] = [DeploymentStep::DeleteModel, DeploymentStep::CreateModel];

const ENDPOINT_STEPS: [DeploymentStep; 5] = [
    DeploymentStep::DeleteEndpointConfig,
    DeploymentStep::CreateEndpointConfig,
    DeploymentStep::DeleteEndpoint,
    DeploymentStep::AwaitEndpointDeletion,
    DeploymentStep::CreateEndpoint,
];

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentPlan {
    pub resource_name: String,
    pub stage: Stage,
    pub steps: Vec<DeploymentStep>,
    /// Variants with derived model and variant names; empty unless the plan
    /// deploys an endpoint.
    pub variants: Vec<VariantSpec>,
}

impl DeploymentPlan {
    pub fn deploys_endpoint(&self) -> bool {
        self.steps.contains(&DeploymentStep::CreateEndpoint)
    }
}

pub fn plan_deployment(
    descriptor: &DeploymentDescriptor,
) -> Result<DeploymentPlan, ValidationError> {
    validate_descriptor(descriptor)?;

    let name = resource_name(&descriptor.model_name, &descriptor.version)?;
    let stage = descriptor.stage();
    let mut steps = MODEL_STEPS.to_vec();

    if !stage.deploys_endpoint() {
        return Ok(DeploymentPlan {
            resource_name: name,
            stage,
            steps,
            variants: Vec::new(),
        });
    }

    if descriptor.variants().is_empty() {
        return Err(ValidationError::new(
            "production deployments require endpoint.config.variants",
        ));
    }

    for (index, variant) in descriptor.variants().iter().enumerate() {
        if variant.instance_type.trim().is_empty() {
            return Err(ValidationError::new(format!(
                "Variant {index} is missing an InstanceType"
            )));
        }
    }

    steps.extend_from_slice(&ENDPOINT_STEPS);
    let variants = rewrite_variants(descriptor.variants(), &name);

    Ok(DeploymentPlan {
        resource_name: name,
        stage,
        steps,
        variants,
    })
}

pub fn rewrite_variants(variants: &[VariantSpec], resource_name: &str) -> Vec<VariantSpec> {
    variants
        .iter()
        .enumerate()
        .map(|(index, variant)| VariantSpec {
            model_name: Some(resource_name.to_string()),
            variant_name: Some(variant_name(resource_name, index)),
            ..variant.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::contract::{ContainerSpec, EndpointConfigSpec, EndpointSpec};

    use super::*;

    fn descriptor_with_stage(stage: Option<&str>) -> DeploymentDescriptor {
        let mut tags = BTreeMap::new();
        if let Some(value) = stage {
            tags.insert("stage".to_string(), value.to_string());
        }
        DeploymentDescriptor {
            model_name: "foo".to_string(),
            version: "1.2.3".to_string(),
            containers: vec![ContainerSpec {
                image: "repo/foo:1".to_string(),
                ..ContainerSpec::default()
            }],
            tags,
            endpoint: Some(EndpointSpec {
                config: EndpointConfigSpec {
                    variants: vec![
                        VariantSpec {
                            variant_name: Some("user-supplied".to_string()),
                            instance_type: "ml.m5.large".to_string(),
                            ..VariantSpec::default()
                        },
                        VariantSpec {
                            instance_type: "ml.c5.xlarge".to_string(),
                            initial_variant_weight: Some(0.5),
                            ..VariantSpec::default()
                        },
                    ],
                },
            }),
        }
    }

    #[test]
    fn test_stage_stops_after_model_creation() {
        let plan = plan_deployment(&descriptor_with_stage(Some("test"))).expect("plan");
        assert_eq!(plan.steps, MODEL_STEPS.to_vec());
        assert!(!plan.deploys_endpoint());
        assert!(plan.variants.is_empty());
    }

    #[test]
    fn other_and_unset_stages_stop_after_model_creation() {
        for stage in [Some("staging"), Some("Production"), Some(""), None] {
            let plan = plan_deployment(&descriptor_with_stage(stage)).expect("plan");
            assert_eq!(plan.steps, MODEL_STEPS.to_vec(), "stage {stage:?}");
        }
    }

    #[test]
    fn production_runs_full_sequence_with_rewritten_variants() {
        let plan = plan_deployment(&descriptor_with_stage(Some("production"))).expect("plan");
        assert_eq!(plan.resource_name, "foo-1-2-3");
        assert_eq!(plan.steps.len(), MODEL_STEPS.len() + ENDPOINT_STEPS.len());
        assert_eq!(plan.steps.last(), Some(&DeploymentStep::CreateEndpoint));

        assert_eq!(plan.variants.len(), 2);
        for (index, variant) in plan.variants.iter().enumerate() {
            assert_eq!(variant.model_name.as_deref(), Some("foo-1-2-3"));
            assert_eq!(
                variant.variant_name.as_deref(),
                Some(format!("foo-1-2-3-variant-{}", index + 1).as_str())
            );
        }
        assert_eq!(plan.variants[1].initial_variant_weight, Some(0.5));
    }

    #[test]
    fn production_without_variants_is_rejected() {
        let mut descriptor = descriptor_with_stage(Some("production"));
        descriptor.endpoint = None;
        let error = plan_deployment(&descriptor).expect_err("should fail");
        assert!(error.message().contains("variants"));
    }

    #[test]
    fn invalid_descriptor_produces_no_plan() {
        let mut descriptor = descriptor_with_stage(Some("production"));
        descriptor.containers.clear();
        assert!(plan_deployment(&descriptor).is_err());
    }

    #[test]
    fn names_without_letters_or_digits_are_rejected_before_planning() {
        let mut descriptor = descriptor_with_stage(Some("production"));
        descriptor.model_name = "___".to_string();
        descriptor.version = "...".to_string();

        let error = plan_deployment(&descriptor).expect_err("name should be rejected");
        assert!(error.message().contains("model_name"));
    }
}
