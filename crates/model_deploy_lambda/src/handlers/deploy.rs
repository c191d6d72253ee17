use std::sync::atomic::AtomicBool;
use std::time::Instant;

use model_deploy_core::contract::{descriptor_fingerprint, parse_descriptor, DeploymentDescriptor};
use model_deploy_core::plan::{plan_deployment, DeploymentPlan, DeploymentStep};
use model_deploy_core::wait::{poll_until, Clock, PollError, WaitError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapters::control_plane::{
    ControlPlaneError, CreateEndpointConfigRequest, CreateEndpointRequest, CreateModelRequest,
    ModelControlPlane,
};
use crate::adapters::object_store::DescriptorSource;
use crate::config::DeployConfig;

const COMPONENT: &str = "deploy_handler";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// The descriptor failed validation; nothing was touched.
    Rejected { reason: String },
    /// A model was (re)created; the stage does not deploy an endpoint.
    ModelCreated { resource_name: String, stage: String },
    EndpointDeployed {
        resource_name: String,
        status_checks: u32,
    },
}

impl DeployOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDeployment {
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor_fingerprint: Option<String>,
    pub outcome: DeployOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub status: String,
    pub deployments: Vec<ObjectDeployment>,
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid deploy event: {0}")]
    InvalidEvent(String),
    #[error("failed to read s3://{bucket}/{key}: {message}")]
    ReadDescriptor {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("{step:?} failed for '{resource_name}': {source}")]
    ControlPlane {
        step: DeploymentStep,
        resource_name: String,
        #[source]
        source: ControlPlaneError,
    },
    #[error("endpoint '{resource_name}' was not deleted: {source}")]
    EndpointDeletion {
        resource_name: String,
        #[source]
        source: WaitError,
    },
}

/// Deploys every descriptor referenced by an S3 "object created"
/// notification, in record order.
///
/// Invalid descriptors are reported as [`DeployOutcome::Rejected`]; any
/// other failure aborts the invocation without rolling back resources
/// created by earlier steps.
pub fn handle_deploy_event(
    event: &Value,
    config: &DeployConfig,
    source: &impl DescriptorSource,
    control_plane: &impl ModelControlPlane,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<DeployResponse, DeployError> {
    let object_refs = extract_object_refs(event)?;
    let mut deployments = Vec::with_capacity(object_refs.len());

    for object_ref in object_refs {
        let body = source
            .read_object(&object_ref.bucket, &object_ref.key)
            .map_err(|message| DeployError::ReadDescriptor {
                bucket: object_ref.bucket.clone(),
                key: object_ref.key.clone(),
                message,
            })?;

        let descriptor = match parse_descriptor(&body) {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    component = COMPONENT,
                    event = "descriptor_rejected",
                    bucket = %object_ref.bucket,
                    key = %object_ref.key,
                    reason = %error
                );
                deployments.push(ObjectDeployment {
                    bucket: object_ref.bucket,
                    key: object_ref.key,
                    descriptor_fingerprint: None,
                    outcome: DeployOutcome::Rejected {
                        reason: error.message().to_string(),
                    },
                });
                continue;
            }
        };

        let fingerprint = descriptor_fingerprint(&descriptor);
        info!(
            component = COMPONENT,
            event = "descriptor_loaded",
            bucket = %object_ref.bucket,
            key = %object_ref.key,
            descriptor_fingerprint = %fingerprint
        );

        let outcome = deploy_descriptor(&descriptor, config, control_plane, clock, cancel)?;
        deployments.push(ObjectDeployment {
            bucket: object_ref.bucket,
            key: object_ref.key,
            descriptor_fingerprint: Some(fingerprint),
            outcome,
        });
    }

    Ok(DeployResponse {
        status: "ok".to_string(),
        deployments,
    })
}

pub fn deploy_descriptor(
    descriptor: &DeploymentDescriptor,
    config: &DeployConfig,
    control_plane: &impl ModelControlPlane,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<DeployOutcome, DeployError> {
    let plan = match plan_deployment(descriptor) {
        Ok(value) => value,
        Err(error) => {
            warn!(
                component = COMPONENT,
                event = "descriptor_rejected",
                model_name = %descriptor.model_name,
                version = %descriptor.version,
                reason = %error
            );
            return Ok(DeployOutcome::Rejected {
                reason: error.message().to_string(),
            });
        }
    };

    let started_at = Instant::now();
    info!(
        component = COMPONENT,
        event = "deploy_started",
        resource_name = %plan.resource_name,
        stage = plan.stage.as_str(),
        steps = plan.steps.len()
    );

    let mut status_checks = 0u32;
    for step in &plan.steps {
        let result = run_step(*step, &plan, descriptor, config, control_plane, clock, cancel);
        match result {
            Ok(checks) => status_checks += checks,
            Err(failure) => {
                error!(
                    component = COMPONENT,
                    event = "deploy_failed",
                    resource_name = %plan.resource_name,
                    step = ?step,
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    error = %failure
                );
                return Err(failure);
            }
        }
    }

    let outcome = if plan.deploys_endpoint() {
        DeployOutcome::EndpointDeployed {
            resource_name: plan.resource_name.clone(),
            status_checks,
        }
    } else {
        info!(
            component = COMPONENT,
            event = "endpoint_skipped",
            resource_name = %plan.resource_name,
            stage = plan.stage.as_str()
        );
        DeployOutcome::ModelCreated {
            resource_name: plan.resource_name.clone(),
            stage: plan.stage.as_str().to_string(),
        }
    };

    info!(
        component = COMPONENT,
        event = "deploy_completed",
        resource_name = %plan.resource_name,
        duration_ms = started_at.elapsed().as_millis() as u64
    );
    Ok(outcome)
}

/// Runs one step; returns the number of endpoint status checks it made.
fn run_step(
    step: DeploymentStep,
    plan: &DeploymentPlan,
    descriptor: &DeploymentDescriptor,
    config: &DeployConfig,
    control_plane: &impl ModelControlPlane,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<u32, DeployError> {
    let name = plan.resource_name.as_str();
    let control_plane_error = |source: ControlPlaneError| DeployError::ControlPlane {
        step,
        resource_name: name.to_string(),
        source,
    };

    match step {
        DeploymentStep::DeleteModel => {
            let existed =
                ignore_not_found(control_plane.delete_model(name)).map_err(control_plane_error)?;
            log_deletion("model", name, existed);
        }
        DeploymentStep::CreateModel => {
            control_plane
                .create_model(&CreateModelRequest {
                    model_name: name.to_string(),
                    execution_role_arn: config.execution_role_arn.clone(),
                    containers: descriptor.containers.clone(),
                    tags: descriptor.tags.clone(),
                })
                .map_err(control_plane_error)?;
            info!(
                component = COMPONENT,
                event = "model_created",
                resource_name = name,
                containers = descriptor.containers.len()
            );
        }
        DeploymentStep::DeleteEndpointConfig => {
            let existed = ignore_not_found(control_plane.delete_endpoint_config(name))
                .map_err(control_plane_error)?;
            log_deletion("endpoint_config", name, existed);
        }
        DeploymentStep::CreateEndpointConfig => {
            control_plane
                .create_endpoint_config(&CreateEndpointConfigRequest {
                    endpoint_config_name: name.to_string(),
                    variants: plan.variants.clone(),
                    tags: descriptor.tags.clone(),
                })
                .map_err(control_plane_error)?;
            info!(
                component = COMPONENT,
                event = "endpoint_config_created",
                resource_name = name,
                variants = plan.variants.len()
            );
        }
        DeploymentStep::DeleteEndpoint => {
            let existed = ignore_not_found(control_plane.delete_endpoint(name))
                .map_err(control_plane_error)?;
            log_deletion("endpoint", name, existed);
        }
        DeploymentStep::AwaitEndpointDeletion => {
            let checks = poll_until(&config.wait_policy, clock, cancel, || {
                control_plane
                    .endpoint_status(name)
                    .map(|status| status.is_none())
            })
            .map_err(|failure| match failure {
                PollError::Probe(source) => control_plane_error(source),
                PollError::Wait(source) => DeployError::EndpointDeletion {
                    resource_name: name.to_string(),
                    source,
                },
            })?;
            info!(
                component = COMPONENT,
                event = "endpoint_absent",
                resource_name = name,
                status_checks = checks
            );
            return Ok(checks);
        }
        DeploymentStep::CreateEndpoint => {
            control_plane
                .create_endpoint(&CreateEndpointRequest {
                    endpoint_name: name.to_string(),
                    endpoint_config_name: name.to_string(),
                    tags: descriptor.tags.clone(),
                })
                .map_err(control_plane_error)?;
            info!(
                component = COMPONENT,
                event = "endpoint_created",
                resource_name = name
            );
        }
    }

    Ok(0)
}

/// `Ok(true)` when the resource was deleted, `Ok(false)` when it did not
/// exist.
fn ignore_not_found(result: Result<(), ControlPlaneError>) -> Result<bool, ControlPlaneError> {
    match result {
        Ok(()) => Ok(true),
        Err(error) if error.is_not_found() => Ok(false),
        Err(error) => Err(error),
    }
}

fn log_deletion(resource: &str, name: &str, existed: bool) {
    let event = if existed {
        "previous_resource_deleted"
    } else {
        "previous_resource_absent"
    };
    info!(
        component = COMPONENT,
        event,
        resource,
        resource_name = name
    );
}

/// Reads bucket/key pairs from an S3 event notification.
pub fn extract_object_refs(event: &Value) -> Result<Vec<ObjectRef>, DeployError> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .filter(|records| !records.is_empty())
        .ok_or_else(|| DeployError::InvalidEvent("event must include a Records array".into()))?;

    let mut object_refs = Vec::with_capacity(records.len());
    for record in records {
        let source = record.get("eventSource").and_then(Value::as_str);
        if source != Some("aws:s3") {
            return Err(DeployError::InvalidEvent(format!(
                "unsupported event source {}",
                source.unwrap_or("<missing>")
            )));
        }

        let bucket = record
            .pointer("/s3/bucket/name")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployError::InvalidEvent("record is missing s3.bucket.name".into()))?;
        let raw_key = record
            .pointer("/s3/object/key")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployError::InvalidEvent("record is missing s3.object.key".into()))?;

        object_refs.push(ObjectRef {
            bucket: bucket.to_string(),
            key: decode_object_key(raw_key).map_err(DeployError::InvalidEvent)?,
        });
    }

    Ok(object_refs)
}

/// S3 notifications form-encode object keys: `+` is a space and other
/// reserved bytes are `%XX` escapes.
fn decode_object_key(raw: &str) -> Result<String, String> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            b'%' => {
                let escape = bytes
                    .get(index + 1..index + 3)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .ok_or_else(|| format!("malformed escape in object key '{raw}'"))?;
                let value = std::str::from_utf8(escape)
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| format!("malformed escape in object key '{raw}'"))?;
                decoded.push(value);
                index += 3;
            }
            other => {
                decoded.push(other);
                index += 1;
            }
        }
    }

    String::from_utf8(decoded).map_err(|_| format!("object key '{raw}' is not valid UTF-8"))
}
