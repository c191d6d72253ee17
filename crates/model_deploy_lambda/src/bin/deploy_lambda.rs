use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aws_sdk_sagemaker::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sagemaker::types::{
    ContainerDefinition, ContainerMode, ProductionVariant, ProductionVariantAcceleratorType,
    ProductionVariantInstanceType, Tag,
};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use model_deploy_core::contract::{ContainerSpec, Tags, VariantSpec};
use model_deploy_core::wait::SystemClock;
use model_deploy_lambda::adapters::control_plane::{
    classify_error, ControlPlaneError, CreateEndpointConfigRequest, CreateEndpointRequest,
    CreateModelRequest, ModelControlPlane,
};
use model_deploy_lambda::adapters::object_store::DescriptorSource;
use model_deploy_lambda::config::DeployConfig;
use model_deploy_lambda::handlers::deploy::{handle_deploy_event, DeployResponse};
use model_deploy_lambda::logging::init_tracing;
use serde_json::Value;

/// Time reserved at the end of an invocation for reporting the failure.
/// Covers one cancel-check slice of the endpoint wait plus a slow
/// `DescribeEndpoint` round-trip.
const DEADLINE_MARGIN: Duration = Duration::from_secs(20);

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

struct S3DescriptorSource {
    s3_client: aws_sdk_s3::Client,
}

impl DescriptorSource for S3DescriptorSource {
    fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let client = self.s3_client.clone();
        let bucket = bucket.to_string();
        let object_key = key.to_string();

        block_on(async move {
            let output = client
                .get_object()
                .bucket(bucket)
                .key(object_key)
                .send()
                .await
                .map_err(|error| format!("failed to read object from s3: {error}"))?;
            let body = output
                .body
                .collect()
                .await
                .map_err(|error| format!("failed to read object body: {error}"))?;
            Ok(body.into_bytes().to_vec())
        })
    }
}

struct SageMakerControlPlane {
    client: aws_sdk_sagemaker::Client,
}

fn control_plane_error<E, R>(action: &str, error: SdkError<E, R>) -> ControlPlaneError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = classify_error(error.code(), error.message());
    ControlPlaneError::new(kind, format!("{action}: {}", DisplayErrorContext(&error)))
}

fn sdk_tags(tags: &Tags) -> Result<Vec<Tag>, ControlPlaneError> {
    tags.iter()
        .map(|(key, value)| Ok(Tag::builder().key(key).value(value).build()))
        .collect()
}

fn sdk_container(container: &ContainerSpec) -> ContainerDefinition {
    let environment = (!container.environment.is_empty()).then(|| {
        container
            .environment
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<HashMap<_, _>>()
    });

    ContainerDefinition::builder()
        .image(&container.image)
        .set_model_data_url(container.model_data_url.clone())
        .set_container_hostname(container.container_hostname.clone())
        .set_environment(environment)
        .set_mode(container.mode.as_deref().map(ContainerMode::from))
        .build()
}

fn sdk_variant(variant: &VariantSpec) -> Result<ProductionVariant, ControlPlaneError> {
    Ok(ProductionVariant::builder()
        .set_variant_name(variant.variant_name.clone())
        .set_model_name(variant.model_name.clone())
        .initial_instance_count(variant.initial_instance_count)
        .instance_type(ProductionVariantInstanceType::from(
            variant.instance_type.as_str(),
        ))
        .set_initial_variant_weight(variant.initial_variant_weight)
        .set_accelerator_type(
            variant
                .accelerator_type
                .as_deref()
                .map(ProductionVariantAcceleratorType::from),
        )
        .build())
}

impl ModelControlPlane for SageMakerControlPlane {
    fn delete_model(&self, model_name: &str) -> Result<(), ControlPlaneError> {
        let request = self.client.delete_model().model_name(model_name);
        block_on(request.send())
            .map(|_| ())
            .map_err(|error| control_plane_error("delete model", error))
    }

    fn create_model(&self, request: &CreateModelRequest) -> Result<(), ControlPlaneError> {
        let mut builder = self
            .client
            .create_model()
            .model_name(&request.model_name)
            .execution_role_arn(&request.execution_role_arn)
            .set_tags(Some(sdk_tags(&request.tags)?));

        builder = match request.containers.as_slice() {
            [single] => builder.primary_container(sdk_container(single)),
            many => builder.set_containers(Some(many.iter().map(sdk_container).collect())),
        };

        block_on(builder.send())
            .map(|_| ())
            .map_err(|error| control_plane_error("create model", error))
    }

    fn delete_endpoint_config(&self, endpoint_config_name: &str) -> Result<(), ControlPlaneError> {
        let request = self
            .client
            .delete_endpoint_config()
            .endpoint_config_name(endpoint_config_name);
        block_on(request.send())
            .map(|_| ())
            .map_err(|error| control_plane_error("delete endpoint config", error))
    }

    fn create_endpoint_config(
        &self,
        request: &CreateEndpointConfigRequest,
    ) -> Result<(), ControlPlaneError> {
        let variants = request
            .variants
            .iter()
            .map(sdk_variant)
            .collect::<Result<Vec<_>, _>>()?;
        let builder = self
            .client
            .create_endpoint_config()
            .endpoint_config_name(&request.endpoint_config_name)
            .set_production_variants(Some(variants))
            .set_tags(Some(sdk_tags(&request.tags)?));

        block_on(builder.send())
            .map(|_| ())
            .map_err(|error| control_plane_error("create endpoint config", error))
    }

    fn delete_endpoint(&self, endpoint_name: &str) -> Result<(), ControlPlaneError> {
        let request = self.client.delete_endpoint().endpoint_name(endpoint_name);
        block_on(request.send())
            .map(|_| ())
            .map_err(|error| control_plane_error("delete endpoint", error))
    }

    fn endpoint_status(&self, endpoint_name: &str) -> Result<Option<String>, ControlPlaneError> {
        let request = self.client.describe_endpoint().endpoint_name(endpoint_name);
        match block_on(request.send()) {
            Ok(output) => Ok(Some(
                output
                    .endpoint_status()
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_default(),
            )),
            Err(error) => {
                let error = control_plane_error("describe endpoint", error);
                if error.is_not_found() {
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }

    fn create_endpoint(&self, request: &CreateEndpointRequest) -> Result<(), ControlPlaneError> {
        let builder = self
            .client
            .create_endpoint()
            .endpoint_name(&request.endpoint_name)
            .endpoint_config_name(&request.endpoint_config_name)
            .set_tags(Some(sdk_tags(&request.tags)?));

        block_on(builder.send())
            .map(|_| ())
            .map_err(|error| control_plane_error("create endpoint", error))
    }
}

/// Raises `cancel` shortly before the invocation deadline so the endpoint
/// wait fails with a clear error instead of the runtime killing the process.
fn spawn_deadline_watch(
    deadline: SystemTime,
    cancel: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    let remaining = deadline
        .duration_since(SystemTime::now())
        .unwrap_or_default()
        .saturating_sub(DEADLINE_MARGIN);
    tokio::spawn(async move {
        tokio::time::sleep(remaining).await;
        cancel.store(true, Ordering::Relaxed);
    })
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<DeployResponse, Error> {
    let config = DeployConfig::from_env().map_err(|error| Error::from(error.to_string()))?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let source = S3DescriptorSource {
        s3_client: aws_sdk_s3::Client::new(&aws_config),
    };
    let control_plane = SageMakerControlPlane {
        client: aws_sdk_sagemaker::Client::new(&aws_config),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let watch = spawn_deadline_watch(event.context.deadline(), Arc::clone(&cancel));

    // The endpoint wait sleeps on this thread; hand the worker back so the
    // deadline watch keeps running on single-core Lambda hosts.
    let result = tokio::task::block_in_place(|| {
        handle_deploy_event(
            &event.payload,
            &config,
            &source,
            &control_plane,
            &SystemClock,
            &cancel,
        )
    });
    watch.abort();

    result.map_err(|error| Error::from(error.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing("model_deploy_lambda=info,deploy_lambda=info");
    lambda_runtime::run(service_fn(handle_request)).await
}
