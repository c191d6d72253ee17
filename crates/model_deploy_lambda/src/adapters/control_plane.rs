use model_deploy_core::contract::{ContainerSpec, Tags, VariantSpec};
use thiserror::Error;

/// How a failed control-plane call should be treated by the deploy sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The addressed resource does not exist.
    NotFound,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ControlPlaneError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ControlPlaneError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Maps a SageMaker error code and message to an [`ErrorKind`].
///
/// SageMaker reports most missing resources as `ValidationException`, so
/// that code only counts as absence when the message says so; any other
/// validation failure stays fatal.
pub fn classify_error(code: Option<&str>, message: Option<&str>) -> ErrorKind {
    match code {
        Some("ResourceNotFound") | Some("ResourceNotFoundException") => ErrorKind::NotFound,
        Some("ValidationException") if message.is_some_and(describes_missing_resource) => {
            ErrorKind::NotFound
        }
        _ => ErrorKind::Other,
    }
}

fn describes_missing_resource(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("could not find") || lowered.contains("does not exist")
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateModelRequest {
    pub model_name: String,
    pub execution_role_arn: String,
    pub containers: Vec<ContainerSpec>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateEndpointConfigRequest {
    pub endpoint_config_name: String,
    pub variants: Vec<VariantSpec>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateEndpointRequest {
    pub endpoint_name: String,
    pub endpoint_config_name: String,
    pub tags: Tags,
}

/// SageMaker operations used by the deploy sequence.
///
/// Implementations report missing resources as [`ErrorKind::NotFound`];
/// `endpoint_status` returns `Ok(None)` instead.
pub trait ModelControlPlane {
    fn delete_model(&self, model_name: &str) -> Result<(), ControlPlaneError>;

    fn create_model(&self, request: &CreateModelRequest) -> Result<(), ControlPlaneError>;

    fn delete_endpoint_config(&self, endpoint_config_name: &str) -> Result<(), ControlPlaneError>;

    fn create_endpoint_config(
        &self,
        request: &CreateEndpointConfigRequest,
    ) -> Result<(), ControlPlaneError>;

    fn delete_endpoint(&self, endpoint_name: &str) -> Result<(), ControlPlaneError>;

    fn endpoint_status(&self, endpoint_name: &str) -> Result<Option<String>, ControlPlaneError>;

    fn create_endpoint(&self, request: &CreateEndpointRequest) -> Result<(), ControlPlaneError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_not_found_code_is_absence() {
        assert_eq!(
            classify_error(Some("ResourceNotFound"), None),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn validation_exception_counts_as_absence_only_when_message_says_so() {
        assert_eq!(
            classify_error(
                Some("ValidationException"),
                Some("Could not find model \"arn:aws:sagemaker:eu-west-1:1:model/foo-1-2-3\".")
            ),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_error(
                Some("ValidationException"),
                Some("Could not find endpoint \"foo-1-2-3\".")
            ),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_error(
                Some("ValidationException"),
                Some("1 validation error detected: Value 'bad name' at 'modelName'")
            ),
            ErrorKind::Other
        );
        assert_eq!(
            classify_error(Some("ValidationException"), None),
            ErrorKind::Other
        );
    }

    #[test]
    fn unrelated_codes_are_fatal() {
        assert_eq!(
            classify_error(Some("ThrottlingException"), Some("Rate exceeded")),
            ErrorKind::Other
        );
        assert_eq!(classify_error(None, None), ErrorKind::Other);
    }
}
