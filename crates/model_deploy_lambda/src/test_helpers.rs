//! In-memory adapters for exercising handlers without AWS.
//!
//! Shared by the unit tests in this crate and the integration tests under
//! `tests/`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub use model_deploy_core::test_helpers::ManualClock;

use crate::adapters::control_plane::{
    ControlPlaneError, CreateEndpointConfigRequest, CreateEndpointRequest, CreateModelRequest,
    ModelControlPlane,
};
use crate::adapters::notify::Notifier;
use crate::adapters::object_store::DescriptorSource;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlPlaneCall {
    DeleteModel(String),
    CreateModel(CreateModelRequest),
    DeleteEndpointConfig(String),
    CreateEndpointConfig(CreateEndpointConfigRequest),
    DeleteEndpoint(String),
    DescribeEndpoint(String),
    CreateEndpoint(CreateEndpointRequest),
}

impl ControlPlaneCall {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::DeleteModel(_) => "delete_model",
            Self::CreateModel(_) => "create_model",
            Self::DeleteEndpointConfig(_) => "delete_endpoint_config",
            Self::CreateEndpointConfig(_) => "create_endpoint_config",
            Self::DeleteEndpoint(_) => "delete_endpoint",
            Self::DescribeEndpoint(_) => "describe_endpoint",
            Self::CreateEndpoint(_) => "create_endpoint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointState {
    InService,
    Deleting { polls_remaining: u32 },
}

#[derive(Debug, Default)]
struct ControlPlaneState {
    models: HashSet<String>,
    endpoint_configs: HashSet<String>,
    endpoints: HashMap<String, EndpointState>,
    calls: Vec<ControlPlaneCall>,
    failures: HashMap<&'static str, ControlPlaneError>,
}

/// Fake SageMaker that tracks resources by name and records every call.
///
/// Deleting an endpoint leaves it in `Deleting` for `deletion_polls`
/// status checks before it disappears.
#[derive(Debug, Default)]
pub struct RecordingControlPlane {
    state: Mutex<ControlPlaneState>,
    deletion_polls: u32,
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(self, name: &str) -> Self {
        self.lock().models.insert(name.to_string());
        self
    }

    pub fn with_endpoint_config(self, name: &str) -> Self {
        self.lock().endpoint_configs.insert(name.to_string());
        self
    }

    pub fn with_endpoint(self, name: &str) -> Self {
        self.lock()
            .endpoints
            .insert(name.to_string(), EndpointState::InService);
        self
    }

    pub fn with_deletion_polls(mut self, polls: u32) -> Self {
        self.deletion_polls = polls;
        self
    }

    /// Endpoint deletions never complete.
    pub fn with_stuck_deletion(self) -> Self {
        self.with_deletion_polls(u32::MAX)
    }

    pub fn fail_on(self, operation: &'static str, error: ControlPlaneError) -> Self {
        self.lock().failures.insert(operation, error);
        self
    }

    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.lock().calls.clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.lock()
            .calls
            .iter()
            .map(ControlPlaneCall::operation)
            .collect()
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.lock().models.contains(name)
    }

    pub fn has_endpoint_config(&self, name: &str) -> bool {
        self.lock().endpoint_configs.contains(name)
    }

    pub fn has_endpoint(&self, name: &str) -> bool {
        self.lock().endpoints.contains_key(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControlPlaneState> {
        self.state.lock().expect("poisoned mutex")
    }

    fn record(&self, call: ControlPlaneCall) -> Result<(), ControlPlaneError> {
        let mut state = self.lock();
        let operation = call.operation();
        state.calls.push(call);
        match state.failures.get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl ModelControlPlane for RecordingControlPlane {
    fn delete_model(&self, model_name: &str) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::DeleteModel(model_name.to_string()))?;
        if self.lock().models.remove(model_name) {
            Ok(())
        } else {
            Err(ControlPlaneError::not_found(format!(
                "Could not find model \"{model_name}\"."
            )))
        }
    }

    fn create_model(&self, request: &CreateModelRequest) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::CreateModel(request.clone()))?;
        if !self.lock().models.insert(request.model_name.clone()) {
            return Err(ControlPlaneError::other(format!(
                "Cannot create already existing model \"{}\".",
                request.model_name
            )));
        }
        Ok(())
    }

    fn delete_endpoint_config(&self, endpoint_config_name: &str) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::DeleteEndpointConfig(
            endpoint_config_name.to_string(),
        ))?;
        if self.lock().endpoint_configs.remove(endpoint_config_name) {
            Ok(())
        } else {
            Err(ControlPlaneError::not_found(format!(
                "Could not find endpoint configuration \"{endpoint_config_name}\"."
            )))
        }
    }

    fn create_endpoint_config(
        &self,
        request: &CreateEndpointConfigRequest,
    ) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::CreateEndpointConfig(request.clone()))?;
        if !self
            .lock()
            .endpoint_configs
            .insert(request.endpoint_config_name.clone())
        {
            return Err(ControlPlaneError::other(format!(
                "Cannot create already existing endpoint configuration \"{}\".",
                request.endpoint_config_name
            )));
        }
        Ok(())
    }

    fn delete_endpoint(&self, endpoint_name: &str) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::DeleteEndpoint(endpoint_name.to_string()))?;
        let polls_remaining = self.deletion_polls;
        let mut state = self.lock();
        match state.endpoints.get_mut(endpoint_name) {
            Some(endpoint) => {
                *endpoint = EndpointState::Deleting { polls_remaining };
                Ok(())
            }
            None => Err(ControlPlaneError::not_found(format!(
                "Could not find endpoint \"{endpoint_name}\"."
            ))),
        }
    }

    fn endpoint_status(&self, endpoint_name: &str) -> Result<Option<String>, ControlPlaneError> {
        self.record(ControlPlaneCall::DescribeEndpoint(endpoint_name.to_string()))?;
        let mut state = self.lock();
        match state.endpoints.get(endpoint_name).copied() {
            None => Ok(None),
            Some(EndpointState::InService) => Ok(Some("InService".to_string())),
            Some(EndpointState::Deleting { polls_remaining: 0 }) => {
                state.endpoints.remove(endpoint_name);
                Ok(None)
            }
            Some(EndpointState::Deleting { polls_remaining }) => {
                state.endpoints.insert(
                    endpoint_name.to_string(),
                    EndpointState::Deleting {
                        polls_remaining: polls_remaining - 1,
                    },
                );
                Ok(Some("Deleting".to_string()))
            }
        }
    }

    fn create_endpoint(&self, request: &CreateEndpointRequest) -> Result<(), ControlPlaneError> {
        self.record(ControlPlaneCall::CreateEndpoint(request.clone()))?;
        let mut state = self.lock();
        if state.endpoints.contains_key(&request.endpoint_name) {
            return Err(ControlPlaneError::other(format!(
                "Cannot create already existing endpoint \"{}\".",
                request.endpoint_name
            )));
        }
        state
            .endpoints
            .insert(request.endpoint_name.clone(), EndpointState::InService);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySource {
    objects: HashMap<(String, String), Vec<u8>>,
    reads: Mutex<Vec<(String, String)>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) -> Self {
        self.objects
            .insert((bucket.to_string(), key.to_string()), body.into());
        self
    }

    pub fn reads(&self) -> Vec<(String, String)> {
        self.reads.lock().expect("poisoned mutex").clone()
    }
}

impl DescriptorSource for InMemorySource {
    fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        self.reads
            .lock()
            .expect("poisoned mutex")
            .push((bucket.to_string(), key.to_string()));
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| format!("NoSuchKey: s3://{bucket}/{key}"))
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
    failure: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().expect("poisoned mutex").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, subject: &str, message: &str) -> Result<(), String> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        self.messages
            .lock()
            .expect("poisoned mutex")
            .push((subject.to_string(), message.to_string()));
        Ok(())
    }
}
