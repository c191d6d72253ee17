use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::adapters::notify::Notifier;

pub const SAGEMAKER_EVENT_SOURCE: &str = "aws.sagemaker";
pub const ENDPOINT_STATE_CHANGE: &str = "SageMaker Endpoint State Change";
const MAX_SUBJECT_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointStateChange {
    pub endpoint_name: String,
    pub endpoint_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub relayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("invalid status event: {0}")]
    InvalidEvent(String),
    #[error("failed to publish status notification: {0}")]
    Publish(String),
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(default)]
    source: String,
    #[serde(rename = "detail-type", default)]
    detail_type: String,
    #[serde(default)]
    detail: Value,
}

/// Returns `Ok(None)` for events that are not endpoint state changes.
pub fn parse_status_event(event: &Value) -> Result<Option<EndpointStateChange>, StatusError> {
    let envelope = EventEnvelope::deserialize(event)
        .map_err(|error| StatusError::InvalidEvent(error.to_string()))?;

    if envelope.source != SAGEMAKER_EVENT_SOURCE || envelope.detail_type != ENDPOINT_STATE_CHANGE {
        return Ok(None);
    }

    EndpointStateChange::deserialize(&envelope.detail)
        .map(Some)
        .map_err(|error| StatusError::InvalidEvent(format!("malformed detail: {error}")))
}

pub fn handle_status_event(
    event: &Value,
    notifier: &impl Notifier,
) -> Result<StatusResponse, StatusError> {
    let Some(change) = parse_status_event(event)? else {
        warn!(
            component = "status_handler",
            event = "event_ignored",
            source = event.get("source").and_then(serde_json::Value::as_str).unwrap_or_default()
        );
        return Ok(StatusResponse {
            relayed: false,
            endpoint_name: None,
            endpoint_status: None,
        });
    };

    let subject = notification_subject(&change);
    let message = notification_message(&change);
    notifier
        .publish(&subject, &message)
        .map_err(StatusError::Publish)?;

    info!(
        component = "status_handler",
        event = "status_relayed",
        endpoint_name = %change.endpoint_name,
        endpoint_status = %change.endpoint_status
    );

    Ok(StatusResponse {
        relayed: true,
        endpoint_name: Some(change.endpoint_name),
        endpoint_status: Some(change.endpoint_status),
    })
}

fn notification_subject(change: &EndpointStateChange) -> String {
    let subject = format!(
        "SageMaker endpoint {} is {}",
        change.endpoint_name, change.endpoint_status
    );
    subject.chars().take(MAX_SUBJECT_LEN).collect()
}

fn notification_message(change: &EndpointStateChange) -> String {
    let mut lines = vec![
        format!("Endpoint: {}", change.endpoint_name),
        format!("Status: {}", change.endpoint_status),
    ];
    if let Some(arn) = &change.endpoint_arn {
        lines.push(format!("ARN: {arn}"));
    }
    if let Some(reason) = &change.failure_reason {
        lines.push(format!("Failure reason: {reason}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_helpers::RecordingNotifier;

    fn state_change(status: &str, failure_reason: Option<&str>) -> Value {
        let mut detail = json!({
            "EndpointName": "foo-1-2-3",
            "EndpointStatus": status,
            "EndpointArn": "arn:aws:sagemaker:eu-west-1:123456789012:endpoint/foo-1-2-3",
        });
        if let Some(reason) = failure_reason {
            detail["FailureReason"] = Value::from(reason);
        }
        json!({
            "version": "0",
            "source": "aws.sagemaker",
            "detail-type": "SageMaker Endpoint State Change",
            "detail": detail,
        })
    }

    #[test]
    fn relays_endpoint_state_changes() {
        let notifier = RecordingNotifier::new();
        let response =
            handle_status_event(&state_change("IN_SERVICE", None), &notifier).expect("relay");

        assert!(response.relayed);
        assert_eq!(response.endpoint_status.as_deref(), Some("IN_SERVICE"));
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "SageMaker endpoint foo-1-2-3 is IN_SERVICE");
        assert!(messages[0].1.contains("ARN: arn:aws:sagemaker"));
    }

    #[test]
    fn includes_failure_reason() {
        let notifier = RecordingNotifier::new();
        handle_status_event(
            &state_change("FAILED", Some("Image not found")),
            &notifier,
        )
        .expect("relay");

        assert!(notifier.messages()[0]
            .1
            .contains("Failure reason: Image not found"));
    }

    #[test]
    fn ignores_unrelated_events() {
        let notifier = RecordingNotifier::new();
        let response = handle_status_event(
            &json!({"source": "aws.ec2", "detail-type": "EC2 Instance State-change Notification", "detail": {}}),
            &notifier,
        )
        .expect("ignored event is not an error");

        assert!(!response.relayed);
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn rejects_state_change_without_endpoint_name() {
        let event = json!({
            "source": "aws.sagemaker",
            "detail-type": "SageMaker Endpoint State Change",
            "detail": {"EndpointStatus": "FAILED"}
        });
        let error = parse_status_event(&event).expect_err("missing name should fail");
        assert!(matches!(error, StatusError::InvalidEvent(_)));
    }

    #[test]
    fn publish_failures_fail_the_invocation() {
        let notifier = RecordingNotifier::failing("AuthorizationError");
        let error = handle_status_event(&state_change("DELETING", None), &notifier)
            .expect_err("publish failure should propagate");
        assert_eq!(
            error,
            StatusError::Publish("AuthorizationError".to_string())
        );
    }

    #[test]
    fn subject_is_clipped_to_sns_limit() {
        let change = EndpointStateChange {
            endpoint_name: "x".repeat(150),
            endpoint_status: "IN_SERVICE".to_string(),
            endpoint_arn: None,
            failure_reason: None,
        };
        assert_eq!(notification_subject(&change).chars().count(), MAX_SUBJECT_LEN);
    }
}
