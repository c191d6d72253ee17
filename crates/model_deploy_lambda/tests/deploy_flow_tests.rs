mod support;

use std::sync::atomic::AtomicBool;

use model_deploy_lambda::handlers::deploy::{handle_deploy_event, DeployError, DeployOutcome};
use model_deploy_lambda::test_helpers::{
    ControlPlaneCall, InMemorySource, ManualClock, RecordingControlPlane,
};
use serde_json::Value;
use support::{deploy_config, descriptor_json, s3_event};

fn run(
    event: &Value,
    source: &InMemorySource,
    control_plane: &RecordingControlPlane,
) -> Result<model_deploy_lambda::handlers::deploy::DeployResponse, DeployError> {
    handle_deploy_event(
        event,
        &deploy_config(),
        source,
        control_plane,
        &ManualClock::new(),
        &AtomicBool::new(false),
    )
}

fn body(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("fixture should serialize")
}

#[test]
fn descriptors_missing_required_fields_never_reach_sagemaker() {
    let mut cases = Vec::new();
    for field in ["model_name", "version"] {
        let mut missing = descriptor_json("production");
        missing.as_object_mut().expect("object").remove(field);
        cases.push(missing);

        let mut empty = descriptor_json("production");
        empty[field] = Value::from("");
        cases.push(empty);
    }
    let mut no_containers = descriptor_json("production");
    no_containers["containers"] = Value::Array(Vec::new());
    cases.push(no_containers);

    let mut imageless = descriptor_json("production");
    imageless["containers"]
        .as_array_mut()
        .expect("containers")
        .push(serde_json::json!({"ModelDataUrl": "s3://artifacts/x.tar.gz"}));
    cases.push(imageless);

    let mut blank_image = descriptor_json("test");
    blank_image["containers"][0]["Image"] = Value::from("   ");
    cases.push(blank_image);

    for (index, case) in cases.iter().enumerate() {
        let source = InMemorySource::new().with_object("descriptors", "model.json", body(case));
        let control_plane = RecordingControlPlane::new();

        let response = run(&s3_event("descriptors", &["model.json"]), &source, &control_plane)
            .expect("rejection should not fail the invocation");

        assert!(
            response.deployments[0].outcome.is_rejected(),
            "case {index} should be rejected"
        );
        assert!(
            control_plane.calls().is_empty(),
            "case {index} made control-plane calls"
        );
    }
}

#[test]
fn stage_controls_how_far_the_sequence_runs() {
    for (stage, expected_calls) in [
        ("test", 2usize),
        ("dev", 2),
        ("PRODUCTION", 2),
        ("production", 7),
    ] {
        let source = InMemorySource::new().with_object(
            "descriptors",
            "model.json",
            body(&descriptor_json(stage)),
        );
        let control_plane = RecordingControlPlane::new();

        run(&s3_event("descriptors", &["model.json"]), &source, &control_plane)
            .expect("deploy should succeed");

        assert_eq!(
            control_plane.calls().len(),
            expected_calls,
            "stage {stage}: {:?}",
            control_plane.operations()
        );
    }
}

#[test]
fn production_redeploy_replaces_every_resource() {
    let source = InMemorySource::new().with_object(
        "descriptors",
        "recommender/2.0.1.json",
        body(&descriptor_json("production")),
    );
    let control_plane = RecordingControlPlane::new()
        .with_model("recommender-2-0-1")
        .with_endpoint_config("recommender-2-0-1")
        .with_endpoint("recommender-2-0-1")
        .with_deletion_polls(3);

    let response = run(
        &s3_event("descriptors", &["recommender/2.0.1.json"]),
        &source,
        &control_plane,
    )
    .expect("deploy should succeed");

    assert_eq!(
        response.deployments[0].outcome,
        DeployOutcome::EndpointDeployed {
            resource_name: "recommender-2-0-1".to_string(),
            status_checks: 4,
        }
    );
    assert!(control_plane.has_model("recommender-2-0-1"));
    assert!(control_plane.has_endpoint_config("recommender-2-0-1"));
    assert!(control_plane.has_endpoint("recommender-2-0-1"));

    let created_endpoint = control_plane.calls().into_iter().find_map(|call| match call {
        ControlPlaneCall::CreateEndpoint(request) => Some(request),
        _ => None,
    });
    let created_endpoint = created_endpoint.expect("endpoint should be created");
    assert_eq!(created_endpoint.endpoint_config_name, "recommender-2-0-1");
    assert_eq!(
        created_endpoint.tags.get("owner").map(String::as_str),
        Some("ml-platform")
    );
}

#[test]
fn multi_container_models_pass_every_container() {
    let mut descriptor = descriptor_json("test");
    descriptor["containers"]
        .as_array_mut()
        .expect("containers")
        .push(serde_json::json!({"Image": "123456789012.dkr.ecr.eu-west-1.amazonaws.com/postprocess:1"}));
    let source =
        InMemorySource::new().with_object("descriptors", "model.json", body(&descriptor));
    let control_plane = RecordingControlPlane::new();

    run(&s3_event("descriptors", &["model.json"]), &source, &control_plane)
        .expect("deploy should succeed");

    let calls = control_plane.calls();
    let ControlPlaneCall::CreateModel(request) = &calls[1] else {
        panic!("expected create_model, got {:?}", calls[1]);
    };
    assert_eq!(request.containers.len(), 2);
}

#[test]
fn processes_every_record_in_order() {
    let mut second = descriptor_json("test");
    second["version"] = Value::from("3.0.0");
    let source = InMemorySource::new()
        .with_object("descriptors", "a.json", body(&descriptor_json("test")))
        .with_object("descriptors", "b.json", body(&second));
    let control_plane = RecordingControlPlane::new();

    let response = run(
        &s3_event("descriptors", &["a.json", "b.json"]),
        &source,
        &control_plane,
    )
    .expect("deploy should succeed");

    let names: Vec<_> = response
        .deployments
        .iter()
        .map(|deployment| match &deployment.outcome {
            DeployOutcome::ModelCreated { resource_name, .. } => resource_name.clone(),
            other => panic!("unexpected outcome {other:?}"),
        })
        .collect();
    assert_eq!(names, vec!["recommender-2-0-1", "recommender-3-0-0"]);
}

#[test]
fn response_serializes_with_status_tags() {
    let source = InMemorySource::new().with_object(
        "descriptors",
        "model.json",
        body(&descriptor_json("test")),
    );
    let response = run(
        &s3_event("descriptors", &["model.json"]),
        &source,
        &RecordingControlPlane::new(),
    )
    .expect("deploy should succeed");

    let json = serde_json::to_value(&response).expect("response should serialize");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["deployments"][0]["outcome"]["status"], "model_created");
    assert_eq!(json["deployments"][0]["outcome"]["stage"], "test");
}
