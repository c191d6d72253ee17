use std::time::Duration;

use model_deploy_lambda::config::DeployConfig;
use model_deploy_lambda::runtime::wait::WaitPolicy;
use serde_json::{json, Value};

pub fn deploy_config() -> DeployConfig {
    DeployConfig {
        execution_role_arn: "arn:aws:iam::123456789012:role/model-deploy".to_string(),
        wait_policy: WaitPolicy {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            timeout: Duration::from_secs(60),
        },
    }
}

pub fn descriptor_json(stage: &str) -> Value {
    json!({
        "model_name": "recommender",
        "version": "2.0.1",
        "containers": [
            {"Image": "123456789012.dkr.ecr.eu-west-1.amazonaws.com/recommender:2.0.1",
             "ModelDataUrl": "s3://artifacts/recommender/2.0.1/model.tar.gz",
             "Environment": {"SAGEMAKER_PROGRAM": "inference.py"}}
        ],
        "tags": {"stage": stage, "owner": "ml-platform"},
        "endpoint": {"config": {"variants": [
            {"InstanceType": "ml.m5.large", "InitialInstanceCount": 1, "InitialVariantWeight": 1.0}
        ]}}
    })
}

pub fn s3_event(bucket: &str, keys: &[&str]) -> Value {
    let records: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {"bucket": {"name": bucket}, "object": {"key": key, "size": 512}}
            })
        })
        .collect();
    json!({ "Records": records })
}
