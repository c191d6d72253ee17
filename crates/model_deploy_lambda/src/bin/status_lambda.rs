use aws_sdk_sns::error::DisplayErrorContext;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use model_deploy_lambda::adapters::notify::Notifier;
use model_deploy_lambda::config::StatusConfig;
use model_deploy_lambda::handlers::status::{handle_status_event, StatusResponse};
use model_deploy_lambda::logging::init_tracing;
use serde_json::Value;

struct SnsNotifier {
    topic_arn: String,
    sns_client: aws_sdk_sns::Client,
}

impl Notifier for SnsNotifier {
    fn publish(&self, subject: &str, message: &str) -> Result<(), String> {
        let request = self
            .sns_client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message);

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                request
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        format!("failed to publish to sns: {}", DisplayErrorContext(&error))
                    })
            })
        })
    }
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<StatusResponse, Error> {
    let config = StatusConfig::from_env().map_err(|error| Error::from(error.to_string()))?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let notifier = SnsNotifier {
        topic_arn: config.topic_arn,
        sns_client: aws_sdk_sns::Client::new(&aws_config),
    };

    handle_status_event(&event.payload, &notifier).map_err(|error| Error::from(error.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing("model_deploy_lambda=info,status_lambda=info");
    lambda_runtime::run(service_fn(handle_request)).await
}
