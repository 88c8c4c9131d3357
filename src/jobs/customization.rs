//! Fine-tuning jobs and provisioned throughput
//!
//! Thin wrappers over the control-plane endpoints: create a customization
//! job, read its status, wait for it to finish and buy provisioned
//! throughput for the resulting custom model.

use crate::core::client::{BedrockClient, Service};
use crate::core::constants::status;
use crate::core::provider::BedrockError;
use crate::jobs::poller::{JobStatus, PollError, Poller};
use crate::models::bedrock::{
    CreateCustomizationJobRequest, CreateCustomizationJobResponse, CustomizationJob,
    CustomizationStatus, FoundationModelSummary, FoundationModelsResponse,
    ProvisionedThroughputRequest, ProvisionedThroughputResponse, S3DataConfig,
    ValidationDataConfig,
};
use std::collections::HashMap;
use tracing::info;

const CUSTOMIZATION_JOBS: &str = "model-customization-jobs";
const FINE_TUNING: &str = "FINE_TUNING";

impl CustomizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomizationStatus::InProgress => status::IN_PROGRESS,
            CustomizationStatus::Completed => status::COMPLETED,
            CustomizationStatus::Failed => status::FAILED,
            CustomizationStatus::Stopping => status::STOPPING,
            CustomizationStatus::Stopped => status::STOPPED,
            CustomizationStatus::Unknown => "Unknown",
        }
    }
}

impl JobStatus for CustomizationJob {
    fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            CustomizationStatus::Completed | CustomizationStatus::Failed | CustomizationStatus::Stopped
        )
    }

    fn label(&self) -> String {
        match &self.failure_message {
            Some(message) if self.status == CustomizationStatus::Failed => {
                format!("{} ({message})", self.status.as_str())
            }
            _ => self.status.as_str().to_string(),
        }
    }
}

/// Parameters of a fine-tuning job
#[derive(Debug, Clone)]
pub struct FineTuneJob {
    pub job_name: String,
    pub custom_model_name: String,
    pub role_arn: String,
    pub base_model: String,
    pub training_s3_uri: String,
    pub validation_s3_uri: Option<String>,
    pub output_s3_uri: String,
    pub hyper_parameters: HashMap<String, String>,
}

impl FineTuneJob {
    fn to_request(&self) -> CreateCustomizationJobRequest {
        CreateCustomizationJobRequest {
            job_name: self.job_name.clone(),
            custom_model_name: self.custom_model_name.clone(),
            role_arn: self.role_arn.clone(),
            base_model_identifier: self.base_model.clone(),
            customization_type: Some(FINE_TUNING.to_string()),
            training_data_config: S3DataConfig {
                s3_uri: self.training_s3_uri.clone(),
            },
            validation_data_config: self.validation_s3_uri.as_ref().map(|uri| ValidationDataConfig {
                validators: vec![S3DataConfig { s3_uri: uri.clone() }],
            }),
            output_data_config: S3DataConfig {
                s3_uri: self.output_s3_uri.clone(),
            },
            hyper_parameters: self.hyper_parameters.clone(),
        }
    }
}

/// Create a customization job and return its ARN
pub async fn submit(client: &BedrockClient, job: &FineTuneJob) -> Result<String, BedrockError> {
    info!(
        "Submitting fine-tuning job {} on {} (training data {})",
        job.job_name, job.base_model, job.training_s3_uri
    );

    let response: CreateCustomizationJobResponse = client
        .post_json(Service::Control, &[CUSTOMIZATION_JOBS], &job.to_request())
        .await?;

    info!("Created job {}", response.job_arn);
    Ok(response.job_arn)
}

pub async fn status(client: &BedrockClient, job_arn: &str) -> Result<CustomizationJob, BedrockError> {
    client
        .get_json(Service::Control, &[CUSTOMIZATION_JOBS, job_arn], &[])
        .await
}

/// Poll a customization job until it completes, fails or is stopped
pub async fn wait(
    client: &BedrockClient,
    job_arn: &str,
    poller: &Poller,
) -> Result<CustomizationJob, PollError> {
    poller
        .poll_until(job_arn, || status(client, job_arn))
        .await
}

/// Buy provisioned throughput for a model and return its ARN
pub async fn create_provisioned_throughput(
    client: &BedrockClient,
    model_id: &str,
    provisioned_model_name: &str,
    model_units: u32,
) -> Result<String, BedrockError> {
    let request = ProvisionedThroughputRequest {
        model_units,
        provisioned_model_name: provisioned_model_name.to_string(),
        model_id: model_id.to_string(),
    };

    let response: ProvisionedThroughputResponse = client
        .post_json(Service::Control, &["provisioned-model-throughput"], &request)
        .await?;

    info!(
        "Provisioned {} unit(s) of {} as {}",
        model_units, model_id, response.provisioned_model_arn
    );
    Ok(response.provisioned_model_arn)
}

pub async fn list_foundation_models(
    client: &BedrockClient,
) -> Result<Vec<FoundationModelSummary>, BedrockError> {
    let response: FoundationModelsResponse = client
        .get_json(Service::Control, &["foundation-models"], &[])
        .await?;
    Ok(response.model_summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::ServiceEndpoints;
    use mockito::Matcher;
    use std::time::Duration;

    const JOB_ARN: &str = "arn:aws:bedrock:us-west-2:123456789012:model-customization-job/llama/abc123";

    fn test_client(base_url: &str) -> BedrockClient {
        BedrockClient::new(
            "test-key".to_string(),
            ServiceEndpoints::uniform(base_url),
            5,
            0,
            Duration::ZERO,
        )
        .unwrap()
    }

    fn job() -> FineTuneJob {
        FineTuneJob {
            job_name: "llama-ft-20241001".to_string(),
            custom_model_name: "llama-custom-20241001".to_string(),
            role_arn: "arn:aws:iam::123456789012:role/bedrock-ft".to_string(),
            base_model: "meta.llama3-2-11b-instruct-v1:0:128k".to_string(),
            training_s3_uri: "s3://bucket/train.jsonl".to_string(),
            validation_s3_uri: None,
            output_s3_uri: "s3://bucket/output/".to_string(),
            hyper_parameters: HashMap::from([("epochCount".to_string(), "1".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_submit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/model-customization-jobs")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "jobName": "llama-ft-20241001",
                "baseModelIdentifier": "meta.llama3-2-11b-instruct-v1:0:128k",
                "customizationType": "FINE_TUNING",
                "trainingDataConfig": {"s3Uri": "s3://bucket/train.jsonl"},
                "hyperParameters": {"epochCount": "1"}
            })))
            .with_status(201)
            .with_body(format!(r#"{{"jobArn": "{JOB_ARN}"}}"#))
            .create_async()
            .await;

        let arn = submit(&test_client(&server.url()), &job()).await.unwrap();
        assert_eq!(arn, JOB_ARN);
        mock.assert_async().await;
    }

    #[test]
    fn test_validation_data_is_optional() {
        let request = serde_json::to_value(job().to_request()).unwrap();
        assert!(request.get("validationDataConfig").is_none());

        let mut with_validation = job();
        with_validation.validation_s3_uri = Some("s3://bucket/validation.jsonl".to_string());
        let request = serde_json::to_value(with_validation.to_request()).unwrap();
        assert_eq!(
            request["validationDataConfig"]["validators"][0]["s3Uri"],
            "s3://bucket/validation.jsonl"
        );
    }

    #[tokio::test]
    async fn test_wait_until_completed() {
        let mut server = mockito::Server::new_async().await;
        let path = Matcher::Regex(r"^/model-customization-jobs/arn".to_string());
        let running = server
            .mock("GET", path.clone())
            .with_status(200)
            .with_body(format!(r#"{{"jobArn": "{JOB_ARN}", "status": "InProgress"}}"#))
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let poller = Poller::new(Duration::from_millis(1), None);

        let first = status(&client, JOB_ARN).await.unwrap();
        assert!(!first.is_terminal());
        running.assert_async().await;
        running.remove_async().await;

        server
            .mock("GET", path)
            .with_status(200)
            .with_body(format!(
                r#"{{"jobArn": "{JOB_ARN}", "status": "Completed", "outputModelArn": "arn:custom"}}"#
            ))
            .create_async()
            .await;

        let done = wait(&client, JOB_ARN, &poller).await.unwrap();
        assert_eq!(done.status, CustomizationStatus::Completed);
        assert_eq!(done.output_model_arn.as_deref(), Some("arn:custom"));
    }

    #[test]
    fn test_failed_label_includes_message() {
        let job: CustomizationJob = serde_json::from_str(&format!(
            r#"{{"jobArn": "{JOB_ARN}", "status": "Failed", "failureMessage": "bad data"}}"#
        ))
        .unwrap();
        assert!(job.is_terminal());
        assert_eq!(job.label(), "Failed (bad data)");
    }

    #[tokio::test]
    async fn test_provisioned_throughput() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/provisioned-model-throughput")
            .match_body(Matcher::PartialJson(serde_json::json!({"modelUnits": 1, "modelId": "arn:custom"})))
            .with_status(201)
            .with_body(r#"{"provisionedModelArn": "arn:provisioned"}"#)
            .create_async()
            .await;

        let arn = create_provisioned_throughput(&test_client(&server.url()), "arn:custom", "pt-1", 1)
            .await
            .unwrap();
        assert_eq!(arn, "arn:provisioned");
    }

    #[tokio::test]
    async fn test_list_foundation_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/foundation-models")
            .with_status(200)
            .with_body(r#"{"modelSummaries": [{"modelId": "amazon.nova-lite-v1:0", "providerName": "Amazon"}]}"#)
            .create_async()
            .await;

        let models = list_foundation_models(&test_client(&server.url())).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].provider_name.as_deref(), Some("Amazon"));
    }
}
