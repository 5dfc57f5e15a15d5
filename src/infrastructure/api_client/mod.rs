use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::domain::api_config::ApiConfig;
use crate::domain::chat::{QuestionRequest, QuestionResponse, QUESTION_ENDPOINT};
use crate::domain::diagnosis::{
    StartDiagnosisRequest, StartDiagnosisResponse, StepAnswer, StepOutcome,
    DIAGNOSIS_STEP_ENDPOINT, START_DIAGNOSIS_ENDPOINT,
};
use crate::domain::document::{
    PdfFile, UploadOutcome, MAX_UPLOAD_BYTES, PDF_MIME, UPLOAD_ENDPOINT, UPLOAD_FAILED_MESSAGE,
};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::response::extract_error_message;

/// The four calls the TechnicIA backend exposes.
#[async_trait]
pub trait TechniciaApi: Send + Sync {
    async fn upload_document(&self, file: &PdfFile) -> Result<UploadOutcome>;
    async fn ask_question(&self, request: &QuestionRequest) -> Result<QuestionResponse>;
    async fn start_diagnosis(&self, request: &StartDiagnosisRequest)
        -> Result<StartDiagnosisResponse>;
    async fn submit_diagnosis_step(&self, answer: &StepAnswer) -> Result<StepOutcome>;
}

pub struct HttpApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid API base URL '{}': {}", config.base_url, e))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("technicia/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn post_json<B, T>(
        &self,
        endpoint: &str,
        body: &B,
        timeout: Duration,
        fallback_error: &str,
    ) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint_url(endpoint);
        debug!(url = %url, "Sending JSON request");
        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, endpoint = endpoint, "API request failed");
                AppError::from(e)
            })?;
        read_json(response, endpoint, start, fallback_error).await
    }
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
    start: Instant,
    fallback_error: &str,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        error!(error = %e, endpoint = endpoint, "Failed to read API response body");
        AppError::TransportError(format!("Failed to read response body: {}", e))
    })?;
    let latency_ms = start.elapsed().as_millis() as u64;

    if !status.is_success() {
        let message =
            extract_error_message(&body).unwrap_or_else(|| fallback_error.to_string());
        error!(
            endpoint = endpoint,
            status = status.as_u16(),
            latency_ms = latency_ms,
            message = %message,
            "API returned an error status"
        );
        return Err(AppError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    info!(
        endpoint = endpoint,
        status = status.as_u16(),
        latency_ms = latency_ms,
        body_len = body.len(),
        "API response received"
    );

    serde_json::from_str(&body).map_err(|e| {
        error!(error = %e, endpoint = endpoint, "Unexpected API response shape");
        AppError::ParseError(format!("Invalid response from {}: {}", endpoint, e))
    })
}

#[async_trait]
impl TechniciaApi for HttpApiClient {
    async fn upload_document(&self, file: &PdfFile) -> Result<UploadOutcome> {
        if file.mime != PDF_MIME {
            return Err(AppError::ValidationError(format!(
                "{} is not a PDF file",
                file.name
            )));
        }
        if file.size > MAX_UPLOAD_BYTES {
            return Err(AppError::ValidationError(format!(
                "{} exceeds the 150 MB upload limit",
                file.name
            )));
        }

        let bytes = tokio::fs::read(&file.path).await?;
        let part = Part::bytes(bytes)
            .file_name(file.name.clone())
            .mime_str(PDF_MIME)
            .map_err(|e| AppError::Internal(format!("Invalid multipart content type: {}", e)))?;
        let form = Form::new().part("file", part);

        let url = self.config.endpoint_url(UPLOAD_ENDPOINT);
        info!(url = %url, file = %file.name, size = file.size, "Uploading document");
        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .timeout(self.config.upload_timeout())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, file = %file.name, "Document upload failed");
                AppError::from(e)
            })?;
        read_json(response, UPLOAD_ENDPOINT, start, UPLOAD_FAILED_MESSAGE).await
    }

    async fn ask_question(&self, request: &QuestionRequest) -> Result<QuestionResponse> {
        self.post_json(
            QUESTION_ENDPOINT,
            request,
            self.config.question_timeout(),
            "La question n'a pas pu être traitée",
        )
        .await
    }

    async fn start_diagnosis(
        &self,
        request: &StartDiagnosisRequest,
    ) -> Result<StartDiagnosisResponse> {
        self.post_json(
            START_DIAGNOSIS_ENDPOINT,
            request,
            self.config.diagnosis_timeout(),
            "Le diagnostic n'a pas pu être démarré",
        )
        .await
    }

    async fn submit_diagnosis_step(&self, answer: &StepAnswer) -> Result<StepOutcome> {
        self.post_json(
            DIAGNOSIS_STEP_ENDPOINT,
            answer,
            self.config.diagnosis_timeout(),
            "La réponse n'a pas pu être soumise",
        )
        .await
    }
}
