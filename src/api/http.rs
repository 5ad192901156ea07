// HTTP record service client
// Every endpoint answers with the `{success, data, error, message}` envelope.

use async_trait::async_trait;
use log::{info, warn};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use url::Url;

use super::{ApiError, RecordApi};
use crate::config::ApiConfig;
use crate::models::requests::RecordPayload;
use crate::models::responses::{ApiResponse, FileReference, PersistedRecord, QuestionDto};
use crate::models::state::LocalFile;

pub struct HttpRecordApi {
    client: reqwest::Client,
    base: Url,
    records_path: Vec<String>,
    auth_token: Option<String>,
}

impl HttpRecordApi {
    pub fn new(cfg: &ApiConfig) -> anyhow::Result<Self> {
        let mut base = cfg.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| anyhow::anyhow!("Invalid api.base_url '{}': {}", cfg.base_url, e))?;
        if base.cannot_be_a_base() {
            return Err(anyhow::anyhow!(
                "api.base_url '{}' cannot carry a path",
                cfg.base_url
            ));
        }

        let client = reqwest::Client::builder().timeout(cfg.timeout()).build()?;

        Ok(Self {
            client,
            base,
            records_path: cfg
                .records_path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            auth_token: cfg
                .auth_token
                .clone()
                .filter(|t| !t.trim().is_empty()),
        })
    }

    /// Base URL plus path segments (each segment is percent-encoded as a unit).
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::transport("Base URL cannot carry a path"))?;
            path.pop_if_empty();
            for s in segments {
                path.push(s);
            }
        }
        Ok(url)
    }

    fn records_endpoint(&self, record_id: Option<&str>) -> Result<Url, ApiError> {
        let mut segments: Vec<&str> = self.records_path.iter().map(String::as_str).collect();
        if let Some(id) = record_id {
            segments.push(id);
        }
        self.endpoint(&segments)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| ApiError::transport(format!("Failed to read response body: {}", e)))?;
        parse_envelope(status, &body)
    }
}

fn map_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::transport("Request timed out")
    } else {
        ApiError::transport(format!("Request failed: {}", e))
    }
}

fn read_retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(150)
        .factor(2)
        .max_delay(Duration::from_secs(2))
        .take(3)
        .map(jitter)
}

/// Decode the response envelope. A 5xx without an envelope is a transport failure (retryable for
/// reads); everything else that is not `success + data` is a server rejection.
pub(crate) fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    match serde_json::from_str::<ApiResponse<T>>(body) {
        Ok(envelope) => {
            if envelope.success {
                if let Some(data) = envelope.data {
                    return Ok(data);
                }
                return Err(ApiError::server(
                    None,
                    format!("HTTP {}: success envelope without data", status),
                ));
            }
            let message = envelope.failure_message();
            Err(ApiError::server(
                message,
                format!("HTTP {}: request rejected", status),
            ))
        }
        Err(e) if status >= 500 => Err(ApiError::transport(format!(
            "HTTP {}: unreadable response ({})",
            status, e
        ))),
        Err(e) => Err(ApiError::server(
            None,
            format!("HTTP {}: malformed response ({})", status, e),
        )),
    }
}

/// One `files` part per input, in input order.
pub(crate) async fn build_upload_form(files: &[LocalFile]) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for file in files {
        let bytes = file.read_bytes().await.map_err(|e| {
            ApiError::server(
                Some(format!("Could not read '{}'", file.name)),
                format!("Local read failed: {}", e),
            )
        })?;
        let mut part = Part::bytes(bytes).file_name(file.name.clone());
        if !file.content_type.trim().is_empty() {
            part = part.mime_str(&file.content_type).map_err(|e| {
                ApiError::server(None, format!("Invalid content type for '{}': {}", file.name, e))
            })?;
        }
        form = form.part("files", part);
    }
    Ok(form)
}

/// The upload endpoint must answer with exactly one reference per file.
pub(crate) fn check_upload_references(
    expected: usize,
    refs: Vec<FileReference>,
) -> Result<Vec<FileReference>, ApiError> {
    if refs.len() != expected {
        return Err(ApiError::server(
            None,
            format!(
                "Upload returned {} reference(s) for {} file(s)",
                refs.len(),
                expected
            ),
        ));
    }
    Ok(refs)
}

#[async_trait]
impl RecordApi for HttpRecordApi {
    async fn fetch_questions(&self, category_id: &str) -> Result<Vec<QuestionDto>, ApiError> {
        let mut url = self.endpoint(&["questions"])?;
        url.query_pairs_mut().append_pair("categoryId", category_id);

        let attempt = || async { self.send(self.client.get(url.clone())).await };
        let questions: Vec<QuestionDto> =
            RetryIf::spawn(read_retry_strategy(), attempt, |e: &ApiError| {
                if e.retryable {
                    warn!("[PHASE: schema] [STEP: fetch] Retrying question fetch: {}", e.internal_details);
                }
                e.retryable
            })
            .await?;

        info!(
            "[PHASE: schema] [STEP: fetch] Fetched {} question(s) for category {}",
            questions.len(),
            category_id
        );
        Ok(questions)
    }

    async fn upload_files(&self, files: &[LocalFile]) -> Result<Vec<FileReference>, ApiError> {
        let form = build_upload_form(files).await?;
        let url = self.endpoint(&["files", "upload"])?;
        let refs: Vec<FileReference> = self.send(self.client.post(url).multipart(form)).await?;
        check_upload_references(files.len(), refs)
    }

    async fn create_record(&self, payload: &RecordPayload) -> Result<PersistedRecord, ApiError> {
        let url = self.records_endpoint(None)?;
        self.send(self.client.post(url).json(payload)).await
    }

    async fn update_record(
        &self,
        record_id: &str,
        payload: &RecordPayload,
    ) -> Result<PersistedRecord, ApiError> {
        let url = self.records_endpoint(Some(record_id))?;
        self.send(self.client.put(url).json(payload)).await
    }

    async fn fetch_record(&self, record_id: &str) -> Result<PersistedRecord, ApiError> {
        let url = self.records_endpoint(Some(record_id))?;
        let attempt = || async { self.send(self.client.get(url.clone())).await };
        RetryIf::spawn(read_retry_strategy(), attempt, |e: &ApiError| e.retryable).await
    }
}
