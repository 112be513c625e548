use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    AtRiskRequest, AtRiskResponse, FilesResponse, PredictRequest, PredictResponse,
    ResultsResponse, UploadResponse,
};

const MAX_RESPONSE_BYTES: usize = 32 * 1024 * 1024;
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ChurnService: Send + Sync {
    fn list_files(&self) -> Result<FilesResponse, ServiceError>;
    fn list_runs(&self) -> Result<ResultsResponse, ServiceError>;
    fn upload(&self, path: &Path) -> Result<UploadResponse, ServiceError>;
    fn predict(&self, storage_key: &str) -> Result<PredictResponse, ServiceError>;
    fn at_risk(&self, storage_key: &str, threshold: f64) -> Result<AtRiskResponse, ServiceError>;
}

pub type SharedService = Arc<dyn ChurnService>;

pub async fn run_blocking<T, F>(service: &SharedService, call: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ChurnService) -> Result<T, ServiceError> + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || call(service.as_ref()))
        .await
        .map_err(|err| ServiceError::Transport(format!("request task failed: {err}")))?
}

pub struct HttpChurnService {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpChurnService {
    pub fn new(base_url: &str, connect_timeout: Duration, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .timeout_write(read_timeout)
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let request = self.agent.get(&self.url(path)).set("Accept", "application/json");
        let body = read_body(map_call(request.call())?)?;
        parse_json(&body)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
    ) -> Result<T, ServiceError> {
        let request = self
            .agent
            .post(&self.url(path))
            .set("Accept", "application/json");
        let body = read_body(map_call(request.send_json(payload))?)?;
        parse_json(&body)
    }
}

impl ChurnService for HttpChurnService {
    fn list_files(&self) -> Result<FilesResponse, ServiceError> {
        self.get("/files")
    }

    fn list_runs(&self) -> Result<ResultsResponse, ServiceError> {
        self.get("/results")
    }

    fn upload(&self, path: &Path) -> Result<UploadResponse, ServiceError> {
        let contents = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("dataset.csv");
        let boundary = format!("churn-{}", Uuid::new_v4().simple());
        let payload = multipart_body(&boundary, file_name, &contents);
        let request = self.agent.post(&self.url("/upload")).set(
            "Content-Type",
            &format!("multipart/form-data; boundary={boundary}"),
        );
        let body = read_body(map_call(request.send_bytes(&payload))?)?;
        // Success is signalled by the status alone; the body is informational.
        Ok(serde_json::from_str(body.trim()).unwrap_or_default())
    }

    fn predict(&self, storage_key: &str) -> Result<PredictResponse, ServiceError> {
        self.post_json(
            "/predict",
            &PredictRequest {
                filename: storage_key,
            },
        )
    }

    fn at_risk(&self, storage_key: &str, threshold: f64) -> Result<AtRiskResponse, ServiceError> {
        self.post_json(
            "/at-risk-users",
            &AtRiskRequest {
                filename: storage_key,
                threshold,
            },
        )
    }
}

fn map_call(result: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, ServiceError> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code, response)) => {
            let body = read_body(response).unwrap_or_else(|err| err.to_string());
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            Err(ServiceError::Status { code, body })
        }
        Err(ureq::Error::Transport(err)) => Err(ServiceError::Transport(err.to_string())),
    }
}

fn read_body(response: ureq::Response) -> Result<String, ServiceError> {
    let mut limited = response.into_reader().take(MAX_RESPONSE_BYTES as u64 + 1);
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes)?;
    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(ServiceError::Malformed(format!(
            "response exceeded {MAX_RESPONSE_BYTES} bytes"
        )));
    }
    String::from_utf8(bytes).map_err(|err| ServiceError::Malformed(err.to_string()))
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ServiceError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Malformed("empty response body".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|err| ServiceError::Malformed(err.to_string()))
}

fn multipart_body(boundary: &str, file_name: &str, contents: &[u8]) -> Vec<u8> {
    let safe_name = file_name.replace('"', "_");
    let mut body = Vec::with_capacity(contents.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{safe_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
