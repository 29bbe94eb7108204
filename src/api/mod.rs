//! Client side of the prediction service.
//!
//! Every remote operation goes through [`SymptomApi`] so the intake panel and the
//! chat assistant can be driven against [`HttpApi`] in production and an in-memory
//! double in tests.

pub mod models;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

pub use models::{
    Ack, Condition, ConfidenceScale, Credentials, DiseaseMatch, HistoryEntry, PredictionRequest,
    PredictionResult, Registration, ReportFile, ReportRequest, SaveHistoryRequest, User,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The service answered with an `{"error": ...}` body
    #[error("{0}")]
    Service(String),
    #[error("service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response from service: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// True for failures where the service never produced a usable answer.
    pub fn is_connectivity(&self) -> bool {
        !matches!(self, ApiError::Service(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Operations offered by the remote health service.
#[async_trait]
pub trait SymptomApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> ApiResult<User>;
    async fn signup(&self, registration: &Registration) -> ApiResult<Ack>;
    async fn suggest_symptoms(&self, partial: &str) -> ApiResult<Vec<String>>;
    async fn predict(&self, request: &PredictionRequest) -> ApiResult<PredictionResult>;
    async fn save_history(&self, request: &SaveHistoryRequest) -> ApiResult<()>;
    async fn history(&self, user_id: i64) -> ApiResult<Vec<HistoryEntry>>;
    async fn generate_report(&self, request: &ReportRequest) -> ApiResult<ReportFile>;
    /// Fetch the bytes behind a server-relative file reference.
    async fn download(&self, file: &ReportFile) -> ApiResult<Vec<u8>>;
}

/// Decode a service body, turning an `error` field into [`ApiError::Service`].
///
/// The service reports failures in the body with either a 2xx or 4xx status, so
/// the status code is not consulted.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        return Err(ApiError::Service(message.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

/// `SymptomApi` over JSON/HTTP
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("medassist/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let body = self.client.get(&url).query(query).send().await?.bytes().await?;
        let decoded = decode_body(&body);
        if let Err(e) = &decoded {
            debug!(%url, error = %e, "request failed");
        }
        decoded
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, payload: &B) -> ApiResult<T> {
        let url = self.url(path);
        debug!(%url, "POST");
        let body = self.client.post(&url).json(payload).send().await?.bytes().await?;
        let decoded = decode_body(&body);
        if let Err(e) = &decoded {
            debug!(%url, error = %e, "request failed");
        }
        decoded
    }
}

#[async_trait]
impl SymptomApi for HttpApi {
    async fn login(&self, credentials: &Credentials) -> ApiResult<User> {
        self.post_json("/login", credentials).await
    }

    async fn signup(&self, registration: &Registration) -> ApiResult<Ack> {
        self.post_json("/signup", registration).await
    }

    async fn suggest_symptoms(&self, partial: &str) -> ApiResult<Vec<String>> {
        self.get_json("/suggest-symptoms", &[("q", partial)]).await
    }

    async fn predict(&self, request: &PredictionRequest) -> ApiResult<PredictionResult> {
        self.post_json("/predict", request).await
    }

    async fn save_history(&self, request: &SaveHistoryRequest) -> ApiResult<()> {
        // The acknowledgement is not inspected, only delivery matters.
        let url = self.url("/save-history");
        debug!(%url, "POST");
        self.client.post(&url).json(request).send().await?;
        Ok(())
    }

    async fn history(&self, user_id: i64) -> ApiResult<Vec<HistoryEntry>> {
        self.get_json(&format!("/history/{}", user_id), &[]).await
    }

    async fn generate_report(&self, request: &ReportRequest) -> ApiResult<ReportFile> {
        self.post_json("/generate-report", request).await
    }

    async fn download(&self, file: &ReportFile) -> ApiResult<Vec<u8>> {
        let url = self.url(&file.file);
        debug!(%url, "GET");
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_field_becomes_service_error() {
        let err = decode_body::<PredictionResult>(br#"{"error": "No valid symptoms found"}"#).unwrap_err();
        assert!(matches!(&err, ApiError::Service(m) if m == "No valid symptoms found"));
        assert!(!err.is_connectivity());
    }

    #[test]
    fn non_json_body_is_connectivity_failure() {
        let err = decode_body::<Vec<String>>(b"<!doctype html>").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(err.is_connectivity());
    }

    #[test]
    fn plain_list_body_decodes() {
        let labels: Vec<String> = decode_body(br#"["high_fever", "mild_fever"]"#).unwrap();
        assert_eq!(labels, vec!["high_fever", "mild_fever"]);
    }

    #[test]
    fn base_url_is_normalized() {
        let api = HttpApi::new("http://127.0.0.1:5000/").unwrap();
        assert_eq!(api.url("/predict"), "http://127.0.0.1:5000/predict");
    }
}
