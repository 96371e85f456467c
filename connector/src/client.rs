//! CyberCare API Client
//!
//! HTTP client for submitting threats to the CyberCare analysis API.

use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::record::ThreatRecord;

/// API endpoint configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Full URL of the single-threat analyze endpoint.
    pub analyze_url: String,
    pub timeout_seconds: u64,
}

impl ApiConfig {
    pub fn new(analyze_url: impl Into<String>) -> Self {
        Self {
            analyze_url: analyze_url.into(),
            timeout_seconds: 30,
        }
    }

    /// Batch endpoint, derived from the analyze URL.
    pub fn batch_url(&self) -> String {
        self.analyze_url.replace("/analyze", "/batch-analyze")
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeResponse {
    pub id: Uuid,
    pub severity: String,
    pub confidence: f32,
    pub techniques: Vec<String>,
    pub recommendation: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    pub job_id: Uuid,
    pub message: String,
    pub status_endpoint: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("server error: HTTP {0}")]
    ServerError(u16),
    #[error("parse error: {0}")]
    ParseError(String),
}

pub struct ApiClient {
    config: ApiConfig,
    http_client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Ok(Self { config, http_client })
    }

    /// Submit a single threat for analysis.
    pub async fn submit(&self, record: &ThreatRecord) -> Result<AnalyzeResponse, ApiError> {
        let response = self.http_client
            .post(&self.config.analyze_url)
            .json(record)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            response.json().await
                .map_err(|e| ApiError::ParseError(e.to_string()))
        } else {
            Err(ApiError::ServerError(response.status().as_u16()))
        }
    }

    /// Submit a batch of threats. The server queues them and returns a job
    /// handle immediately.
    pub async fn submit_batch(&self, records: &[ThreatRecord]) -> Result<BatchResponse, ApiError> {
        let response = self.http_client
            .post(self.config.batch_url())
            .json(records)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            response.json().await
                .map_err(|e| ApiError::ParseError(e.to_string()))
        } else {
            Err(ApiError::ServerError(response.status().as_u16()))
        }
    }
}
