//! Gradio inference backend.
//!
//! Talks to a Whisper-style Gradio app (for example a Hugging Face Space)
//! over its HTTP prediction endpoint. The request body mirrors what the
//! Gradio client sends: an audio object followed by the task name and,
//! for diarization, a flag asking for speaker labels.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{InferenceBackend, PredictRequest};

const DEFAULT_API_NAME: &str = "/predict";

/// HTTP client for a Gradio prediction endpoint
pub struct GradioBackend {
    /// Base URL of the Gradio app
    api_url: String,
    /// Endpoint name (`/predict` unless the app names it differently)
    api_name: String,
    /// Hugging Face token for private Spaces
    hf_token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl GradioBackend {
    pub fn new(api_url: impl Into<String>, hf_token: Option<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_name: DEFAULT_API_NAME.to_string(),
            hf_token: hf_token.filter(|t| !t.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
        let name = api_name.into();
        self.api_name = if name.starts_with('/') {
            name
        } else {
            format!("/{}", name)
        };
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/run{}", self.api_url, self.api_name)
    }

    /// JSON body for a prediction
    fn request_body(request: &PredictRequest) -> Value {
        let audio = json!({
            "name": request.payload_name,
            "data": request.payload_base64,
        });

        if request.diarize {
            json!({ "data": [audio, "transcribe", true] })
        } else {
            json!({ "data": [audio, "transcribe"] })
        }
    }

    /// Extract the recognized text from a response body
    fn extract_text(response: PredictResponse) -> Result<String> {
        if let Some(error) = response.error {
            anyhow::bail!("Gradio error: {}", error);
        }

        match response.data.into_iter().next() {
            Some(Value::String(text)) => Ok(text),
            Some(Value::Null) => Ok(String::new()),
            Some(other) => anyhow::bail!("Unexpected Gradio output: {}", other),
            None => anyhow::bail!("Gradio response contained no data"),
        }
    }
}

#[async_trait]
impl InferenceBackend for GradioBackend {
    fn name(&self) -> &str {
        "gradio"
    }

    async fn predict(&self, request: PredictRequest) -> Result<String> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .json(&Self::request_body(&request));

        if let Some(token) = &self.hf_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach {} backend", request.capability))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Backend returned {}: {}", status, body.trim());
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .context("Failed to parse backend response")?;

        Self::extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Capability;

    fn request(diarize: bool) -> PredictRequest {
        PredictRequest {
            capability: if diarize {
                Capability::Diarize
            } else {
                Capability::Transcribe
            },
            payload_name: "file_1".to_string(),
            payload_base64: "AAEC".to_string(),
            diarize,
        }
    }

    #[test]
    fn test_endpoint() {
        let backend = GradioBackend::new("https://space.hf.space/", None);
        assert_eq!(backend.endpoint(), "https://space.hf.space/run/predict");

        let backend = backend.with_api_name("transcribe_file");
        assert_eq!(
            backend.endpoint(),
            "https://space.hf.space/run/transcribe_file"
        );
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let backend = GradioBackend::new("http://x", Some(String::new()));
        assert!(backend.hf_token.is_none());
    }

    #[test]
    fn test_request_body_shapes() {
        let body = GradioBackend::request_body(&request(false));
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["name"], "file_1");
        assert_eq!(body["data"][1], "transcribe");

        let body = GradioBackend::request_body(&request(true));
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
        assert_eq!(body["data"][2], true);
    }

    #[test]
    fn test_extract_text() {
        let ok: PredictResponse = serde_json::from_str(r#"{"data": ["hello"]}"#).unwrap();
        assert_eq!(GradioBackend::extract_text(ok).unwrap(), "hello");

        let null: PredictResponse = serde_json::from_str(r#"{"data": [null]}"#).unwrap();
        assert_eq!(GradioBackend::extract_text(null).unwrap(), "");

        let empty: PredictResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(GradioBackend::extract_text(empty).is_err());

        let failed: PredictResponse =
            serde_json::from_str(r#"{"error": "queue full"}"#).unwrap();
        assert!(GradioBackend::extract_text(failed).is_err());
    }
}
