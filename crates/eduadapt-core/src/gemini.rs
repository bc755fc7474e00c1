//! Gemini content provider over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{EduError, GenerationErrorKind, Result};
use crate::generator::{ContentGenerator, GenerationRequest, OutputShape};

/// Calls `models/{model}:generateContent` on the Gemini API.
///
/// Structured requests send the response schema and ask for
/// `application/json`; free-text requests send the prompt alone.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiGenerator {
    /// Creates a client for the configured model and endpoint.
    ///
    /// The HTTP client timeout matches the configured generation timeout.
    pub fn new(config: &GeneratorConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                EduError::generation(
                    GenerationErrorKind::Unavailable,
                    format!("failed to create HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn request_body(request: &GenerationRequest) -> GenerateRequest {
        let generation_config = match request.output_shape() {
            OutputShape::Json(schema) => Some(GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            }),
            OutputShape::Text => None,
        };
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(request.prompt()),
                }],
            }],
            generation_config,
        }
    }

    /// Extracts the concatenated candidate text from a response body.
    fn response_text(body: GenerateResponse) -> Result<String> {
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(EduError::malformed("provider returned no text"));
        }
        Ok(text)
    }

    /// Converts response text into the value for the requested shape.
    fn decode(shape: &OutputShape, text: String) -> Result<Value> {
        match shape {
            OutputShape::Json(_) => serde_json::from_str(&text)
                .map_err(|e| EduError::malformed(format!("response is not JSON: {e}"))),
            OutputShape::Text => Ok(Value::String(text)),
        }
    }
}

fn classify(err: &reqwest::Error) -> GenerationErrorKind {
    if err.is_timeout() {
        GenerationErrorKind::Timeout
    } else if err.is_connect() {
        GenerationErrorKind::Unavailable
    } else {
        GenerationErrorKind::Provider
    }
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        let body = Self::request_body(request);
        debug!(kind = %request.kind(), model = %self.model, "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EduError::generation(classify(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EduError::generation(
                GenerationErrorKind::Provider,
                format!("Gemini API error ({status}): {detail}"),
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EduError::malformed(format!("unreadable provider response: {e}")))?;

        let text = Self::response_text(parsed)?;
        Self::decode(&request.output_shape(), text)
    }
}
