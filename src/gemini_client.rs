use async_trait::async_trait;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{ChatConfig, Persona};
use crate::inference::{InferenceClient, InferenceError};

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

// Every level of the response is optional; Gemini omits `content` when a
// candidate is blocked and omits `candidates` entirely on prompt feedback.
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// `candidates[0].content.parts[0].text`, if present and non-empty.
    fn into_text(self) -> Option<String> {
        self.candidates?
            .into_iter()
            .next()?
            .content?
            .parts?
            .into_iter()
            .next()?
            .text
            .filter(|text| !text.is_empty())
    }
}

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    persona: Persona,
}

impl GeminiClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.api_base, config.model
        );

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            persona: config.persona.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<Option<String>, InferenceError> {
        let request_body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part {
                        text: self.persona.instruction(),
                    },
                    Part { text: prompt },
                ],
            }],
        };

        debug!("Sending request to Gemini API at {}: {:?}", self.endpoint, request_body);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            error!("API request failed with status {}: {}", status, body);
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Received response from Gemini API: {}", body);

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        Ok(parsed.into_text())
    }
}

// reqwest errors print the request URL; keep it out of logs.
fn transport(e: reqwest::Error) -> InferenceError {
    InferenceError::Transport(e.without_url())
}
