use serde::{Deserialize, Serialize};

use super::ScanError;
use crate::config::VisionConfig;

/// A vision-capable model that reads a document image and answers a prompt.
pub trait VisionClient: Send + Sync {
    /// Send `prompt` with one base64-encoded image and return the raw answer.
    fn extract(&self, prompt: &str, image_b64: &str) -> Result<String, ScanError>;
}

/// Client for an Ollama-compatible `/api/chat` endpoint.
pub struct OllamaVisionClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaVisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, ScanError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScanError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
            timeout_secs: config.timeout_secs,
        })
    }
}

/// Request body for /api/chat
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: &'a str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    images: Vec<&'a str>,
}

/// Response body from /api/chat
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl VisionClient for OllamaVisionClient {
    fn extract(&self, prompt: &str, image_b64: &str) -> Result<String, ScanError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
                images: vec![image_b64],
            }],
            stream: false,
            format: "json",
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                ScanError::VisionConnection(self.base_url.clone())
            } else if e.is_timeout() {
                ScanError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                ScanError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ScanError::VisionError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ScanError::ResponseParsing(e.to_string()))?;

        Ok(parsed.message.content)
    }
}

/// Mock vision client for tests: returns a fixed answer or a fixed failure.
pub struct MockVisionClient {
    response: Result<String, (u16, String)>,
}

impl MockVisionClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
        }
    }

    /// A client that always answers with an HTTP error.
    pub fn failing(status: u16, body: &str) -> Self {
        Self {
            response: Err((status, body.to_string())),
        }
    }
}

impl VisionClient for MockVisionClient {
    fn extract(&self, _prompt: &str, _image_b64: &str) -> Result<String, ScanError> {
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err((status, body)) => Err(ScanError::VisionError {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}
