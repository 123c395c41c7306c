use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const MODEL: &str = "claude-sonnet-4-20250514";

// Exchanges retained in follow-up mode.
const MAX_RETAINED: usize = 10;

/// The natural-language backend, as the session consumes it. Absence of a
/// working implementation disables the AI features, nothing else.
pub trait TextGenerator {
    async fn chat(&mut self, context: &str, request: &str) -> Result<String>;
    fn reset(&mut self);
}

#[derive(Debug, Clone)]
struct Exchange {
    request: String,
    response: String,
}

#[derive(Debug, Clone)]
pub struct Client {
    api_key: String,
    http: reqwest::Client,
    follow_up: bool,
    exchanges: Vec<Exchange>,
    transcript: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: &'static str,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    text: Option<String>,
}

impl Client {
    pub fn new(api_key: &str, follow_up: bool) -> Self {
        let transcript = dirs::data_dir().map(|p| p.join("sqlitem").join("ai-history.txt"));

        // Each session starts a fresh transcript.
        if let Some(path) = &transcript {
            let _ = std::fs::remove_file(path);
        }

        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            follow_up,
            exchanges: Vec::new(),
            transcript,
        }
    }

    async fn request_text(&self, request: ApiRequest) -> Result<String> {
        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("failed to reach the AI backend")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("AI backend error ({}): {}", status, body);
        }

        let mut full_text = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("failed to read stream chunk")?;
            let text = String::from_utf8_lossy(&chunk);

            for line in text.lines() {
                if let Some(data) = line.strip_prefix("data: ") {
                    if data == "[DONE]" {
                        continue;
                    }
                    if let Ok(event) = serde_json::from_str::<StreamEvent>(data) {
                        if event.event_type == "content_block_delta" {
                            if let Some(text) = event.delta.and_then(|d| d.text) {
                                full_text.push_str(&text);
                            }
                        }
                    }
                }
            }
        }

        Ok(full_text.trim().to_string())
    }

    fn record(&mut self, request: &str, response: &str) {
        self.exchanges.push(Exchange {
            request: request.to_string(),
            response: response.to_string(),
        });
        if self.exchanges.len() > MAX_RETAINED {
            self.exchanges.remove(0);
        }

        if let Some(path) = &self.transcript {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                let _ = writeln!(file, "User: {request}\nAssistant: {response}\n");
            }
        }
    }
}

impl TextGenerator for Client {
    async fn chat(&mut self, context: &str, request: &str) -> Result<String> {
        let mut messages = Vec::new();

        if self.follow_up {
            for exchange in &self.exchanges {
                messages.push(Message {
                    role: "user".to_string(),
                    content: exchange.request.clone(),
                });
                messages.push(Message {
                    role: "assistant".to_string(),
                    content: exchange.response.clone(),
                });
            }
        }

        messages.push(Message {
            role: "user".to_string(),
            content: request.to_string(),
        });

        let api_request = ApiRequest {
            model: MODEL,
            max_tokens: 1024,
            system: context.to_string(),
            messages,
            stream: Some(true),
        };

        let response = self.request_text(api_request).await?;

        if self.follow_up {
            self.record(request, &response);
        }

        Ok(response)
    }

    fn reset(&mut self) {
        self.exchanges.clear();
        tracing::info!("new conversation thread started");
    }
}
