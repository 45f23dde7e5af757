//! ============================================================================
//! Chat Client - OpenAI-compatible chat completions
//! ============================================================================
//! Thin client over the /chat/completions endpoint with three call shapes:
//! plain completion, JSON-mode completion (for the coach plan) and SSE
//! streaming (token deltas terminated by a [DONE] marker).
//! ============================================================================

use anyhow::{anyhow, Result};
use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Client for an OpenAI-compatible chat endpoint
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One-shot completion, returns the assistant message content
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        self.call(messages, temperature, max_tokens, None).await
    }

    /// Completion with `response_format: json_object`, used when the caller
    /// parses the answer as JSON
    pub async fn complete_json(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        self.call(
            messages,
            temperature,
            max_tokens,
            Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        )
        .await
    }

    async fn call(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: Option<u32>,
        response_format: Option<ResponseFormat>,
    ) -> Result<String> {
        debug!("Calling chat API with {} messages", messages.len());

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(temperature),
            max_tokens,
            stream: None,
            response_format,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call chat API: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Chat API error {}: {}", status, body));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse API response: {}", e))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response from chat API"))
    }

    /// Streaming completion. Yields token deltas as they arrive; the stream
    /// ends when the API sends its `[DONE]` marker.
    pub fn stream(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> impl Stream<Item = Result<String>> + Send + 'static {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let model = self.model.clone();

        try_stream! {
            let request = ChatCompletionRequest {
                model,
                messages,
                temperature: Some(temperature),
                max_tokens: None,
                stream: Some(true),
                response_format: None,
            };

            let response = client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| anyhow!("Failed to call chat API: {}", e))?;

            let response = if response.status().is_success() {
                response
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                Err::<(), _>(anyhow!("Chat API error {}: {}", status, body))?;
                unreachable!()
            };

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut done = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| anyhow!("Stream read error: {}", e))?;
                buffer.extend_from_slice(&chunk);

                // SSE frames are separated by a blank line.
                while let Some(end) = find_frame_end(&buffer) {
                    let frame: Vec<u8> = buffer.drain(..end + 2).collect();
                    for delta in parse_frame(&frame)? {
                        match delta {
                            StreamEvent::Token(token) => yield token,
                            StreamEvent::Done => {
                                done = true;
                                break;
                            }
                        }
                    }
                    if done {
                        break;
                    }
                }
                if done {
                    break;
                }
            }
        }
    }
}

enum StreamEvent {
    Token(String),
    Done,
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Parse one SSE frame into token deltas
fn parse_frame(frame: &[u8]) -> Result<Vec<StreamEvent>> {
    let text = String::from_utf8_lossy(frame);
    let mut events = Vec::new();

    for line in text.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }
        if payload == "[DONE]" {
            events.push(StreamEvent::Done);
            break;
        }

        let parsed: StreamChunk = serde_json::from_str(payload)
            .map_err(|e| anyhow!("Failed to parse stream chunk: {} - payload: {}", e, payload))?;
        if let Some(content) = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
        {
            if !content.is_empty() {
                events.push(StreamEvent::Token(content));
            }
        }
    }

    Ok(events)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(frame: &str) -> Vec<String> {
        parse_frame(frame.as_bytes())
            .unwrap()
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::Token(token) => Some(token),
                StreamEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_frame_token() {
        let frame = r#"data: {"choices":[{"delta":{"content":"Hola"}}]}"#;
        assert_eq!(tokens(frame), vec!["Hola".to_string()]);
    }

    #[test]
    fn test_parse_frame_done() {
        let events = parse_frame(b"data: [DONE]").unwrap();
        assert!(matches!(events.as_slice(), [StreamEvent::Done]));
    }

    #[test]
    fn test_parse_frame_empty_delta() {
        // The first chunk usually carries only the role.
        let frame = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(tokens(frame).is_empty());
    }

    #[test]
    fn test_parse_frame_ignores_comments() {
        let frame = ": keep-alive\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}";
        assert_eq!(tokens(frame), vec!["x".to_string()]);
    }

    #[test]
    fn test_find_frame_end() {
        assert_eq!(find_frame_end(b"data: a\n\ndata: b"), Some(7));
        assert_eq!(find_frame_end(b"data: incomplete"), None);
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
    }
}
