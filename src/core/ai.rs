use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::stream::Stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const CONNECT_TIMEOUT_SECS: u64 = 10;
/// A stream that goes silent for this long is treated as dead.
const READ_IDLE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Plain string for text-only models, or vision parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageRef },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

enum SseLine {
    Delta(String),
    Done,
    Skip,
}

/// Incremental parser for an SSE chat-completions stream. Bytes go in,
/// content deltas come out; `[DONE]` latches the parser shut.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    done: bool,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }

        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match parse_sse_line(&line[..line.len() - 1]) {
                SseLine::Delta(content) => deltas.push(content),
                SseLine::Done => {
                    self.done = true;
                    self.buffer.clear();
                    return deltas;
                }
                SseLine::Skip => {}
            }
        }
        deltas
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

fn parse_sse_line(line: &[u8]) -> SseLine {
    let Ok(line) = std::str::from_utf8(line) else {
        return SseLine::Skip;
    };
    let line = line.trim_end_matches('\r');

    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(response) => {
            let content = response
                .choices
                .first()
                .and_then(|choice| choice.delta.content.clone());
            match content {
                Some(content) if !content.is_empty() => SseLine::Delta(content),
                _ => SseLine::Skip,
            }
        }
        Err(_) => SseLine::Skip,
    }
}

/// When screenshots are present, the last user message is rewritten into
/// vision parts with the images appended.
pub fn attach_screenshots(
    mut messages: Vec<ChatMessage>,
    screenshots: Vec<String>,
) -> Vec<ChatMessage> {
    if screenshots.is_empty() {
        return messages;
    }

    let images = screenshots.into_iter().map(|url| ContentPart::ImageUrl {
        image_url: ImageRef { url },
    });

    match messages.iter_mut().rev().find(|message| message.role == "user") {
        Some(message) => {
            let mut parts = match std::mem::replace(
                &mut message.content,
                MessageContent::Text(String::new()),
            ) {
                MessageContent::Text(text) => vec![ContentPart::Text { text }],
                MessageContent::Parts(parts) => parts,
            };
            parts.extend(images);
            message.content = MessageContent::Parts(parts);
        }
        None => messages.push(ChatMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(images.collect()),
        }),
    }

    messages
}

pub struct AiClient {
    client: Client,
}

impl AiClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Open one streaming chat completion and return the delta stream.
    /// Deltas arrive in wire order; the stream ends after `[DONE]` or when
    /// the connection closes.
    pub async fn stream_chat(
        &self,
        base_url: &str,
        api_key: &str,
        model_name: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String>> + Send>>> {
        let request = ChatRequest {
            model: model_name.to_string(),
            messages,
            stream: true,
        };

        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API request failed with status {status}: {body}");
        }

        let stream = response.bytes_stream();
        let mapped = futures::stream::unfold(
            (stream, SseParser::default(), VecDeque::new()),
            |(mut stream, mut parser, mut pending)| async move {
                loop {
                    if let Some(delta) = pending.pop_front() {
                        return Some((Ok(delta), (stream, parser, pending)));
                    }
                    if parser.is_done() {
                        return None;
                    }

                    let next = tokio::time::timeout(
                        Duration::from_secs(READ_IDLE_TIMEOUT_SECS),
                        stream.next(),
                    )
                    .await;
                    match next {
                        Ok(Some(Ok(chunk))) => pending.extend(parser.push(&chunk)),
                        Ok(Some(Err(err))) => {
                            return Some((
                                Err(anyhow!("Stream error: {err}")),
                                (stream, parser, pending),
                            ));
                        }
                        Ok(None) => return None,
                        Err(_) => {
                            return Some((
                                Err(anyhow!(
                                    "Stream went silent for {READ_IDLE_TIMEOUT_SECS}s"
                                )),
                                (stream, parser, pending),
                            ));
                        }
                    }
                }
            },
        );

        Ok(Box::pin(mapped))
    }
}

/// Drive a streaming request to completion, accumulating the full response.
/// Returns `Ok(None)` when the cancel flag was raised mid-stream.
pub async fn collect_stream(
    client: &AiClient,
    base_url: &str,
    api_key: &str,
    model_name: &str,
    messages: Vec<ChatMessage>,
    cancel: Arc<AtomicBool>,
) -> Result<Option<String>> {
    let mut stream = client
        .stream_chat(base_url, api_key, model_name, messages)
        .await?;

    let mut accumulated = String::new();
    while let Some(item) = stream.next().await {
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }
        accumulated.push_str(&item?);
    }

    if cancel.load(Ordering::Relaxed) {
        return Ok(None);
    }
    Ok(Some(accumulated))
}
