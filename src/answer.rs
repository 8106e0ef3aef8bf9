//! Question answering over a loaded index.
//!
//! [`answer`] retrieves the best-matching chunks and hands them to an
//! [`AnswerGenerator`], which produces an [`AnswerStream`] of text tokens.
//!
//! Two generators exist:
//!
//! - [`OpenAiGenerator`] posts the question and the retrieved context to an
//!   OpenAI-compatible `/chat/completions` endpoint with `stream: true` and
//!   forwards each `choices[0].delta.content` from the SSE body.
//! - [`ExtractiveGenerator`] needs no model: it streams the retrieved
//!   passages themselves, each prefixed with its document name.
//!
//! The stream is backed by a bounded channel. Dropping it closes the
//! channel, which stops the producing task and releases the HTTP response.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use drivechat_core::index::{hits_by_document, Index, SearchHit};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// Environment variable holding the chat-completion API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Emitted when retrieval finds nothing.
pub const NO_MATCH_ANSWER: &str = "No relevant passages were found in the indexed folder.";

const STREAM_BUFFER: usize = 64;

const SYSTEM_PROMPT: &str = "You answer questions about the user's Google Drive documents. \
Use only the context passages provided. If the context does not contain the answer, say so.";

/// Finite stream of answer tokens. Consumed once.
pub struct AnswerStream {
    rx: mpsc::Receiver<String>,
}

impl AnswerStream {
    /// Stream fed by the returned sender; ends when the sender is dropped.
    pub fn channel(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Stream of already-known tokens.
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let (tx, stream) = Self::channel(tokens.len());
        for token in tokens {
            // capacity matches the token count
            let _ = tx.try_send(token);
        }
        stream
    }

    /// Drain the stream into one string.
    pub async fn collect_text(self) -> String {
        self.collect::<Vec<_>>().await.concat()
    }
}

impl Stream for AnswerStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce an answer to `question` from the retrieved `hits`.
    async fn generate(&self, question: &str, hits: Vec<SearchHit>) -> Result<AnswerStream>;
}

/// Retrieve the `top_k` best chunks for `question` and generate an answer.
pub async fn answer(
    index: &Index,
    question: &str,
    top_k: usize,
    generator: &dyn AnswerGenerator,
) -> Result<AnswerStream> {
    let hits = index.search(question, top_k);
    debug!(hits = hits.len(), "retrieved context");
    generator.generate(question, hits).await
}

/// Build the configured generator.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(ExtractiveGenerator)),
        "openai" => {
            let api_key = std::env::var(API_KEY_ENV)
                .map_err(|_| Error::Answer(format!("{} is not set", API_KEY_ENV)))?;
            Ok(Arc::new(OpenAiGenerator::new(config, api_key)?))
        }
        other => Err(Error::Answer(format!("unknown LLM provider: {}", other))),
    }
}

/// Streams retrieved passages verbatim.
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    async fn generate(&self, _question: &str, hits: Vec<SearchHit>) -> Result<AnswerStream> {
        if hits.is_empty() {
            return Ok(AnswerStream::from_tokens(vec![NO_MATCH_ANSWER.to_string()]));
        }

        // best-scoring document first
        let mut groups: Vec<_> = hits_by_document(&hits).into_iter().collect();
        groups.sort_by(|a, b| b.1[0].score.total_cmp(&a.1[0].score));

        let mut tokens = Vec::new();
        for (_, doc_hits) in groups {
            tokens.push(format!("[{}]\n", doc_hits[0].document_name));
            for hit in doc_hits {
                tokens.push(format!("{}\n", hit.text.trim()));
            }
        }
        Ok(AnswerStream::from_tokens(tokens))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// System instructions plus the retrieved context and the question.
pub fn build_prompt(question: &str, hits: &[SearchHit]) -> Vec<ChatMessage> {
    let mut context = String::new();
    for hit in hits {
        context.push_str(&format!("--- {} ---\n{}\n\n", hit.document_name, hit.text.trim()));
    }
    if context.is_empty() {
        context.push_str("(no matching passages)\n");
    }

    vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user",
            content: format!("Context:\n{}Question: {}", context, question),
        },
    ]
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// One parsed line of a server-sent-events body.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Token(String),
    Done,
    Skip,
}

/// Parse one SSE line from a streaming chat completion.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<ChatChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|s| !s.is_empty())
            .map(SseLine::Token)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            debug!(error = %e, "ignoring unparseable SSE data");
            SseLine::Skip
        }
    }
}

/// Reassembles newline-terminated lines from arbitrarily split network
/// reads. Bytes are decoded only once a line is complete, so a multi-byte
/// character cut across two reads survives intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append `bytes` and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// The unterminated tail left when the body ends, if any.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

/// OpenAI-compatible streaming chat completion.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Answer(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(&self, question: &str, hits: Vec<SearchHit>) -> Result<AnswerStream> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_prompt(question, &hits),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };
        debug!(model = %self.model, context = hits.len(), "starting streamed completion");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Answer(format!("request timed out after {} seconds", self.timeout.as_secs()))
                } else {
                    Error::Answer(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Answer(format!(
                "completion API returned {}: {}",
                status.as_u16(),
                text.chars().take(500).collect::<String>()
            )));
        }

        let (tx, stream) = AnswerStream::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "completion stream interrupted");
                        return;
                    }
                };
                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseLine::Token(token) => {
                            if tx.send(token).await.is_err() {
                                // receiver dropped
                                return;
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Skip => {}
                    }
                }
            }
            if let Some(SseLine::Token(token)) = lines.finish().map(|l| parse_sse_line(&l)) {
                let _ = tx.send(token).await;
            }
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivechat_core::models::{ContentKind, Document, DocumentCollection, DocumentOrigin};

    fn index() -> Index {
        let docs: DocumentCollection = [("a.txt", "hello"), ("b.txt", "the quarterly budget is 900")]
            .iter()
            .enumerate()
            .map(|(i, (name, text))| {
                Document::new(
                    *text,
                    DocumentOrigin {
                        file_id: format!("f{}", i),
                        name: name.to_string(),
                        kind: ContentKind::PlainText,
                    },
                )
            })
            .collect();
        Index::build(&docs, 700)
    }

    #[tokio::test]
    async fn extractive_answer_quotes_named_file() {
        let text = answer(&index(), "What does a.txt say?", 4, &ExtractiveGenerator)
            .await
            .unwrap()
            .collect_text()
            .await;
        assert!(text.contains("hello"));
        assert!(text.starts_with("[a.txt]"));
    }

    #[tokio::test]
    async fn no_match_yields_single_token() {
        let tokens: Vec<String> = answer(&index(), "zebra", 4, &ExtractiveGenerator)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(tokens, vec![NO_MATCH_ANSWER.to_string()]);
    }

    #[tokio::test]
    async fn empty_index_answers_without_error() {
        let empty = Index::build(&DocumentCollection::new(), 700);
        let text = answer(&empty, "anything", 4, &ExtractiveGenerator)
            .await
            .unwrap()
            .collect_text()
            .await;
        assert_eq!(text, NO_MATCH_ANSWER);
    }

    #[tokio::test]
    async fn channel_stream_ends_when_sender_drops() {
        let (tx, stream) = AnswerStream::channel(4);
        tokio::spawn(async move {
            for t in ["a", "b", "c"] {
                tx.send(t.to_string()).await.unwrap();
            }
        });
        assert_eq!(stream.collect_text().await, "abc");
    }

    #[test]
    fn sse_lines_parse() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            SseLine::Token("Hi".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(parse_sse_line("data: {broken"), SseLine::Skip);
    }

    #[test]
    fn line_buffer_joins_characters_split_across_reads() {
        let body = "data: caf\u{e9}\n".as_bytes();
        let cut = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut lines = LineBuffer::default();
        assert!(lines.push(&body[..cut]).is_empty());
        assert_eq!(lines.push(&body[cut..]), vec!["data: caf\u{e9}\n".to_string()]);
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_unterminated_tail() {
        let mut lines = LineBuffer::default();
        assert_eq!(lines.push(b"one\ntwo\nthr"), vec!["one\n", "two\n"]);
        assert_eq!(lines.finish(), Some("thr".to_string()));
    }

    #[tokio::test]
    async fn openai_stream_survives_split_multibyte_reads() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n\ndata: [DONE]\n\n"
            .as_bytes()
            .to_vec();
        let cut = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let parts = vec![body[..cut].to_vec(), body[cut..].to_vec()];

        let app = axum::Router::new().route(
            "/chat/completions",
            axum::routing::post(move || {
                let parts = parts.clone();
                async move {
                    let chunks = futures_util::stream::iter(parts).then(|part| async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, std::io::Error>(part)
                    });
                    axum::body::Body::from_stream(chunks)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = LlmConfig {
            provider: "openai".to_string(),
            api_base: format!("http://{}", addr),
            ..LlmConfig::default()
        };
        let generator = OpenAiGenerator::new(&config, "key".to_string()).unwrap();
        let text = generator
            .generate("q", Vec::new())
            .await
            .unwrap()
            .collect_text()
            .await;
        assert_eq!(text, "caf\u{e9}");
    }

    #[tokio::test]
    async fn same_named_files_get_separate_citations() {
        let docs: DocumentCollection = [("n1", "notes.txt", "planning notes"), ("n2", "notes.txt", "offsite planning")]
            .iter()
            .map(|(id, name, text)| {
                Document::new(
                    *text,
                    DocumentOrigin {
                        file_id: id.to_string(),
                        name: name.to_string(),
                        kind: ContentKind::PlainText,
                    },
                )
            })
            .collect();
        let index = Index::build(&docs, 700);
        let text = answer(&index, "planning", 4, &ExtractiveGenerator)
            .await
            .unwrap()
            .collect_text()
            .await;
        assert_eq!(text.matches("[notes.txt]").count(), 2);
        assert!(text.contains("planning notes"));
        assert!(text.contains("offsite planning"));
    }

    #[test]
    fn prompt_carries_context_and_question() {
        let hits = index().search("budget", 4);
        let messages = build_prompt("how big is the budget?", &hits);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.contains("--- b.txt ---"));
        assert!(messages[1].content.ends_with("Question: how big is the budget?"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "mystery".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(create_generator(&config), Err(Error::Answer(_))));
        assert!(create_generator(&LlmConfig::default()).is_ok());
    }
}
