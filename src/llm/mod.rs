//! Completion client: the boundary to the language model
//!
//! Defines the client trait and request types for asking the model for
//! segment lists. Two implementations:
//! - `HttpClient`: OpenAI-compatible chat completions over HTTP (production)
//! - `MockClient`: scripted replies keyed by prompt text (testing)
//!
//! The exploration core treats the model as an opaque text-completion
//! service: a system instruction and a conversation go in, text comes out.

mod http;

pub use http::HttpClient;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A system instruction plus the conversation so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: vec![Message {
                role: Role::User,
                content: user.into(),
            }],
        }
    }

    /// Append the model's previous answer and a follow-up instruction
    pub fn push_exchange(&mut self, answer: impl Into<String>, follow_up: impl Into<String>) {
        self.messages.push(Message {
            role: Role::Assistant,
            content: answer.into(),
        });
        self.messages.push(Message {
            role: Role::User,
            content: follow_up.into(),
        });
    }

    /// The opening user instruction
    pub fn first_user(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Errors from completion client operations.
///
/// All of these are transport failures: they are surfaced immediately and
/// never retried at this level.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("completion service not available: {0}")]
    Unavailable(String),
    #[error("completion service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("completion service sent an unreadable reply: {0}")]
    InvalidResponse(String),
    #[error("completion request failed: {0}")]
    RequestFailed(String),
}

/// Client trait for the text-completion service.
///
/// Abstracts over transport (HTTP, mock) so the orchestrator doesn't
/// depend on how the model is reached.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the conversation and return the model's raw text answer.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

struct Rule {
    needle: String,
    replies: VecDeque<Result<String, LlmError>>,
    gate: Option<Arc<Notify>>,
}

/// Mock client for testing. Returns scripted replies.
///
/// A reply is chosen by the first rule whose needle occurs in the
/// request's opening user message. Replies queued for a rule are handed
/// out in order and the last one repeats. A gated rule holds each call
/// open until the gate is notified.
pub struct MockClient {
    available: bool,
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl MockClient {
    /// Create a mock client that reports as available.
    pub fn available() -> Self {
        Self {
            available: true,
            rules: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock client whose every call fails as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    fn push_reply(self, needle: impl Into<String>, reply: Result<String, LlmError>) -> Self {
        let needle = needle.into();
        {
            let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
            match rules.iter_mut().find(|r| r.needle == needle) {
                Some(rule) => rule.replies.push_back(reply),
                None => rules.push(Rule {
                    needle,
                    replies: VecDeque::from([reply]),
                    gate: None,
                }),
            }
        }
        self
    }

    /// Queue a text reply for prompts containing `needle`.
    pub fn with_reply(self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.push_reply(needle, Ok(text.into()))
    }

    /// Queue a failure for prompts containing `needle`.
    pub fn with_failure(self, needle: impl Into<String>, error: LlmError) -> Self {
        self.push_reply(needle, Err(error))
    }

    /// Hold calls matching `needle` until the returned gate is notified.
    ///
    /// Each `notify_one()` releases one call.
    pub fn gate(&self, needle: &str) -> Arc<Notify> {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let gate = Arc::new(Notify::new());
        match rules.iter_mut().find(|r| r.needle == needle) {
            Some(rule) => rule.gate = Some(gate.clone()),
            None => rules.push(Rule {
                needle: needle.to_string(),
                replies: VecDeque::new(),
                gate: Some(gate.clone()),
            }),
        }
        gate
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_reply(&self, prompt: &str) -> (Result<String, LlmError>, Option<Arc<Notify>>) {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(rule) = rules.iter_mut().find(|r| prompt.contains(&r.needle)) else {
            return (
                Err(LlmError::RequestFailed(format!(
                    "no mock reply for prompt '{}'",
                    prompt.chars().take(80).collect::<String>()
                ))),
                None,
            );
        };

        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        };
        let reply = reply.unwrap_or_else(|| {
            Err(LlmError::RequestFailed(format!(
                "mock rule '{}' has no replies",
                rule.needle
            )))
        });
        (reply, rule.gate.clone())
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if !self.available {
            return Err(LlmError::Unavailable(
                "mock client configured as unavailable".to_string(),
            ));
        }

        let (reply, gate) = self.next_reply(request.first_user());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        reply
    }
}

/// Helper to render a well-formed segment list reply for testing.
pub fn mock_segment_list(entries: &[(&str, &str)]) -> String {
    let list: Vec<serde_json::Value> = entries
        .iter()
        .map(|(title, content)| serde_json::json!({ "title": title, "content": content }))
        .collect();
    serde_json::json!({ "list": list }).to_string()
}
