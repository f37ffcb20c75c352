//! Completion service boundary.
//!
//! Both the conversational turn handler and background enrichment talk to
//! the model through [`CompletionService`]. [`MockCompletion`] is a scripted
//! implementation for tests and offline runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CompletionError;

/// Prompt in, free text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

// =============================================================================
// Scripted mock
// =============================================================================

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text { text: String, delay: Duration },
    Failure { message: String, delay: Duration },
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text {
            text: text.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(text: impl Into<String>, delay: Duration) -> Self {
        MockReply::Text {
            text: text.into(),
            delay,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        MockReply::Failure {
            message: message.into(),
            delay: Duration::ZERO,
        }
    }

    fn delay(&self) -> Duration {
        match self {
            MockReply::Text { delay, .. } | MockReply::Failure { delay, .. } => *delay,
        }
    }
}

/// Completion service that replays queued replies in call order.
///
/// Once the queue is empty every call gets the fallback reply.
pub struct MockCompletion {
    script: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockCompletion {
    pub fn new(fallback: MockReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answer with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::new(MockReply::text(text))
    }

    pub fn push(&self, reply: MockReply) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let reply = self.next_reply();
        let delay = reply.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            MockReply::Text { text, .. } => Ok(text),
            MockReply::Failure { message, .. } => Err(CompletionError::Unavailable(message)),
        }
    }
}
