//! Contracts for the collaborators around the core: speech-to-text, the
//! optional AI extractor and scorer, and notification delivery.
//!
//! Real adapters live in the CLI crate. Everything an AI collaborator returns is
//! treated as untrusted text and validated by the parser or the scorer.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::error::TranscriptionError;
use crate::task::Task;

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError>;
}

/// Returns JSON shaped like a `ParsedIntent`.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(&self, utterance: &str, reference: DateTime<Utc>) -> Result<String>;
}

/// Returns JSON with one `{id, score, reasoning}` entry per task.
#[async_trait]
pub trait TaskScorer: Send + Sync {
    async fn score(&self, tasks: &[Task], reference: DateTime<Utc>) -> Result<String>;
}

/// Fire-and-forget delivery. Errors are logged by the caller and dropped.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Keeps every notification in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Notification {
                title: title.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}
