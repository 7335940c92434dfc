//! Intake: utterance (or audio) in, saved record with armed reminders out.

use std::sync::Arc;
use tracing::{info, warn};

use crate::assist::{IntentExtractor, Transcriber};
use crate::error::{IntakeError, StoreError, TranscriptionError};
use crate::intent::ParsedIntent;
use crate::parser::UtteranceParser;
use crate::reminder_scheduler::ReminderScheduler;
use crate::reminders::Reminder;
use crate::task::Item;

/// What one submission produced. `intent` and `item` are always complete,
/// even when `saved` carries a storage error.
#[derive(Debug)]
pub struct IntakeReport {
    pub utterance: String,
    pub intent: ParsedIntent,
    pub item: Item,
    pub saved: Result<Vec<Reminder>, StoreError>,
}

impl IntakeReport {
    pub fn is_saved(&self) -> bool {
        self.saved.is_ok()
    }
}

pub struct Intake {
    parser: UtteranceParser,
    scheduler: Arc<ReminderScheduler>,
    owner_id: String,
    extractor: Option<Arc<dyn IntentExtractor>>,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl Intake {
    pub fn new(
        parser: UtteranceParser,
        scheduler: Arc<ReminderScheduler>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            parser,
            scheduler,
            owner_id: owner_id.into(),
            extractor: None,
            transcriber: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn IntentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    /// Parse only. Nothing is stored.
    pub async fn interpret(&self, text: &str) -> ParsedIntent {
        self.parser
            .parse(text, self.scheduler.now(), self.extractor.as_deref())
            .await
    }

    /// Parse, build, persist, register reminders.
    pub async fn submit_text(&self, text: &str) -> IntakeReport {
        let now = self.scheduler.now();
        let intent = self.interpret(text).await;
        let item = intent.clone().into_item(&self.owner_id, now);

        let saved = self.persist(&item);
        match &saved {
            Ok(reminders) => info!(
                id = item.id(),
                title = item.title(),
                reminders = reminders.len(),
                "saved"
            ),
            Err(e) => warn!(id = item.id(), error = %e, "parsed but not saved"),
        }

        IntakeReport {
            utterance: text.to_string(),
            intent,
            item,
            saved,
        }
    }

    fn persist(&self, item: &Item) -> Result<Vec<Reminder>, StoreError> {
        let store = self.scheduler.store();
        match item {
            Item::Task(t) => store.save_task(t)?,
            Item::Event(e) => store.save_event(e)?,
        }
        self.scheduler.register(item)
    }

    /// Transcribe then submit. A failed transcription creates nothing.
    pub async fn submit_audio(&self, audio: &[u8]) -> Result<IntakeReport, IntakeError> {
        if audio.is_empty() {
            return Err(TranscriptionError::Empty.into());
        }
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| TranscriptionError::Service("no transcriber configured".into()))?;
        let text = transcriber.transcribe(audio).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::Unintelligible.into());
        }
        Ok(self.submit_text(text).await)
    }
}
