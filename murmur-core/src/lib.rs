//! murmur-core: turns spoken or typed utterances into tasks and events, ranks
//! tasks for attention and fires reminders.

pub mod assist;
pub mod error;
pub mod intake;
pub mod intent;
pub mod parser;
pub mod planner;
pub mod priority;
pub mod reminder_scheduler;
pub mod reminders;
pub mod store;
pub mod task;
pub mod time;

pub use assist::{
    IntentExtractor, MemoryNotifier, Notification, Notifier, TaskScorer, Transcriber,
};
pub use error::{ExtractionError, IntakeError, ScoringError, StoreError, TranscriptionError};
pub use intake::{Intake, IntakeReport};
pub use intent::{IntentKind, ParsedIntent, validate_extraction};
pub use parser::{UtteranceParser, classify, fallback_intent, infer_priority};
pub use planner::{Suggestions, suggest};
pub use priority::{
    PrioritizedTask, Score, UrgencyTier, hours_to_deadline, prioritize, prioritize_assisted, score,
    urgency_tier,
};
pub use reminder_scheduler::{FireOutcome, ReminderScheduler};
pub use reminders::{
    GeoPoint, Geofence, Reminder, ReminderOwner, Trigger, TriggerContext, TriggerEvaluator,
    TriggerKind, TriggerSpec, generate_triggers,
};
pub use store::{MarkOutcome, MemoryStore, Snapshot, Store};
pub use task::{CalendarEvent, Item, Priority, Task};
pub use time::{Clock, ManualClock, SystemClock};
