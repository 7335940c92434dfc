//! Task and calendar-event model shared by the parser, scorer and reminders.
//!
//! Storage (JSON file, sqlite, remote) is a separate layer; these types stay small
//! and serializable so a store can hold them as-is.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Events without an explicit length last this long.
pub const DEFAULT_EVENT_MINUTES: i64 = 60;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Lenient parse used for untrusted extractor output.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" | "normal" => Some(Priority::Medium),
            "high" | "urgent" => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub due: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub priority: Priority,
}

impl Task {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            owner_id: owner_id.into(),
            title: title.into(),
            completed: false,
            created_at: now,
            due: None,
            completed_at: None,
            priority: Priority::Medium,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Toggle completion; the completion instant tracks the flag.
    pub fn set_completed(&mut self, done: bool, now: DateTime<Utc>) {
        self.completed = done;
        self.completed_at = if done { Some(now) } else { None };
    }

    pub fn is_active(&self) -> bool {
        !self.completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl CalendarEvent {
    /// `end` defaults to one hour after `start` and is never allowed before it.
    pub fn new(
        owner_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        let end = match end {
            Some(e) if e >= start => e,
            _ => start + Duration::minutes(DEFAULT_EVENT_MINUTES),
        };
        Self {
            id: new_id(),
            owner_id: owner_id.into(),
            title: title.into(),
            start,
            end,
            location: None,
            notes: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A task or a calendar event. The tag is fixed when the value is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Item {
    Task(Task),
    Event(CalendarEvent),
}

impl Item {
    pub fn id(&self) -> &str {
        match self {
            Item::Task(t) => &t.id,
            Item::Event(e) => &e.id,
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            Item::Task(t) => &t.owner_id,
            Item::Event(e) => &e.owner_id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Item::Task(t) => &t.title,
            Item::Event(e) => &e.title,
        }
    }
}
