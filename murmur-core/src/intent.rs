//! Parsed intent: the single hand-off between free text and structured records.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::task::{CalendarEvent, DEFAULT_EVENT_MINUTES, Item, Priority, Task};
use crate::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Task,
    Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    #[serde(rename = "type")]
    pub kind: IntentKind,
    pub title: String,
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub priority: Option<Priority>,
}

impl ParsedIntent {
    pub fn task(title: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Task,
            title: title.into(),
            description: None,
            due: None,
            start: None,
            end: None,
            location: None,
            priority: None,
        }
    }

    pub fn event(title: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Event,
            ..Self::task(title)
        }
    }

    /// Events always carry a window: start defaults to now, end to start + 60 min.
    /// Tasks keep `due` as-is and drop event-only fields.
    pub fn normalized(mut self, now: DateTime<Utc>) -> Self {
        match self.kind {
            IntentKind::Event => {
                let default_len = Duration::minutes(DEFAULT_EVENT_MINUTES);
                let start = self
                    .start
                    .or(self.due)
                    .filter(|s| s.checked_add_signed(default_len).is_some())
                    .unwrap_or(now);
                let end = match self.end {
                    Some(e) if e >= start => e,
                    _ => start + default_len,
                };
                self.start = Some(start);
                self.end = Some(end);
                self.due = None;
            }
            IntentKind::Task => {
                self.start = None;
                self.end = None;
            }
        }
        self
    }

    /// Build the record this intent describes.
    pub fn into_item(self, owner_id: &str, now: DateTime<Utc>) -> Item {
        let intent = self.normalized(now);
        match intent.kind {
            IntentKind::Task => {
                let mut task = Task::new(owner_id, intent.title, now)
                    .with_priority(intent.priority.unwrap_or_default());
                task.due = intent.due;
                Item::Task(task)
            }
            IntentKind::Event => {
                let start = intent.start.unwrap_or(now);
                let mut event = CalendarEvent::new(owner_id, intent.title, start, intent.end);
                event.location = intent.location;
                event.notes = intent.description;
                Item::Event(event)
            }
        }
    }
}

/// Extractor output as received. Every field is optional so that shape errors
/// surface as validation failures rather than opaque decode errors.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    #[serde(rename = "type", alias = "kind")]
    kind: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(alias = "due", alias = "due_date")]
    due_date: Option<String>,
    #[serde(alias = "start", alias = "start_time")]
    start_time: Option<String>,
    #[serde(alias = "end", alias = "end_time")]
    end_time: Option<String>,
    location: Option<String>,
    priority: Option<String>,
}

/// Validate untrusted extractor JSON. Unparseable timestamps are dropped, never defaulted.
pub fn validate_extraction(
    raw: &str,
    reference: DateTime<Utc>,
    tz: Tz,
) -> Result<ParsedIntent, ExtractionError> {
    let body = json_object(raw).ok_or_else(|| ExtractionError::Json("no JSON object found".into()))?;
    let parsed: RawExtraction =
        serde_json::from_str(body).map_err(|e| ExtractionError::Json(e.to_string()))?;

    let kind = match parsed.kind.as_deref().map(str::trim) {
        Some("task") => IntentKind::Task,
        Some("event") => IntentKind::Event,
        other => return Err(ExtractionError::InvalidKind(other.unwrap_or_default().to_string())),
    };

    let title = parsed.title.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return Err(ExtractionError::EmptyTitle);
    }

    let instant = |s: Option<String>| {
        s.filter(|v| !v.trim().is_empty())
            .and_then(|v| time::resolve(reference, tz, &v))
    };

    Ok(ParsedIntent {
        kind,
        title: title.to_string(),
        description: non_empty(parsed.description),
        due: instant(parsed.due_date),
        start: instant(parsed.start_time),
        end: instant(parsed.end_time),
        location: non_empty(parsed.location),
        priority: parsed.priority.as_deref().and_then(Priority::parse),
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Models like to wrap JSON in prose or code fences; take the outermost object.
pub(crate) fn json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
