//! Reminder records, trigger derivation and trigger evaluators.
//!
//! A reminder is Pending until its trigger condition holds, then Fired for good.
//! Trigger kinds share one evaluator contract so the scheduler never branches on
//! the kind itself.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::{Item, Priority};
use crate::time;

/// Exactly one owning record: a task or an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ReminderOwner {
    Task(String),
    Event(String),
}

impl ReminderOwner {
    pub fn of(item: &Item) -> Self {
        match item {
            Item::Task(t) => ReminderOwner::Task(t.id.clone()),
            Item::Event(e) => ReminderOwner::Event(e.id.clone()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ReminderOwner::Task(id) | ReminderOwner::Event(id) => id,
        }
    }
}

impl fmt::Display for ReminderOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderOwner::Task(id) => write!(f, "task:{id}"),
            ReminderOwner::Event(id) => write!(f, "event:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

impl Geofence {
    pub fn contains(&self, p: GeoPoint) -> bool {
        haversine_m(self.lat, self.lon, p.lat, p.lon) <= self.radius_m
    }
}

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();
    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Time,
    Location,
    Completion,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerKind::Time => "time",
            TriggerKind::Location => "location",
            TriggerKind::Completion => "completion",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Trigger {
    Time(DateTime<Utc>),
    Location(Geofence),
    Completion,
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Time(_) => TriggerKind::Time,
            Trigger::Location(_) => TriggerKind::Location,
            Trigger::Completion => TriggerKind::Completion,
        }
    }

    /// ISO instant for time triggers, geofence JSON for location triggers.
    pub fn value(&self) -> String {
        match self {
            Trigger::Time(at) => time::to_rfc3339_utc(*at),
            Trigger::Location(fence) => serde_json::to_string(fence).unwrap_or_default(),
            Trigger::Completion => String::new(),
        }
    }

    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Time(at) => Some(*at),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub owner: ReminderOwner,
    pub owner_id: String,
    pub trigger: Trigger,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn new(
        owner: ReminderOwner,
        owner_id: impl Into<String>,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: crate::task::new_id(),
            owner,
            owner_id: owner_id.into(),
            trigger,
            triggered: false,
            created_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_pending(&self) -> bool {
        !self.triggered
    }
}

/// A derived trigger instant plus a short human label ("1 hour before").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    pub at: DateTime<Utc>,
    pub label: &'static str,
}

/// Trigger instants for a freshly created task or event, oldest first.
/// Instants at or before `now` are dropped individually.
pub fn generate_triggers(item: &Item, now: DateTime<Utc>) -> Vec<TriggerSpec> {
    let mut specs = Vec::new();
    match item {
        Item::Task(t) if t.completed => {}
        Item::Task(t) => match t.due {
            Some(due) => {
                specs.push(TriggerSpec {
                    at: due - Duration::hours(24),
                    label: "due in 1 day",
                });
                specs.push(TriggerSpec {
                    at: due - Duration::hours(1),
                    label: "due in 1 hour",
                });
            }
            None if t.priority == Priority::High => specs.push(TriggerSpec {
                at: now + Duration::hours(2),
                label: "high priority follow-up",
            }),
            None => {}
        },
        Item::Event(e) => {
            if e.duration() > Duration::minutes(60) {
                specs.push(TriggerSpec {
                    at: e.start - Duration::hours(1),
                    label: "starts in 1 hour",
                });
            }
            specs.push(TriggerSpec {
                at: e.start - Duration::minutes(15),
                label: "starts in 15 minutes",
            });
        }
    }
    specs.retain(|s| s.at > now);
    specs.sort_by_key(|s| s.at);
    specs
}

/// Time reminders for `item`, ready to persist.
pub fn reminders_for(item: &Item, now: DateTime<Utc>) -> Vec<Reminder> {
    let owner = ReminderOwner::of(item);
    generate_triggers(item, now)
        .into_iter()
        .map(|s| Reminder::new(owner.clone(), item.owner_id(), Trigger::Time(s.at), now))
        .collect()
}

/// What an evaluator may look at besides the trigger itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerContext {
    pub now: DateTime<Utc>,
    pub position: Option<GeoPoint>,
    pub owner_completed: bool,
}

impl TriggerContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            position: None,
            owner_completed: false,
        }
    }
}

pub trait TriggerEvaluator: Send + Sync {
    fn kind(&self) -> TriggerKind;
    fn is_due(&self, trigger: &Trigger, ctx: &TriggerContext) -> bool;
}

pub struct TimeEvaluator;

impl TriggerEvaluator for TimeEvaluator {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Time
    }

    fn is_due(&self, trigger: &Trigger, ctx: &TriggerContext) -> bool {
        matches!(trigger, Trigger::Time(at) if *at <= ctx.now)
    }
}

pub struct LocationEvaluator;

impl TriggerEvaluator for LocationEvaluator {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Location
    }

    fn is_due(&self, trigger: &Trigger, ctx: &TriggerContext) -> bool {
        match (trigger, ctx.position) {
            (Trigger::Location(fence), Some(p)) => fence.contains(p),
            _ => false,
        }
    }
}

pub struct CompletionEvaluator;

impl TriggerEvaluator for CompletionEvaluator {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Completion
    }

    fn is_due(&self, trigger: &Trigger, ctx: &TriggerContext) -> bool {
        matches!(trigger, Trigger::Completion) && ctx.owner_completed
    }
}

pub fn default_evaluators() -> Vec<Box<dyn TriggerEvaluator>> {
    vec![
        Box::new(TimeEvaluator),
        Box::new(LocationEvaluator),
        Box::new(CompletionEvaluator),
    ]
}

/// Pending and at least one evaluator for its kind says go.
pub fn is_due(
    evaluators: &[Box<dyn TriggerEvaluator>],
    reminder: &Reminder,
    ctx: &TriggerContext,
) -> bool {
    reminder.is_pending()
        && evaluators
            .iter()
            .filter(|e| e.kind() == reminder.trigger.kind())
            .any(|e| e.is_due(&reminder.trigger, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{CalendarEvent, Task};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap()
    }

    fn event(start: DateTime<Utc>, minutes: i64) -> Item {
        Item::Event(CalendarEvent::new(
            "me",
            "standup",
            start,
            Some(start + Duration::minutes(minutes)),
        ))
    }

    #[test]
    fn long_event_gets_two_triggers() {
        let t = now() + Duration::days(1);
        let at: Vec<_> = generate_triggers(&event(t, 90), now())
            .into_iter()
            .map(|s| s.at)
            .collect();
        assert_eq!(at, vec![t - Duration::hours(1), t - Duration::minutes(15)]);
    }

    #[test]
    fn short_event_gets_one_trigger() {
        let t = now() + Duration::days(1);
        let at: Vec<_> = generate_triggers(&event(t, 30), now())
            .into_iter()
            .map(|s| s.at)
            .collect();
        assert_eq!(at, vec![t - Duration::minutes(15)]);
    }

    #[test]
    fn exactly_one_hour_event_gets_one_trigger() {
        let t = now() + Duration::days(1);
        assert_eq!(generate_triggers(&event(t, 60), now()).len(), 1);
    }

    #[test]
    fn task_due_triggers_skip_the_past() {
        let due = now() + Duration::hours(5);
        let item = Item::Task(Task::new("me", "file taxes", now()).with_due(due));
        let specs = generate_triggers(&item, now());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].at, due - Duration::hours(1));

        let far = Item::Task(Task::new("me", "file taxes", now()).with_due(now() + Duration::days(3)));
        assert_eq!(generate_triggers(&far, now()).len(), 2);
    }

    #[test]
    fn undated_high_priority_task_gets_follow_up() {
        let item = Item::Task(Task::new("me", "fix the leak", now()).with_priority(Priority::High));
        let specs = generate_triggers(&item, now());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].at, now() + Duration::hours(2));

        let medium = Item::Task(Task::new("me", "water plants", now()));
        assert!(generate_triggers(&medium, now()).is_empty());
    }

    #[test]
    fn completed_task_gets_nothing() {
        let mut t = Task::new("me", "done", now()).with_due(now() + Duration::days(2));
        t.set_completed(true, now());
        assert!(generate_triggers(&Item::Task(t), now()).is_empty());
    }

    #[test]
    fn reminder_owner_is_tagged() {
        let item = event(now() + Duration::days(1), 30);
        let r = &reminders_for(&item, now())[0];
        assert_eq!(r.owner, ReminderOwner::Event(item.id().to_string()));
        let v = serde_json::to_value(r).unwrap();
        assert_eq!(v["owner"]["type"], "event");
        assert_eq!(v["trigger"]["kind"], "time");
        assert_eq!(r.trigger.kind(), TriggerKind::Time);
        assert!(r.trigger.value().ends_with('Z'));
    }

    #[test]
    fn evaluators_only_answer_for_their_kind() {
        let evals = default_evaluators();
        let ctx = TriggerContext::at(now());
        let past = Reminder::new(
            ReminderOwner::Task("t".into()),
            "me",
            Trigger::Time(now() - Duration::minutes(1)),
            now(),
        );
        assert!(is_due(&evals, &past, &ctx));

        let mut fired = past.clone();
        fired.triggered = true;
        assert!(!is_due(&evals, &fired, &ctx));

        let future = Reminder::new(
            ReminderOwner::Task("t".into()),
            "me",
            Trigger::Time(now() + Duration::minutes(1)),
            now(),
        );
        assert!(!is_due(&evals, &future, &ctx));
    }

    #[test]
    fn location_trigger_uses_geofence() {
        // Roughly 300 m apart in lower Manhattan.
        let fence = Geofence {
            lat: 40.7128,
            lon: -74.0060,
            radius_m: 500.0,
        };
        let r = Reminder::new(ReminderOwner::Task("t".into()), "me", Trigger::Location(fence), now());
        let evals = default_evaluators();

        let mut ctx = TriggerContext::at(now());
        assert!(!is_due(&evals, &r, &ctx));
        ctx.position = Some(GeoPoint {
            lat: 40.7150,
            lon: -74.0040,
        });
        assert!(is_due(&evals, &r, &ctx));
        ctx.position = Some(GeoPoint {
            lat: 40.7580,
            lon: -73.9855,
        });
        assert!(!is_due(&evals, &r, &ctx));

        let v: serde_json::Value = serde_json::from_str(&r.trigger.value()).unwrap();
        assert_eq!(v["radius_m"], 500.0);
    }

    #[test]
    fn completion_trigger_waits_for_owner() {
        let r = Reminder::new(ReminderOwner::Task("t".into()), "me", Trigger::Completion, now());
        let evals = default_evaluators();
        let mut ctx = TriggerContext::at(now());
        assert!(!is_due(&evals, &r, &ctx));
        ctx.owner_completed = true;
        assert!(is_due(&evals, &r, &ctx));
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Paris to London, about 344 km.
        let d = haversine_m(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 343_500.0).abs() < 2_000.0, "{d}");
    }
}
