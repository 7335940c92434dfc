use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use murmur_core::{
    CalendarEvent, FireOutcome, Intake, IntakeError, IntentKind, Item, ManualClock,
    MemoryNotifier, MemoryStore, Priority, Reminder, ReminderOwner, ReminderScheduler, Store,
    StoreError, Task, Transcriber, TranscriptionError, UtteranceParser, prioritize, suggest,
};
use murmur_core::store::MarkOutcome;
use std::sync::Arc;

fn thursday_9am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    notifier: Arc<MemoryNotifier>,
    clock: Arc<ManualClock>,
    intake: Intake,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let clock = Arc::new(ManualClock::new(thursday_9am()));
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        notifier.clone(),
        clock.clone(),
    ));
    let intake = Intake::new(UtteranceParser::new(chrono_tz::UTC), scheduler, "me");
    Harness {
        store,
        notifier,
        clock,
        intake,
    }
}

#[tokio::test(start_paused = true)]
async fn urgent_task_is_saved_with_reminders() {
    let h = harness();
    let report = h
        .intake
        .submit_text("URGENT: submit the proposal by 3pm today")
        .await;

    assert_eq!(report.intent.kind, IntentKind::Task);
    assert_eq!(report.intent.priority, Some(Priority::High));
    let Item::Task(task) = &report.item else {
        panic!("expected a task");
    };
    assert_eq!(task.due, Some(Utc.with_ymd_and_hms(2026, 3, 5, 15, 0, 0).unwrap()));

    // due-24h is already past; only due-1h remains.
    let reminders = report.saved.as_ref().unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(h.store.list_tasks("me").unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn lunch_event_lands_in_the_calendar() {
    let h = harness();
    let report = h
        .intake
        .submit_text("Lunch with Sarah on Friday at noon at the Italian restaurant")
        .await;

    let Item::Event(event) = &report.item else {
        panic!("expected an event");
    };
    assert!(event.title.contains("Lunch with Sarah"));
    assert_eq!(event.start, Utc.with_ymd_and_hms(2026, 3, 6, 12, 0, 0).unwrap());
    assert_eq!(event.end - event.start, Duration::minutes(60));
    assert_eq!(event.location.as_deref(), Some("the Italian restaurant"));

    let stored = h.store.get_event(&event.id).unwrap().unwrap();
    assert_eq!(stored.title, event.title);
    assert_eq!(report.saved.as_ref().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sweep_claims_reminders_before_their_timers() {
    let h = harness();
    let report = h
        .intake
        .submit_text("schedule a meeting with John next Tuesday at 2 PM for two hours")
        .await;
    let Item::Event(event) = &report.item else {
        panic!("expected an event");
    };
    assert_eq!(event.end - event.start, Duration::hours(2));
    assert_eq!(report.saved.as_ref().unwrap().len(), 2);

    // Jump past both triggers; the sweep gets there first and disarms the timers.
    h.clock.set(event.start - Duration::minutes(10));
    let scheduler = h.intake.scheduler().clone();
    let swept = scheduler.sweep().unwrap();
    assert_eq!(swept, 2);
    tokio::time::sleep(std::time::Duration::from_secs(8 * 24 * 3600)).await;

    assert_eq!(h.notifier.len(), 2);
    assert!(h.notifier.sent().iter().all(|n| n.title == "Upcoming: meeting with John"));
    assert_eq!(scheduler.pending_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn timers_fire_first_and_the_sweep_stays_quiet() {
    let h = harness();
    let report = h
        .intake
        .submit_text("schedule a meeting with John next Tuesday at 2 PM for two hours")
        .await;
    let reminders = report.saved.as_ref().unwrap().clone();
    assert_eq!(reminders.len(), 2);
    let scheduler = h.intake.scheduler().clone();
    assert_eq!(scheduler.pending_timers(), 2);

    // Wall clock is past both triggers; let paused tokio time run the timers out.
    let Item::Event(event) = &report.item else {
        panic!("expected an event");
    };
    h.clock.set(event.start - Duration::minutes(10));
    tokio::time::sleep(std::time::Duration::from_secs(8 * 24 * 3600)).await;

    assert_eq!(h.notifier.len(), 2);
    assert_eq!(scheduler.pending_timers(), 0);
    assert!(h.store.pending_reminders().unwrap().is_empty());

    assert_eq!(scheduler.sweep().unwrap(), 0);
    for r in &reminders {
        assert_eq!(scheduler.fire(&r.id).unwrap(), FireOutcome::AlreadyTriggered);
    }
    assert_eq!(h.notifier.len(), 2);
}

#[tokio::test]
async fn deleting_a_task_cancels_its_reminders() {
    let h = harness();
    let report = h.intake.submit_text("fix the door asap").await;
    let id = report.item.id().to_string();
    assert_eq!(report.saved.as_ref().unwrap().len(), 1);

    let scheduler = h.intake.scheduler().clone();
    assert!(scheduler.delete_task(&id).unwrap());
    assert!(h.store.reminders_for(&ReminderOwner::Task(id)).unwrap().is_empty());

    h.clock.advance(Duration::hours(3));
    assert_eq!(scheduler.sweep().unwrap(), 0);
    assert!(h.notifier.is_empty());
}

struct Whisper(Result<String, TranscriptionError>);

#[async_trait]
impl Transcriber for Whisper {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, TranscriptionError> {
        self.0.clone()
    }
}

#[tokio::test]
async fn audio_goes_through_transcription() {
    let h = harness();
    let intake = h
        .intake
        .with_transcriber(Arc::new(Whisper(Ok("remind me to call mom tonight".into()))));
    let report = intake.submit_audio(b"RIFF....").await.unwrap();
    assert_eq!(report.item.title(), "call mom");
    assert_eq!(report.utterance, "remind me to call mom tonight");
}

#[tokio::test]
async fn failed_transcription_creates_nothing() {
    let h = harness();
    let store = h.store.clone();
    let intake = h
        .intake
        .with_transcriber(Arc::new(Whisper(Err(TranscriptionError::Unintelligible))));

    let err = intake.submit_audio(b"noise").await.unwrap_err();
    assert_eq!(err, IntakeError::Transcription(TranscriptionError::Unintelligible));
    let err = intake.submit_audio(&[]).await.unwrap_err();
    assert_eq!(err, IntakeError::Transcription(TranscriptionError::Empty));
    assert!(store.list_tasks("me").unwrap().is_empty());
}

/// Storage that is always down.
struct DownStore;

impl Store for DownStore {
    fn save_task(&self, _: &Task) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn get_task(&self, _: &str) -> Result<Option<Task>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn delete_task(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn list_tasks(&self, _: &str) -> Result<Vec<Task>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn save_event(&self, _: &CalendarEvent) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn get_event(&self, _: &str) -> Result<Option<CalendarEvent>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn delete_event(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn list_events(&self, _: &str) -> Result<Vec<CalendarEvent>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn save_reminder(&self, _: &Reminder) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn get_reminder(&self, _: &str) -> Result<Option<Reminder>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn delete_reminder(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn list_reminders(&self, _: &str) -> Result<Vec<Reminder>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn reminders_for(&self, _: &ReminderOwner) -> Result<Vec<Reminder>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn pending_reminders(&self) -> Result<Vec<Reminder>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
    fn mark_triggered(&self, _: &str) -> Result<MarkOutcome, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
}

#[tokio::test]
async fn parse_result_survives_storage_outage() {
    let scheduler = Arc::new(ReminderScheduler::new(
        Arc::new(DownStore),
        Arc::new(MemoryNotifier::new()),
        Arc::new(ManualClock::new(thursday_9am())),
    ));
    let intake = Intake::new(UtteranceParser::new(chrono_tz::UTC), scheduler, "me");

    let report = intake.submit_text("dentist appointment tomorrow at 3pm").await;
    assert_eq!(report.intent.kind, IntentKind::Event);
    assert_eq!(report.item.title(), "dentist appointment");
    assert!(matches!(report.saved, Err(StoreError::Unavailable(_))));
}

#[test]
fn ranking_and_buckets_agree_on_a_fresh_snapshot() {
    let now = thursday_9am();
    let store = MemoryStore::new();
    let tasks = [
        Task::new("me", "renew passport", now).with_due(now - Duration::days(1)),
        Task::new("me", "book flights", now)
            .with_priority(Priority::High)
            .with_due(now + Duration::hours(20)),
        Task::new("me", "plan garden", now).with_priority(Priority::Low),
    ];
    for t in &tasks {
        store.save_task(t).unwrap();
    }

    let ranked = prioritize(&store.active_tasks("me").unwrap(), now);
    assert_eq!(ranked[0].task.title, "renew passport");
    let s = suggest(&ranked, now);
    let today: Vec<&str> = s.today.iter().map(|p| p.task.title.as_str()).collect();
    assert_eq!(today, vec!["renew passport", "book flights"]);
    assert!(s.tomorrow.is_empty());
    assert!(s.this_week.is_empty());
    assert!(s.advisories.iter().any(|a| a.contains("renew passport")));
}

#[test]
fn sweep_and_manual_fire_agree() {
    let now = thursday_9am();
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        notifier.clone(),
        Arc::new(ManualClock::new(now)),
    ));
    let r = Reminder::new(
        ReminderOwner::Task("t".into()),
        "me",
        murmur_core::Trigger::Time(now - Duration::seconds(1)),
        now,
    );
    store.save_reminder(&r).unwrap();

    assert_eq!(scheduler.sweep().unwrap(), 1);
    assert_eq!(scheduler.fire(&r.id).unwrap(), FireOutcome::AlreadyTriggered);
    assert_eq!(notifier.len(), 1);
}
