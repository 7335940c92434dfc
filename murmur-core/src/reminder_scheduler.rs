//! Reminder scheduler: per-reminder timers plus a periodic sweep over storage.
//!
//! Both paths funnel into [`ReminderScheduler::fire`], which flips the stored
//! `triggered` flag before notifying. Whoever loses that race gets
//! `AlreadyTriggered` and stays quiet, so one reminder yields one notification.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::assist::Notifier;
use crate::error::StoreError;
use crate::reminders::{
    self, GeoPoint, Reminder, ReminderOwner, TriggerContext, TriggerEvaluator, TriggerKind,
};
use crate::store::{MarkOutcome, Store};
use crate::task::{Item, Task};
use crate::time::{self, Clock};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const PLACEHOLDER_TITLE: &str = "Reminder";
const PLACEHOLDER_BODY: &str = "Something you asked to be reminded about is due.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Fired,
    AlreadyTriggered,
    Missing,
    NotDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Timer,
    Sweep,
}

pub struct ReminderScheduler {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    evaluators: Vec<Box<dyn TriggerEvaluator>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    position: Mutex<Option<GeoPoint>>,
    sweep_interval: Duration,
    tz: Tz,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
            evaluators: reminders::default_evaluators(),
            timers: Mutex::new(HashMap::new()),
            position: Mutex::new(None),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            tz: chrono_tz::UTC,
        }
    }

    /// Clamped to 1..=60 seconds.
    pub fn with_sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = every.clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
        self
    }

    /// Zone used for the times shown in notification text.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn with_evaluators(mut self, evaluators: Vec<Box<dyn TriggerEvaluator>>) -> Self {
        self.evaluators = evaluators;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Derive, persist and arm the reminders for a freshly saved record.
    pub fn register(self: &Arc<Self>, item: &Item) -> Result<Vec<Reminder>, StoreError> {
        let created = reminders::reminders_for(item, self.clock.now());
        for r in &created {
            self.add(r)?;
        }
        debug!(owner = %ReminderOwner::of(item), count = created.len(), "reminders registered");
        Ok(created)
    }

    /// Persist one reminder and arm its timer if it has an instant.
    pub fn add(self: &Arc<Self>, reminder: &Reminder) -> Result<(), StoreError> {
        self.store.save_reminder(reminder)?;
        self.arm(reminder);
        Ok(())
    }

    fn arm(self: &Arc<Self>, reminder: &Reminder) {
        let Some(at) = reminder.trigger.fire_at() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            debug!(reminder = %reminder.id, "no async runtime, leaving reminder to the sweep");
            return;
        };
        let delay = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        let weak = Arc::downgrade(self);
        let id = reminder.id.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(scheduler) = weak.upgrade() {
                if let Err(e) = scheduler.fire_from(&id, Origin::Timer) {
                    warn!(reminder = %id, error = %e, "timer fire failed");
                }
            }
        });
        if let Some(old) = self.timers().insert(reminder.id.clone(), handle) {
            old.abort();
        }
    }

    fn disarm(&self, id: &str) {
        if let Some(h) = self.timers().remove(id) {
            h.abort();
        }
    }

    /// Live timer handles.
    pub fn pending_timers(&self) -> usize {
        let mut timers = self.timers();
        timers.retain(|_, h| !h.is_finished());
        timers.len()
    }

    pub fn fire(&self, id: &str) -> Result<FireOutcome, StoreError> {
        self.fire_from(id, Origin::Sweep)
    }

    fn fire_from(&self, id: &str, origin: Origin) -> Result<FireOutcome, StoreError> {
        let Some(reminder) = self.store.get_reminder(id)? else {
            debug!(reminder = %id, ?origin, "reminder gone, nothing to fire");
            self.timers().remove(id);
            return Ok(FireOutcome::Missing);
        };
        if reminder.triggered {
            return Ok(FireOutcome::AlreadyTriggered);
        }
        let ctx = self.context_for(&reminder)?;
        if !reminders::is_due(&self.evaluators, &reminder, &ctx) {
            return Ok(FireOutcome::NotDue);
        }

        match self.store.mark_triggered(id)? {
            MarkOutcome::Marked => {}
            MarkOutcome::AlreadyTriggered => {
                debug!(reminder = %id, ?origin, "lost fire race");
                return Ok(FireOutcome::AlreadyTriggered);
            }
            MarkOutcome::Missing => return Ok(FireOutcome::Missing),
        }

        let (title, body) = self.display_text(&reminder.owner);
        info!(reminder = %id, owner = %reminder.owner, ?origin, "reminder fired");
        if let Err(e) = self.notifier.notify(&title, &body) {
            warn!(reminder = %id, error = %e, "notification dropped");
        }

        // The timer task is finishing on its own; only foreign timers need aborting.
        match origin {
            Origin::Timer => {
                self.timers().remove(id);
            }
            Origin::Sweep => self.disarm(id),
        }
        Ok(FireOutcome::Fired)
    }

    fn context_for(&self, reminder: &Reminder) -> Result<TriggerContext, StoreError> {
        let mut ctx = TriggerContext::at(self.clock.now());
        ctx.position = *self.position.lock().unwrap_or_else(|p| p.into_inner());
        if reminder.trigger.kind() == TriggerKind::Completion {
            if let ReminderOwner::Task(task_id) = &reminder.owner {
                ctx.owner_completed = self
                    .store
                    .get_task(task_id)?
                    .is_some_and(|t| t.completed);
            }
        }
        Ok(ctx)
    }

    fn display_text(&self, owner: &ReminderOwner) -> (String, String) {
        let found = match owner {
            ReminderOwner::Task(id) => self.store.get_task(id).ok().flatten().map(|t| {
                let body = match t.due {
                    Some(due) => format!("Due {}", time::format_local(due, self.tz)),
                    None => format!("{} priority task", t.priority),
                };
                (format!("Reminder: {}", t.title), body)
            }),
            ReminderOwner::Event(id) => self.store.get_event(id).ok().flatten().map(|e| {
                let mut body = format!("Starts {}", time::format_local(e.start, self.tz));
                if let Some(place) = &e.location {
                    body.push_str(&format!(" at {place}"));
                }
                (format!("Upcoming: {}", e.title), body)
            }),
        };
        found.unwrap_or_else(|| (PLACEHOLDER_TITLE.to_string(), PLACEHOLDER_BODY.to_string()))
    }

    /// Fire every due pending reminder and arm any future one missing a timer.
    pub fn sweep(self: &Arc<Self>) -> Result<usize, StoreError> {
        let pending = self.store.pending_reminders()?;
        let now = self.clock.now();
        let mut fired = 0;
        for r in pending {
            match self.fire_from(&r.id, Origin::Sweep)? {
                FireOutcome::Fired => fired += 1,
                FireOutcome::NotDue => {
                    let armed = self.timers().get(&r.id).is_some_and(|h| !h.is_finished());
                    if !armed && r.trigger.fire_at().is_some_and(|at| at > now) {
                        self.arm(&r);
                    }
                }
                FireOutcome::AlreadyTriggered | FireOutcome::Missing => {}
            }
        }
        if fired > 0 {
            debug!(fired, "sweep fired reminders");
        }
        Ok(fired)
    }

    /// Delete a reminder and its timer.
    pub fn cancel(&self, id: &str) -> Result<bool, StoreError> {
        self.disarm(id);
        self.store.delete_reminder(id)
    }

    pub fn cancel_for(&self, owner: &ReminderOwner) -> Result<usize, StoreError> {
        let mut n = 0;
        for r in self.store.reminders_for(owner)? {
            if self.cancel(&r.id)? {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Delete a task along with its reminders.
    pub fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        self.cancel_for(&ReminderOwner::Task(id.to_string()))?;
        self.store.delete_task(id)
    }

    pub fn delete_event(&self, id: &str) -> Result<bool, StoreError> {
        self.cancel_for(&ReminderOwner::Event(id.to_string()))?;
        self.store.delete_event(id)
    }

    /// Toggle completion. Completing fires completion reminders and drops pending
    /// time reminders; reopening derives fresh ones.
    pub fn set_task_completed(
        self: &Arc<Self>,
        id: &str,
        done: bool,
    ) -> Result<Task, StoreError> {
        let mut task = self.store.get_task(id)?.ok_or_else(|| StoreError::NotFound {
            kind: "task",
            id: id.to_string(),
        })?;
        if task.completed == done {
            return Ok(task);
        }
        task.set_completed(done, self.clock.now());
        self.store.save_task(&task)?;

        let owner = ReminderOwner::Task(task.id.clone());
        if done {
            for r in self.store.reminders_for(&owner)? {
                if !r.is_pending() {
                    continue;
                }
                match r.trigger.kind() {
                    TriggerKind::Completion => {
                        self.fire_from(&r.id, Origin::Sweep)?;
                    }
                    TriggerKind::Time => {
                        self.cancel(&r.id)?;
                    }
                    TriggerKind::Location => {}
                }
            }
        } else {
            self.register(&Item::Task(task.clone()))?;
        }
        Ok(task)
    }

    /// New device position; location reminders are checked right away.
    pub fn update_position(self: &Arc<Self>, position: GeoPoint) -> Result<usize, StoreError> {
        *self.position.lock().unwrap_or_else(|p| p.into_inner()) = Some(position);
        self.sweep()
    }

    /// Sweep on a fixed interval until `shutdown` resolves, then drop all timers.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut tick = tokio::time::interval(self.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        info!(every_secs = self.sweep_interval.as_secs(), "reminder loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tick.tick() => {
                    if let Err(e) = self.sweep() {
                        warn!(error = %e, "reminder sweep failed");
                    }
                }
            }
        }
        for (_, h) in self.timers().drain() {
            h.abort();
        }
        info!("reminder loop stopped");
    }
}
