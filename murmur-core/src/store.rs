//! Record store contract plus an in-memory implementation.
//!
//! Everything is scoped by owner id where a listing is involved. Callers take a
//! fresh snapshot for every scoring or scheduling pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::reminders::{Reminder, ReminderOwner};
use crate::task::{CalendarEvent, Task};

/// Result of the Pending -> Fired transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyTriggered,
    Missing,
}

pub trait Store: Send + Sync {
    fn save_task(&self, task: &Task) -> Result<(), StoreError>;
    fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError>;
    fn delete_task(&self, id: &str) -> Result<bool, StoreError>;
    fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>, StoreError>;

    fn save_event(&self, event: &CalendarEvent) -> Result<(), StoreError>;
    fn get_event(&self, id: &str) -> Result<Option<CalendarEvent>, StoreError>;
    fn delete_event(&self, id: &str) -> Result<bool, StoreError>;
    fn list_events(&self, owner_id: &str) -> Result<Vec<CalendarEvent>, StoreError>;

    fn save_reminder(&self, reminder: &Reminder) -> Result<(), StoreError>;
    fn get_reminder(&self, id: &str) -> Result<Option<Reminder>, StoreError>;
    fn delete_reminder(&self, id: &str) -> Result<bool, StoreError>;
    fn list_reminders(&self, owner_id: &str) -> Result<Vec<Reminder>, StoreError>;
    fn reminders_for(&self, owner: &ReminderOwner) -> Result<Vec<Reminder>, StoreError>;
    /// Every untriggered reminder, all owners. Used by the sweep.
    fn pending_reminders(&self) -> Result<Vec<Reminder>, StoreError>;
    /// Flip `triggered` exactly once. Must be atomic against concurrent callers.
    fn mark_triggered(&self, id: &str) -> Result<MarkOutcome, StoreError>;

    fn active_tasks(&self, owner_id: &str) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .list_tasks(owner_id)?
            .into_iter()
            .filter(Task::is_active)
            .collect())
    }
}

/// Serializable image of a store's contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
    #[serde(default)]
    pub events: BTreeMap<String, CalendarEvent>,
    #[serde(default)]
    pub reminders: BTreeMap<String, Reminder>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Snapshot>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

fn by_created<T>(mut v: Vec<T>, key: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    v.sort_by_key(|x| key(x));
    v
}

impl Store for MemoryStore {
    fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        self.lock()?.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.lock()?.tasks.get(id).cloned())
    }

    fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.tasks.remove(id).is_some())
    }

    fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>, StoreError> {
        let inner = self.lock()?;
        let v = inner
            .tasks
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(by_created(v, |t| t.created_at))
    }

    fn save_event(&self, event: &CalendarEvent) -> Result<(), StoreError> {
        self.lock()?.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    fn get_event(&self, id: &str) -> Result<Option<CalendarEvent>, StoreError> {
        Ok(self.lock()?.events.get(id).cloned())
    }

    fn delete_event(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.events.remove(id).is_some())
    }

    fn list_events(&self, owner_id: &str) -> Result<Vec<CalendarEvent>, StoreError> {
        let inner = self.lock()?;
        let v = inner
            .events
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(by_created(v, |e| e.start))
    }

    fn save_reminder(&self, reminder: &Reminder) -> Result<(), StoreError> {
        self.lock()?
            .reminders
            .insert(reminder.id.clone(), reminder.clone());
        Ok(())
    }

    fn get_reminder(&self, id: &str) -> Result<Option<Reminder>, StoreError> {
        Ok(self.lock()?.reminders.get(id).cloned())
    }

    fn delete_reminder(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.reminders.remove(id).is_some())
    }

    fn list_reminders(&self, owner_id: &str) -> Result<Vec<Reminder>, StoreError> {
        let inner = self.lock()?;
        let v = inner
            .reminders
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(by_created(v, |r| r.trigger.fire_at().unwrap_or(r.created_at)))
    }

    fn reminders_for(&self, owner: &ReminderOwner) -> Result<Vec<Reminder>, StoreError> {
        Ok(self
            .lock()?
            .reminders
            .values()
            .filter(|r| &r.owner == owner)
            .cloned()
            .collect())
    }

    fn pending_reminders(&self) -> Result<Vec<Reminder>, StoreError> {
        Ok(self
            .lock()?
            .reminders
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect())
    }

    fn mark_triggered(&self, id: &str) -> Result<MarkOutcome, StoreError> {
        let mut inner = self.lock()?;
        Ok(match inner.reminders.get_mut(id) {
            None => MarkOutcome::Missing,
            Some(r) if r.triggered => MarkOutcome::AlreadyTriggered,
            Some(r) => {
                r.triggered = true;
                MarkOutcome::Marked
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminders::Trigger;
    use chrono::{TimeZone, Utc};

    #[test]
    fn mark_triggered_flips_once() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();
        let store = MemoryStore::new();
        let r = Reminder::new(ReminderOwner::Task("t1".into()), "me", Trigger::Time(now), now)
            .with_id("r1");
        store.save_reminder(&r).unwrap();

        assert_eq!(store.mark_triggered("r1").unwrap(), MarkOutcome::Marked);
        assert_eq!(store.mark_triggered("r1").unwrap(), MarkOutcome::AlreadyTriggered);
        assert_eq!(store.mark_triggered("nope").unwrap(), MarkOutcome::Missing);
        assert!(store.pending_reminders().unwrap().is_empty());
    }

    #[test]
    fn listings_are_owner_scoped() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();
        let store = MemoryStore::new();
        store.save_task(&Task::new("me", "mine", now)).unwrap();
        store.save_task(&Task::new("you", "yours", now)).unwrap();
        let mut done = Task::new("me", "done", now);
        done.set_completed(true, now);
        store.save_task(&done).unwrap();

        assert_eq!(store.list_tasks("me").unwrap().len(), 2);
        let active = store.active_tasks("me").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "mine");
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();
        let store = MemoryStore::new();
        store
            .save_event(&CalendarEvent::new("me", "lunch", now, None).with_id("e1"))
            .unwrap();
        let json = serde_json::to_string(&store.snapshot().unwrap()).unwrap();
        let back = MemoryStore::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(back.get_event("e1").unwrap().unwrap().title, "lunch");
    }
}
