use anyhow::{Context, Result};
use murmur_core::store::{MarkOutcome, MemoryStore, Snapshot, Store};
use murmur_core::{CalendarEvent, Reminder, ReminderOwner, StoreError, Task};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub fn murmur_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("MURMUR_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".murmur"))
}

pub fn ensure_murmur_home() -> Result<PathBuf> {
    let dir = murmur_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn store_path() -> Result<PathBuf> {
    Ok(ensure_murmur_home()?.join("store.json"))
}

/// JSON file store. Every call reloads the file, so a long-running reminder
/// loop and one-shot commands see each other's writes.
pub struct FileStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<MemoryStore, StoreError> {
        if !self.path.exists() {
            return Ok(MemoryStore::new());
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| StoreError::Unavailable(format!("read {}: {e}", self.path.display())))?;
        if raw.trim().is_empty() {
            return Ok(MemoryStore::new());
        }
        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(MemoryStore::from_snapshot(snapshot))
    }

    fn save(&self, mem: &MemoryStore) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&mem.snapshot()?)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| StoreError::Unavailable(format!("write {}: {e}", self.path.display())))
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryStore) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _guard = self.io.lock().unwrap_or_else(|p| p.into_inner());
        f(&self.load()?)
    }

    fn write<T>(&self, f: impl FnOnce(&MemoryStore) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _guard = self.io.lock().unwrap_or_else(|p| p.into_inner());
        let mem = self.load()?;
        let out = f(&mem)?;
        self.save(&mem)?;
        Ok(out)
    }
}

impl Store for FileStore {
    fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        self.write(|m| m.save_task(task))
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        self.read(|m| m.get_task(id))
    }

    fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        self.write(|m| m.delete_task(id))
    }

    fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>, StoreError> {
        self.read(|m| m.list_tasks(owner_id))
    }

    fn save_event(&self, event: &CalendarEvent) -> Result<(), StoreError> {
        self.write(|m| m.save_event(event))
    }

    fn get_event(&self, id: &str) -> Result<Option<CalendarEvent>, StoreError> {
        self.read(|m| m.get_event(id))
    }

    fn delete_event(&self, id: &str) -> Result<bool, StoreError> {
        self.write(|m| m.delete_event(id))
    }

    fn list_events(&self, owner_id: &str) -> Result<Vec<CalendarEvent>, StoreError> {
        self.read(|m| m.list_events(owner_id))
    }

    fn save_reminder(&self, reminder: &Reminder) -> Result<(), StoreError> {
        self.write(|m| m.save_reminder(reminder))
    }

    fn get_reminder(&self, id: &str) -> Result<Option<Reminder>, StoreError> {
        self.read(|m| m.get_reminder(id))
    }

    fn delete_reminder(&self, id: &str) -> Result<bool, StoreError> {
        self.write(|m| m.delete_reminder(id))
    }

    fn list_reminders(&self, owner_id: &str) -> Result<Vec<Reminder>, StoreError> {
        self.read(|m| m.list_reminders(owner_id))
    }

    fn reminders_for(&self, owner: &ReminderOwner) -> Result<Vec<Reminder>, StoreError> {
        self.read(|m| m.reminders_for(owner))
    }

    fn pending_reminders(&self) -> Result<Vec<Reminder>, StoreError> {
        self.read(|m| m.pending_reminders())
    }

    fn mark_triggered(&self, id: &str) -> Result<MarkOutcome, StoreError> {
        self.write(|m| m.mark_triggered(id))
    }
}

/// Resolve a full id from a unique prefix, the way people type them.
pub fn resolve_prefix<'a>(ids: impl IntoIterator<Item = &'a str>, prefix: &str) -> Result<String> {
    let hits: Vec<&str> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();
    match hits.as_slice() {
        [one] => Ok(one.to_string()),
        [] => anyhow::bail!("no record matches id {prefix}"),
        _ => anyhow::bail!("id prefix {prefix} is ambiguous ({} matches)", hits.len()),
    }
}
