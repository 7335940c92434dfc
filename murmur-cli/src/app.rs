//! Wiring shared by every command: config, file store, scheduler, optional LLM.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use murmur_core::time::format_local;
use murmur_core::{
    CalendarEvent, Intake, Item, ReminderScheduler, Store, SystemClock, Task, UtteranceParser,
};
use std::sync::Arc;

use crate::config::{Config, load_config};
use crate::llm::LlmClient;
use crate::notify;
use crate::state::{FileStore, store_path};

pub struct App {
    pub cfg: Config,
    pub tz: Tz,
    pub store: Arc<FileStore>,
    pub scheduler: Arc<ReminderScheduler>,
}

impl App {
    pub fn open() -> Result<Self> {
        let cfg = load_config()?;
        let tz = cfg.tz()?;
        let store = Arc::new(FileStore::open(store_path()?));
        let scheduler = Arc::new(
            ReminderScheduler::new(
                store.clone(),
                notify::from_name(&cfg.reminders.notifier),
                Arc::new(SystemClock),
            )
            .with_sweep_interval(cfg.sweep_interval())
            .with_timezone(tz),
        );
        Ok(Self {
            cfg,
            tz,
            store,
            scheduler,
        })
    }

    pub fn owner(&self) -> &str {
        &self.cfg.owner_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.scheduler.now()
    }

    /// LLM client when `--ai` was asked for (or the config enables it).
    pub fn llm(&self, wanted: bool) -> Result<Option<Arc<LlmClient>>> {
        if !wanted && !self.cfg.llm.enabled {
            return Ok(None);
        }
        let mut cfg = self.cfg.clone();
        cfg.llm.enabled = true;
        Ok(LlmClient::from_config(&cfg)?.map(Arc::new))
    }

    pub fn intake(&self) -> Result<Intake> {
        let mut intake = Intake::new(
            UtteranceParser::new(self.tz),
            self.scheduler.clone(),
            self.owner(),
        );
        if let Some(llm) = self.llm(false)? {
            intake = intake.with_extractor(llm);
        }
        Ok(intake)
    }

    pub fn local(&self, dt: DateTime<Utc>) -> String {
        format_local(dt, self.tz)
    }

    pub fn describe_task(&self, t: &Task) -> String {
        let mut line = format!(
            "[{}] {}  {}  ({})",
            if t.completed { "x" } else { " " },
            short_id(&t.id),
            t.title,
            t.priority
        );
        if let Some(due) = t.due {
            line.push_str(&format!("  due {}", self.local(due)));
        }
        line
    }

    pub fn describe_event(&self, e: &CalendarEvent) -> String {
        let mut line = format!(
            "{}  {}  {} - {}",
            short_id(&e.id),
            e.title,
            self.local(e.start),
            e.end.with_timezone(&self.tz).format("%H:%M")
        );
        if let Some(place) = &e.location {
            line.push_str(&format!("  @ {place}"));
        }
        line
    }

    pub fn describe_item(&self, item: &Item) -> String {
        match item {
            Item::Task(t) => format!("task   {}", self.describe_task(t)),
            Item::Event(e) => format!("event  {}", self.describe_event(e)),
        }
    }

    pub fn task_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_tasks(self.owner())?
            .into_iter()
            .map(|t| t.id)
            .collect())
    }
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
