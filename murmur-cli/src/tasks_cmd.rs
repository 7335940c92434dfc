use anyhow::{Result, bail};
use clap::Subcommand;
use murmur_core::Store;

use crate::app::App;
use crate::state::resolve_prefix;

#[derive(Subcommand, Debug)]
pub enum TasksCommand {
    /// List open tasks
    List {
        /// Include completed tasks
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Mark a task done (or open again with --undo)
    Done {
        id: String,
        #[arg(long, default_value_t = false)]
        undo: bool,
    },

    /// Delete a task and its reminders
    Delete { id: String },

    /// Delete every task (or only completed ones)
    Clear {
        #[arg(long, default_value_t = false)]
        completed: bool,
        /// Required when clearing open tasks
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum EventsCommand {
    /// List calendar events
    List,

    /// Delete an event and its reminders
    Delete { id: String },
}

pub fn run_tasks(app: &App, cmd: TasksCommand) -> Result<()> {
    match cmd {
        TasksCommand::List { all } => {
            let tasks = app.store.list_tasks(app.owner())?;
            let shown: Vec<_> = tasks.iter().filter(|t| all || t.is_active()).collect();
            if shown.is_empty() {
                println!("No tasks.");
            }
            for t in shown {
                println!("{}", app.describe_task(t));
            }
        }
        TasksCommand::Done { id, undo } => {
            let id = resolve_prefix(app.task_ids()?.iter().map(String::as_str), &id)?;
            let t = app.scheduler.set_task_completed(&id, !undo)?;
            println!("{}", app.describe_task(&t));
        }
        TasksCommand::Delete { id } => {
            let id = resolve_prefix(app.task_ids()?.iter().map(String::as_str), &id)?;
            app.scheduler.delete_task(&id)?;
            println!("Deleted task {id}");
        }
        TasksCommand::Clear { completed, yes } => {
            if !completed && !yes {
                bail!("this deletes every task; pass --yes to confirm or --completed for done ones only");
            }
            let mut n = 0;
            for t in app.store.list_tasks(app.owner())? {
                if (!completed || t.completed) && app.scheduler.delete_task(&t.id)? {
                    n += 1;
                }
            }
            println!("Deleted {n} task(s)");
        }
    }
    Ok(())
}

pub fn run_events(app: &App, cmd: EventsCommand) -> Result<()> {
    match cmd {
        EventsCommand::List => {
            let events = app.store.list_events(app.owner())?;
            if events.is_empty() {
                println!("No events.");
            }
            for e in &events {
                println!("{}", app.describe_event(e));
            }
        }
        EventsCommand::Delete { id } => {
            let ids: Vec<String> = app
                .store
                .list_events(app.owner())?
                .into_iter()
                .map(|e| e.id)
                .collect();
            let id = resolve_prefix(ids.iter().map(String::as_str), &id)?;
            app.scheduler.delete_event(&id)?;
            println!("Deleted event {id}");
        }
    }
    Ok(())
}
