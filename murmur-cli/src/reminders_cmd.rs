use anyhow::Result;
use clap::Subcommand;
use murmur_core::{Reminder, ReminderOwner, Store, Trigger};
use tracing::info;

use crate::app::{App, short_id};
use crate::state::resolve_prefix;

#[derive(Subcommand, Debug)]
pub enum RemindersCommand {
    /// List pending reminders
    List {
        /// Include reminders that already fired
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Cancel one reminder
    Cancel { id: String },

    /// Fire due reminders until Ctrl-C
    Run {
        /// Sweep once and exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
}

pub async fn run(app: &App, cmd: RemindersCommand) -> Result<()> {
    match cmd {
        RemindersCommand::List { all } => list(app, all),
        RemindersCommand::Cancel { id } => {
            let ids: Vec<String> = app
                .store
                .list_reminders(app.owner())?
                .into_iter()
                .map(|r| r.id)
                .collect();
            let id = resolve_prefix(ids.iter().map(String::as_str), &id)?;
            app.scheduler.cancel(&id)?;
            println!("Cancelled reminder {id}");
            Ok(())
        }
        RemindersCommand::Run { once } => {
            if once {
                let fired = app.scheduler.sweep()?;
                println!("Fired {fired} reminder(s)");
                return Ok(());
            }
            println!(
                "Watching reminders every {}s (Ctrl-C to stop)",
                app.scheduler.sweep_interval().as_secs()
            );
            app.scheduler
                .clone()
                .run(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await;
            info!("reminder loop exited");
            Ok(())
        }
    }
}

fn list(app: &App, all: bool) -> Result<()> {
    let reminders: Vec<Reminder> = app
        .store
        .list_reminders(app.owner())?
        .into_iter()
        .filter(|r| all || r.is_pending())
        .collect();
    if reminders.is_empty() {
        println!("No reminders.");
        return Ok(());
    }
    for r in &reminders {
        let when = match &r.trigger {
            Trigger::Time(at) => app.local(*at),
            Trigger::Location(f) => format!("near {:.4},{:.4} ({}m)", f.lat, f.lon, f.radius_m),
            Trigger::Completion => "on completion".to_string(),
        };
        println!(
            "{} {}  {:<22}  {}",
            if r.triggered { "✓" } else { "·" },
            short_id(&r.id),
            when,
            owner_title(app, &r.owner)?
        );
    }
    Ok(())
}

fn owner_title(app: &App, owner: &ReminderOwner) -> Result<String> {
    let title = match owner {
        ReminderOwner::Task(id) => app.store.get_task(id)?.map(|t| t.title),
        ReminderOwner::Event(id) => app.store.get_event(id)?.map(|e| e.title),
    };
    Ok(title.unwrap_or_else(|| format!("<deleted {owner}>")))
}
