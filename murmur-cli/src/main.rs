use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use murmur_core::{
    IntentKind, ParsedIntent, PrioritizedTask, Store, TaskScorer, hours_to_deadline,
    prioritize_assisted, suggest,
};
use std::path::PathBuf;
use std::sync::Arc;

mod app;
mod auth;
mod config;
mod llm;
mod notify;
mod reminders_cmd;
mod state;
mod tasks_cmd;
mod transcribe;

use app::{App, short_id};

#[derive(Parser, Debug)]
#[command(
    name = "murmur",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("MURMUR_BUILD_SHA"), ")"),
    about = "Voice-first tasks, events and reminders"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn an utterance into a task or event and schedule its reminders
    Say {
        /// The utterance, e.g. "remind me to call mom tonight"
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Show how it would be parsed without saving
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Transcribe an audio file and handle it like `say`
    Listen { audio: PathBuf },

    /// Task commands
    Tasks {
        #[command(subcommand)]
        command: tasks_cmd::TasksCommand,
    },

    /// Calendar event commands
    Events {
        #[command(subcommand)]
        command: tasks_cmd::EventsCommand,
    },

    /// Rank open tasks by urgency
    Prioritize {
        /// Ask the configured LLM for scores (falls back to rules)
        #[arg(long, default_value_t = false)]
        ai: bool,
    },

    /// Suggest what to do today, tomorrow and this week
    Suggest {
        #[arg(long, default_value_t = false)]
        ai: bool,
    },

    /// Reminder commands
    Reminders {
        #[command(subcommand)]
        command: reminders_cmd::RemindersCommand,
    },

    /// Config file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store API keys in ~/.murmur/auth.json
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default ~/.murmur/config.toml
    Init {
        /// IANA zone, e.g. America/Chicago
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Print the effective config
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    PasteOpenaiApiKey,
    PasteAnthropicToken,
    /// Show which keys are available
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("murmur=info,murmur_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init { timezone } => config::init_config(timezone)?,
            ConfigCommand::Show => config::show_config()?,
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteOpenaiApiKey => auth::openai_paste_api_key()?,
            AuthCommand::PasteAnthropicToken => auth::anthropic_paste_token()?,
            AuthCommand::Status => auth::status()?,
        },

        Command::Say { text, dry_run } => {
            let app = App::open()?;
            say(&app, &text.join(" "), dry_run).await?;
        }

        Command::Listen { audio } => {
            let app = App::open()?;
            listen(&app, &audio).await?;
        }

        Command::Tasks { command } => tasks_cmd::run_tasks(&App::open()?, command)?,

        Command::Events { command } => tasks_cmd::run_events(&App::open()?, command)?,

        Command::Prioritize { ai } => {
            let app = App::open()?;
            let ranked = ranked_tasks(&app, ai).await?;
            if ranked.is_empty() {
                println!("No open tasks.");
            }
            for (i, p) in ranked.iter().enumerate() {
                print_ranked(&app, i + 1, p);
            }
        }

        Command::Suggest { ai } => {
            let app = App::open()?;
            let ranked = ranked_tasks(&app, ai).await?;
            let s = suggest(&ranked, app.now());
            for (label, bucket) in [
                ("Today", &s.today),
                ("Tomorrow", &s.tomorrow),
                ("This week", &s.this_week),
            ] {
                println!("## {label}");
                if bucket.is_empty() {
                    println!("  (nothing)");
                }
                for (i, p) in bucket.iter().enumerate() {
                    print_ranked(&app, i + 1, p);
                }
                println!();
            }
            for a in &s.advisories {
                println!("* {a}");
            }
        }

        Command::Reminders { command } => reminders_cmd::run(&App::open()?, command).await?,
    }

    Ok(())
}

fn print_intent(intent: &ParsedIntent, app: &App) {
    let kind = match intent.kind {
        IntentKind::Task => "task",
        IntentKind::Event => "event",
    };
    println!("type:     {kind}");
    println!("title:    {}", intent.title);
    if let Some(due) = intent.due {
        println!("due:      {}", app.local(due));
    }
    if let (Some(s), Some(e)) = (intent.start, intent.end) {
        println!("when:     {} - {}", app.local(s), app.local(e));
    }
    if let Some(loc) = &intent.location {
        println!("location: {loc}");
    }
    if let Some(p) = intent.priority {
        println!("priority: {p}");
    }
}

async fn say(app: &App, text: &str, dry_run: bool) -> Result<()> {
    let intake = app.intake()?;
    if dry_run {
        let intent = intake.interpret(text).await;
        print_intent(&intent.normalized(app.now()), app);
        return Ok(());
    }
    let report = intake.submit_text(text).await;
    println!("{}", app.describe_item(&report.item));
    match report.saved {
        Ok(reminders) => {
            for r in &reminders {
                if let Some(at) = r.trigger.fire_at() {
                    println!("  reminder {} at {}", short_id(&r.id), app.local(at));
                }
            }
            Ok(())
        }
        Err(e) => Err(e).context("parsed but could not save"),
    }
}

async fn listen(app: &App, audio: &std::path::Path) -> Result<()> {
    let bytes = std::fs::read(audio).with_context(|| format!("read {}", audio.display()))?;
    let file_name = audio
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio.wav");
    let Some(whisper) = transcribe::WhisperTranscriber::from_config(&app.cfg, file_name)? else {
        bail!("transcription needs an OpenAI key; run: murmur auth paste-openai-api-key");
    };
    let intake = app.intake()?.with_transcriber(Arc::new(whisper));
    let report = intake.submit_audio(&bytes).await?;
    println!("heard:    {}", report.utterance);
    println!("{}", app.describe_item(&report.item));
    report.saved.context("parsed but could not save")?;
    Ok(())
}

async fn ranked_tasks(app: &App, ai: bool) -> Result<Vec<PrioritizedTask>> {
    let tasks = app.store.active_tasks(app.owner())?;
    let llm = if ai { app.llm(true)? } else { None };
    if ai && llm.is_none() {
        eprintln!("No LLM key configured; using rule-based scores.");
    }
    let scorer = llm.as_deref().map(|c| c as &dyn TaskScorer);
    Ok(prioritize_assisted(&tasks, app.now(), scorer).await)
}

fn print_ranked(app: &App, rank: usize, p: &PrioritizedTask) {
    let mut line = format!(
        "{rank:>2}. {:>6.1}  {:<8}  {}  ~{}m",
        p.score,
        p.tier.to_string(),
        p.task.title,
        p.estimated_minutes
    );
    if let Some(due) = p.task.due {
        line.push_str(&format!("  due {}", app.local(due)));
    }
    if let Some(h) = hours_to_deadline(&p.task, app.now()) {
        line.push_str(&format!(" ({h:.1}h)"));
    }
    println!("{line}");
    if let Some(why) = &p.reasoning {
        println!("      {why}");
    }
}
