use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use sitelog_core::ids::{LocationId, TaskId};
use sitelog_core::model::{Task, TaskDraft, TaskFields};
use sitelog_engine::{EngineError, TaskService};
use sitelog_reminders::{LogNotifier, ReminderScheduler};
use sitelog_settings::SitelogSettings;
use sitelog_store::Database;
use sitelog_telemetry::TelemetryConfig;

#[derive(Parser)]
#[command(name = "sitelog", about = "Track locations and the tasks waiting at each one")]
struct Cli {
    /// Database file (defaults to the configured path).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Stay running until pending reminders have fired.
    #[arg(long, global = true)]
    wait: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage locations.
    #[command(subcommand)]
    Location(LocationCommand),
    /// Manage tasks.
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Subcommand)]
enum LocationCommand {
    Add {
        name: String,
    },
    List,
    /// Show a location and its tasks.
    Show {
        id: LocationId,
    },
    /// Delete a location together with its tasks.
    Delete {
        id: LocationId,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    Add {
        #[arg(long)]
        location: LocationId,
        #[command(flatten)]
        fields: FieldArgs,
    },
    Update {
        id: TaskId,
        #[command(flatten)]
        fields: FieldArgs,
    },
    Show {
        id: TaskId,
    },
    /// Mark a task finished. Finished tasks are deleted.
    Finish {
        id: TaskId,
    },
}

#[derive(Args)]
struct FieldArgs {
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    urgent: bool,
    /// Reference to an attached image.
    #[arg(long)]
    image: Option<String>,
    /// RFC 3339 time for the urgent reminder instead of the configured delay.
    #[arg(long)]
    remind_at: Option<DateTime<Utc>>,
}

impl FieldArgs {
    fn into_parts(self) -> (TaskFields, Option<DateTime<Utc>>) {
        let fields = TaskFields::new(self.title)
            .description(self.description)
            .urgent(self.urgent)
            .image_uri(self.image);
        (fields, self.remind_at)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = sitelog_settings::load_settings().context("loading settings")?;
    if let Some(db) = cli.db.clone() {
        settings.database.path = db;
    }
    init_logging(&settings);
    tracing::debug!(
        db = %settings.database.path.display(),
        reminders = settings.reminders.enabled,
        delay_secs = settings.reminders.delay_secs,
        "settings loaded"
    );

    let db = Database::open(&settings.database.path)
        .with_context(|| format!("opening {}", settings.database.path.display()))?;
    tracing::info!(
        path = %db.path().display(),
        schema_version = db.schema_version()?,
        "database opened"
    );
    let scheduler = Arc::new(ReminderScheduler::new(Arc::new(LogNotifier)));
    let service = TaskService::new(db, scheduler.clone(), settings.reminders.delay())
        .with_reminders_enabled(settings.reminders.enabled);

    let result = run(&service, cli.command).await;
    if let Err(e) = &result {
        if let Some(engine) = e.downcast_ref::<EngineError>() {
            tracing::warn!(kind = engine.error_kind(), error = %engine, "command failed");
        }
    }

    if cli.wait {
        scheduler.drain().await;
    } else {
        let dropped = scheduler.shutdown().await;
        if dropped > 0 {
            eprintln!("{dropped} pending reminder(s) dropped; pass --wait to keep them");
        }
    }
    result
}

fn init_logging(settings: &SitelogSettings) {
    let config = TelemetryConfig::from_names(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    );
    let _ = sitelog_telemetry::init_telemetry(&config);
}

async fn run(service: &TaskService, command: Command) -> Result<()> {
    match command {
        Command::Location(cmd) => run_location(service, cmd).await,
        Command::Task(cmd) => run_task(service, cmd).await,
    }
}

async fn run_location(service: &TaskService, command: LocationCommand) -> Result<()> {
    match command {
        LocationCommand::Add { name } => {
            let location = service.add_location(&name).await?;
            println!("{}\t{}", location.id, location.name);
        }
        LocationCommand::List => {
            let locations = service.list_locations().await?;
            if locations.is_empty() {
                println!("No locations added yet");
            }
            for location in locations {
                println!("{}\t{}", location.id, location.name);
            }
        }
        LocationCommand::Show { id } => {
            let name = service
                .location_name(id)
                .await?
                .unwrap_or_else(|| "Tasks".to_string());
            println!("{name}");
            let tasks = service.list_tasks(id).await?;
            if tasks.is_empty() {
                println!("No tasks found.");
            }
            for task in &tasks {
                print_task_line(task);
            }
        }
        LocationCommand::Delete { id } => {
            if !service.delete_location(id).await? {
                bail!("location {id} not found");
            }
            println!("deleted location {id}");
        }
    }
    Ok(())
}

async fn run_task(service: &TaskService, command: TaskCommand) -> Result<()> {
    let draft = match command {
        TaskCommand::Add { location, fields } => {
            let (fields, remind_at) = fields.into_parts();
            with_remind_at(TaskDraft::new(location, fields), remind_at)
        }
        TaskCommand::Update { id, fields } => {
            let existing = service.get_task(id).await?;
            let (fields, remind_at) = fields.into_parts();
            with_remind_at(TaskDraft::existing(id, existing.location_id, fields), remind_at)
        }
        TaskCommand::Show { id } => {
            let task = service.get_task(id).await?;
            print_task_line(&task);
            if !task.description.is_empty() {
                println!("  {}", task.description);
            }
            if let Some(uri) = &task.image_uri {
                println!("  image: {uri}");
            }
            return Ok(());
        }
        TaskCommand::Finish { id } => {
            if service.finish_task(id).await? {
                println!("finished task {id}");
            } else {
                println!("task {id} was already finished");
            }
            return Ok(());
        }
    };

    let outcome = service.save_task(draft).await?;
    print_task_line(&outcome.task);
    if let Some(reminder) = outcome.reminder {
        println!("reminder {reminder} scheduled");
    }
    Ok(())
}

fn with_remind_at(draft: TaskDraft, remind_at: Option<DateTime<Utc>>) -> TaskDraft {
    match remind_at {
        Some(at) => draft.remind_at(at),
        None => draft,
    }
}

fn print_task_line(task: &Task) {
    let flag = if task.is_urgent { " [urgent]" } else { "" };
    println!("{}\t{}{}", task.id, task.title, flag);
}
