use clap::Subcommand;

use chrono::{DateTime, Utc};
use dayflow_core::{
    ExecutionUpdate, TaskDraft, TaskFilter, TaskId, TaskPatch, TaskStatus, UserId,
};

use crate::common::open_engine;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task
    Add {
        /// Task name
        name: String,
        /// Duration in minutes
        #[arg(long)]
        duration: i64,
        /// Priority 1 (lowest) to 5 (highest)
        #[arg(long, default_value_t = 3)]
        priority: i32,
        /// Owning user
        #[arg(long, default_value = "default_user")]
        user: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
        /// Deadline as RFC 3339 (e.g. 2024-03-14T17:00:00Z)
        #[arg(long)]
        deadline: Option<DateTime<Utc>>,
        /// Ids of tasks this one depends on
        #[arg(long = "depends-on")]
        depends_on: Vec<TaskId>,
    },
    /// List tasks
    List {
        #[arg(long, default_value = "default_user")]
        user: String,
        /// Only tasks with this status
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Print full JSON documents
        #[arg(long)]
        json: bool,
    },
    /// Show one task as JSON
    Show { id: TaskId },
    /// Update task fields
    Update {
        id: TaskId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        duration: Option<i64>,
        #[arg(long)]
        priority: Option<i32>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a task
    Remove { id: TaskId },
    /// Change status, recording actual times
    Status {
        id: TaskId,
        /// New status: in_progress, completed or cancelled
        status: TaskStatus,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    match action {
        TaskAction::Add { name, duration, priority, user, description, deadline, depends_on } => {
            let task = engine.manager.create(TaskDraft {
                user_id: UserId::from(user),
                name,
                description,
                duration,
                priority,
                deadline,
                dependencies: depends_on,
            })?;
            println!("created task {}", task.id);
        }
        TaskAction::List { user, status, json } => {
            let mut filter = TaskFilter::for_user(&UserId::from(user));
            if let Some(status) = status {
                filter = filter.with_statuses(&[status]);
            }
            let tasks = engine.manager.list(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in tasks {
                    let schedule = match task.scheduled_interval() {
                        Some((start, end)) => format!(
                            " [{} - {}]",
                            start.format("%Y-%m-%d %H:%M"),
                            end.format("%H:%M")
                        ),
                        None => String::new(),
                    };
                    println!(
                        "{}  {}  p{} {}m  {}{}",
                        task.id, task.status, task.priority, task.duration, task.name, schedule
                    );
                }
            }
        }
        TaskAction::Show { id } => {
            let task = engine.manager.fetch(&id)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Update { id, name, duration, priority, description } => {
            let patch = TaskPatch {
                name,
                description,
                duration,
                priority,
                ..TaskPatch::default()
            };
            engine.manager.update(&id, patch)?;
            println!("task updated");
        }
        TaskAction::Remove { id } => {
            engine.manager.delete(&id)?;
            println!("task removed");
        }
        TaskAction::Status { id, status } => {
            let update = ExecutionUpdate { status: Some(status), ..ExecutionUpdate::default() };
            let task = engine.tracker.apply(&id, update, None)?;
            println!("task {} is now {}", task.id, task.status);
        }
    }
    Ok(())
}
