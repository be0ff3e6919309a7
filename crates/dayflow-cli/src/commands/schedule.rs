use clap::Subcommand;

use dayflow_core::{clock::parse_hhmm, SchedulingPolicy, TaskId, UserId, WorkingWindow};

use crate::common::{open_engine, parse_date_arg};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Generate the day's timeline
    Generate {
        /// Date, YYYY-MM-DD
        date: String,
        #[arg(long, default_value = "default_user")]
        user: String,
        /// Window start HH:MM (defaults from config)
        #[arg(long)]
        start: Option<String>,
        /// Window end HH:MM (defaults from config)
        #[arg(long)]
        end: Option<String>,
        /// Ordering policy: round_robin, fcfs, sjf, ljf or priority
        #[arg(long, default_value_t = SchedulingPolicy::RoundRobin)]
        policy: SchedulingPolicy,
    },
    /// List the day's placements
    Daily {
        date: String,
        #[arg(long, default_value = "default_user")]
        user: String,
    },
    /// Clear the day's placements
    Reset {
        date: String,
        #[arg(long, default_value = "default_user")]
        user: String,
    },
    /// Insert a rest break after a scheduled task
    Break {
        /// Id of the task the break follows
        after: TaskId,
        /// Break length in minutes
        #[arg(long)]
        minutes: i64,
        #[arg(long, default_value = "default_user")]
        user: String,
    },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    match action {
        ScheduleAction::Generate { date, user, start, end, policy } => {
            let date = parse_date_arg(&date)?;
            let user = UserId::from(user);
            let window = match (start, end) {
                (Some(start), Some(end)) => WorkingWindow::on_date(
                    date,
                    parse_hhmm(&start)?,
                    parse_hhmm(&end)?,
                    engine.config.scheduling_zone,
                )?,
                _ => engine.service.window_for(date)?,
            };
            let outcome = engine.service.generate(&user, date, &window, policy, None)?;
            for task in &outcome.scheduled {
                if let Some((start, end)) = task.scheduled_interval() {
                    println!(
                        "{} - {}  {}",
                        start.format("%H:%M"),
                        end.format("%H:%M"),
                        task.name
                    );
                }
            }
            if !outcome.held_out.is_empty() {
                println!("held out (waiting on dependencies): {}", outcome.held_out.len());
            }
            if !outcome.unplaced.is_empty() {
                println!("did not fit in the window: {}", outcome.unplaced.len());
            }
        }
        ScheduleAction::Daily { date, user } => {
            let tasks = engine
                .service
                .daily(&UserId::from(user), parse_date_arg(&date)?)?;
            for task in tasks {
                if let Some((start, end)) = task.scheduled_interval() {
                    println!(
                        "{} - {}  {}  ({})",
                        start.format("%H:%M"),
                        end.format("%H:%M"),
                        task.name,
                        task.status
                    );
                }
            }
        }
        ScheduleAction::Reset { date, user } => {
            let cleared = engine
                .service
                .reset(&UserId::from(user), parse_date_arg(&date)?, None)?;
            println!("cleared {cleared} task(s)");
        }
        ScheduleAction::Break { after, minutes, user } => {
            let insertion =
                engine.service.insert_break(&UserId::from(user), &after, minutes, None)?;
            if let Some((start, end)) = insertion.break_task.scheduled_interval() {
                println!(
                    "break {} - {}, shifted {} task(s)",
                    start.format("%H:%M"),
                    end.format("%H:%M"),
                    insertion.shifted.len()
                );
            }
            if insertion.window_overflow {
                println!("warning: tasks now run past the end of the working window");
            }
        }
    }
    Ok(())
}
