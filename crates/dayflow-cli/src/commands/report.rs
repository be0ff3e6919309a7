use clap::Subcommand;

use dayflow_core::{Report, ReportId, UserId};

use crate::common::{open_engine, parse_date_arg};

#[derive(Subcommand)]
pub enum ReportAction {
    /// Generate (or fetch) the day's report
    Generate {
        /// Date, YYYY-MM-DD
        date: String,
        #[arg(long, default_value = "default_user")]
        user: String,
        /// Print the full JSON document
        #[arg(long)]
        json: bool,
    },
    /// Generate the day's report from the deterministic template only
    Simple {
        date: String,
        #[arg(long, default_value = "default_user")]
        user: String,
        #[arg(long)]
        json: bool,
    },
    /// List stored reports, latest first
    List {
        #[arg(long, default_value = "default_user")]
        user: String,
    },
    /// Show one report as JSON
    Show { id: ReportId },
}

fn print_report(report: &Report, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("report {} for {}", report.id, report.date);
    let m = &report.metrics;
    println!("  completion rate:    {:>5.1}%", m.completion_rate);
    println!("  on-time rate:       {:>5.1}%", m.on_time_rate);
    println!("  average delay:      {:>5.1} min", m.avg_delay);
    println!("  scheduled / actual: {} / {} min", m.total_scheduled_time, m.total_actual_time);
    println!("  time efficiency:    {:>5.2}", m.time_efficiency);
    println!("  productivity score: {:>5.1}/100", m.productivity_score);
    if let Some(summary) = &report.ai_summary {
        println!("  {summary}");
    }
    Ok(())
}

pub fn run(action: ReportAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    match action {
        ReportAction::Generate { date, user, json } => {
            let report = engine
                .reports
                .generate_daily(&UserId::from(user), parse_date_arg(&date)?, None)?;
            print_report(&report, json)?;
        }
        ReportAction::Simple { date, user, json } => {
            let report = engine
                .reports
                .generate_simple(&UserId::from(user), parse_date_arg(&date)?, None)?;
            print_report(&report, json)?;
        }
        ReportAction::List { user } => {
            for report in engine.reports.list(&UserId::from(user))? {
                println!(
                    "{}  {}  score {:.1}",
                    report.id, report.date, report.metrics.productivity_score
                );
            }
        }
        ReportAction::Show { id } => {
            let report = engine.reports.fetch(&id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
