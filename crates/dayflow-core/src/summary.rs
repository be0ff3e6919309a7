//! Natural-language summary of a day's metrics.
//!
//! The provider is a capability interface so deployments can plug in a
//! remote text generator; the deterministic template below is always
//! available and is the fallback whenever a provider fails. Report
//! generation never blocks on a provider error.

use thiserror::Error;

use crate::report::{ProductivityMetrics, TaskSummary};
use crate::task::TaskStatus;

/// Errors a summary provider may surface. All of them degrade to the
/// template; none abort the report.
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("summary provider unavailable: {0}")]
    Unavailable(String),

    #[error("summary provider timed out")]
    Timeout,
}

/// Produces a short paragraph from a day's metrics and task rows. Must be
/// a pure function of its inputs when determinism matters (tests run on
/// the template).
pub trait SummaryProvider: Send + Sync {
    fn summarize(
        &self,
        metrics: &ProductivityMetrics,
        tasks: &[TaskSummary],
    ) -> Result<String, SummaryError>;
}

/// The mandatory deterministic provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSummary;

impl SummaryProvider for TemplateSummary {
    fn summarize(
        &self,
        metrics: &ProductivityMetrics,
        tasks: &[TaskSummary],
    ) -> Result<String, SummaryError> {
        Ok(render_template(metrics, tasks))
    }
}

/// Deterministic summary text: completion counts, an encouragement tier
/// keyed on the productivity score, and the average delay when tasks ran
/// late.
pub fn render_template(metrics: &ProductivityMetrics, tasks: &[TaskSummary]) -> String {
    let counted: Vec<&TaskSummary> =
        tasks.iter().filter(|t| t.status != TaskStatus::Break).collect();
    let completed = counted
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let total = counted.len();
    let percentage = if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let mut summary = format!(
        "You completed {completed} out of {total} tasks ({percentage:.1}%). "
    );

    if metrics.productivity_score > 80.0 {
        summary.push_str("Great job! Your productivity was excellent today.");
    } else if metrics.productivity_score > 60.0 {
        summary.push_str("Good work today. You maintained decent productivity.");
    } else {
        summary.push_str(
            "There's room for improvement in your task completion and time management.",
        );
    }

    if metrics.avg_delay > 0.0 {
        summary.push_str(&format!(
            " On average, you started tasks {:.1} minutes late.",
            metrics.avg_delay
        ));
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TaskId;
    use chrono::{TimeZone, Utc};

    fn make_summary(status: TaskStatus) -> TaskSummary {
        let start = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        TaskSummary {
            task_id: TaskId::new(),
            name: "task".to_string(),
            scheduled_duration: 30,
            actual_duration: None,
            scheduled_start_time: start,
            scheduled_end_time: start + chrono::Duration::minutes(30),
            actual_start_time: None,
            actual_end_time: None,
            status,
            priority: 3,
            delay: None,
        }
    }

    fn metrics_with(score: f64, avg_delay: f64) -> ProductivityMetrics {
        ProductivityMetrics {
            completion_rate: 0.0,
            on_time_rate: 0.0,
            avg_delay,
            productivity_score: score,
            total_scheduled_time: 0,
            total_actual_time: 0,
            time_efficiency: 0.0,
        }
    }

    #[test]
    fn template_counts_and_percentages() {
        let tasks = vec![
            make_summary(TaskStatus::Completed),
            make_summary(TaskStatus::Pending),
        ];
        let text = render_template(&metrics_with(90.0, 0.0), &tasks);
        assert!(text.starts_with("You completed 1 out of 2 tasks (50.0%)."));
        assert!(text.contains("Great job!"));
    }

    #[test]
    fn template_tiers_on_score() {
        let tasks = vec![make_summary(TaskStatus::Completed)];
        assert!(render_template(&metrics_with(81.0, 0.0), &tasks).contains("excellent"));
        assert!(render_template(&metrics_with(70.0, 0.0), &tasks).contains("decent"));
        assert!(render_template(&metrics_with(40.0, 0.0), &tasks).contains("room for improvement"));
    }

    #[test]
    fn template_mentions_average_delay_only_when_late() {
        let tasks = vec![make_summary(TaskStatus::Completed)];
        let late = render_template(&metrics_with(90.0, 12.5), &tasks);
        assert!(late.contains("12.5 minutes late"));
        let on_time = render_template(&metrics_with(90.0, 0.0), &tasks);
        assert!(!on_time.contains("minutes late"));
    }

    #[test]
    fn breaks_are_not_counted() {
        let tasks = vec![
            make_summary(TaskStatus::Completed),
            make_summary(TaskStatus::Break),
        ];
        let text = render_template(&metrics_with(90.0, 0.0), &tasks);
        assert!(text.starts_with("You completed 1 out of 1 tasks (100.0%)."));
    }

    #[test]
    fn template_is_deterministic() {
        let tasks = vec![make_summary(TaskStatus::Completed)];
        let metrics = metrics_with(70.0, 3.0);
        let a = TemplateSummary.summarize(&metrics, &tasks).unwrap();
        let b = TemplateSummary.summarize(&metrics, &tasks).unwrap();
        assert_eq!(a, b);
    }
}
