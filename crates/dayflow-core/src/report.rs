//! Daily productivity reports.
//!
//! A report is derived from the planned and observed intervals of one
//! user's tasks on one calendar day, then frozen: regenerating the same
//! `(user, date)` returns the stored record unchanged.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{day_bounds, local_instant, Clock};
use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::id::{ReportId, TaskId, UserId};
use crate::store::{ReportStore, TaskFilter, TaskStore};
use crate::summary::{render_template, SummaryProvider};
use crate::task::{Task, TaskStatus};

/// Per-task row of a report, immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub name: String,
    /// Planned duration in minutes.
    pub scheduled_duration: i64,
    /// Observed duration in minutes, when both actuals were recorded.
    pub actual_duration: Option<i64>,
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: i32,
    /// Minutes between planned and observed start; positive means late.
    pub delay: Option<i64>,
}

/// Derived numbers for one day. See [`ProductivityMetrics::from_summaries`]
/// for the exact formulas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductivityMetrics {
    /// Percentage of counted tasks completed.
    pub completion_rate: f64,
    /// Percentage of counted tasks completed without a late start.
    pub on_time_rate: f64,
    /// Mean start delay in minutes over completed tasks that have one.
    pub avg_delay: f64,
    /// Composite score in `[0, 100]`.
    pub productivity_score: f64,
    /// Total planned minutes.
    pub total_scheduled_time: i64,
    /// Total observed minutes.
    pub total_actual_time: i64,
    /// Planned over observed time; 0 when nothing was measured.
    pub time_efficiency: f64,
}

/// A stored daily report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub user_id: UserId,
    /// Calendar day in the scheduling zone.
    pub date: NaiveDate,
    pub tasks: Vec<TaskSummary>,
    pub metrics: ProductivityMetrics,
    pub ai_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskSummary {
    /// Derive a row from a task document. Tasks pulled into a report
    /// without a schedule (deadline or creation date brought them in) get
    /// a nominal 09:00 placement for display; the task document itself is
    /// untouched.
    pub fn from_task(task: &Task, date: NaiveDate, config: &CoreConfig) -> Self {
        let (scheduled_start, scheduled_end) = task.scheduled_interval().unwrap_or_else(|| {
            let start = local_instant(
                date,
                config.day_start_time().unwrap_or_default(),
                config.scheduling_zone,
            );
            (start, start + Duration::minutes(task.duration))
        });
        let actual_duration = task.actual_duration();
        let delay = task
            .actual_start_time
            .map(|actual| (actual - scheduled_start).num_minutes());
        TaskSummary {
            task_id: task.id,
            name: task.name.clone(),
            scheduled_duration: task.duration,
            actual_duration,
            scheduled_start_time: scheduled_start,
            scheduled_end_time: scheduled_end,
            actual_start_time: task.actual_start_time,
            actual_end_time: task.actual_end_time,
            status: task.status,
            priority: task.priority,
            delay,
        }
    }
}

impl ProductivityMetrics {
    /// Compute the day's numbers over the non-break rows:
    ///
    /// - `completion_rate` = 100 · completed / counted
    /// - `on_time_rate`    = 100 · completed-without-late-start / counted
    /// - `avg_delay`       = mean delay over completed rows that have one
    /// - `time_efficiency` = total scheduled / total actual (0 if none)
    /// - `productivity_score` = clamp(0, 100,
    ///       0.5·completion + 0.3·on_time + 0.2·100·min(efficiency, 2)/2)
    pub fn from_summaries(tasks: &[TaskSummary]) -> Self {
        let counted: Vec<&TaskSummary> =
            tasks.iter().filter(|t| t.status != TaskStatus::Break).collect();
        if counted.is_empty() {
            return Self::empty();
        }

        let total = counted.len() as f64;
        let completed: Vec<&&TaskSummary> = counted
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .collect();
        let completion_rate = completed.len() as f64 / total * 100.0;

        let on_time = completed
            .iter()
            .filter(|t| t.delay.map_or(true, |d| d <= 0))
            .count();
        let on_time_rate = on_time as f64 / total * 100.0;

        let delays: Vec<i64> = completed.iter().filter_map(|t| t.delay).collect();
        let avg_delay = if delays.is_empty() {
            0.0
        } else {
            delays.iter().sum::<i64>() as f64 / delays.len() as f64
        };

        let total_scheduled_time: i64 = counted.iter().map(|t| t.scheduled_duration).sum();
        let total_actual_time: i64 = counted.iter().filter_map(|t| t.actual_duration).sum();
        let time_efficiency = if total_actual_time > 0 {
            total_scheduled_time as f64 / total_actual_time as f64
        } else {
            0.0
        };

        let productivity_score = (completion_rate * 0.5
            + on_time_rate * 0.3
            + time_efficiency.min(2.0) / 2.0 * 100.0 * 0.2)
            .clamp(0.0, 100.0);

        ProductivityMetrics {
            completion_rate: round1(completion_rate),
            on_time_rate: round1(on_time_rate),
            avg_delay: round1(avg_delay),
            productivity_score: round1(productivity_score),
            total_scheduled_time,
            total_actual_time,
            time_efficiency: round2(time_efficiency),
        }
    }

    fn empty() -> Self {
        ProductivityMetrics {
            completion_rate: 0.0,
            on_time_rate: 0.0,
            avg_delay: 0.0,
            productivity_score: 0.0,
            total_scheduled_time: 0,
            total_actual_time: 0,
            time_efficiency: 0.0,
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Builds and stores daily reports.
pub struct ReportGenerator {
    tasks: Arc<dyn TaskStore>,
    reports: Arc<dyn ReportStore>,
    provider: Arc<dyn SummaryProvider>,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
}

impl ReportGenerator {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        reports: Arc<dyn ReportStore>,
        provider: Arc<dyn SummaryProvider>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
    ) -> Self {
        Self { tasks, reports, provider, clock, config }
    }

    /// Generate the report for `(user, date)`, consulting the summary
    /// provider. Returns the stored report unchanged when one exists.
    pub fn generate_daily(
        &self,
        user_id: &UserId,
        date: NaiveDate,
        op_deadline: Option<DateTime<Utc>>,
    ) -> Result<Report> {
        self.generate(user_id, date, op_deadline, true)
    }

    /// Generate the report for `(user, date)` from the deterministic
    /// template alone. The stored record has the same shape as the full
    /// path's.
    pub fn generate_simple(
        &self,
        user_id: &UserId,
        date: NaiveDate,
        op_deadline: Option<DateTime<Utc>>,
    ) -> Result<Report> {
        self.generate(user_id, date, op_deadline, false)
    }

    fn generate(
        &self,
        user_id: &UserId,
        date: NaiveDate,
        op_deadline: Option<DateTime<Utc>>,
        use_provider: bool,
    ) -> Result<Report> {
        if let Some(existing) = self.reports.report_for_day(user_id, date)? {
            return Ok(existing);
        }

        let candidates = self.day_candidates(user_id, date)?;
        let mut summaries: Vec<TaskSummary> = candidates
            .iter()
            // Breaks appear as rows only when they actually sat on the
            // timeline; they never join the metrics population.
            .filter(|t| !t.is_break() || t.is_scheduled())
            .map(|t| TaskSummary::from_task(t, date, &self.config))
            .collect();
        if summaries.is_empty() {
            return Err(CoreError::NoTasksForDate { date });
        }
        summaries.sort_by(|a, b| {
            a.scheduled_start_time
                .cmp(&b.scheduled_start_time)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });

        let metrics = ProductivityMetrics::from_summaries(&summaries);
        let ai_summary = if use_provider {
            match self.provider.summarize(&metrics, &summaries) {
                Ok(text) => text,
                Err(e) => {
                    warn!(user = %user_id, %date, error = %e, "summary provider failed, using template");
                    render_template(&metrics, &summaries)
                }
            }
        } else {
            render_template(&metrics, &summaries)
        };

        let now = self.clock.now();
        if let Some(limit) = op_deadline {
            if now > limit {
                return Err(CoreError::Timeout { operation: "report.generate" });
            }
        }

        let report = Report {
            id: ReportId::new(),
            user_id: user_id.clone(),
            date,
            tasks: summaries,
            metrics,
            ai_summary: Some(ai_summary),
            created_at: now,
        };
        self.reports.insert_report(report.clone())?;
        info!(user = %user_id, %date, report = %report.id, "stored daily report");
        Ok(report)
    }

    /// Tasks belonging to the day: scheduled on it, due on it, or created
    /// on it.
    fn day_candidates(&self, user_id: &UserId, date: NaiveDate) -> Result<Vec<Task>> {
        let (day_start, day_end) = day_bounds(date, self.config.scheduling_zone);
        let queries = [
            TaskFilter::for_user(user_id).scheduled_within(day_start, day_end),
            TaskFilter::for_user(user_id).deadline_within(day_start, day_end),
            TaskFilter::for_user(user_id).created_within(day_start, day_end),
        ];
        let mut seen = std::collections::HashSet::new();
        let mut candidates = Vec::new();
        for filter in &queries {
            for task in self.tasks.find_tasks(filter)? {
                if seen.insert(task.id) {
                    candidates.push(task);
                }
            }
        }
        Ok(candidates)
    }

    /// Fetch one report by id.
    pub fn fetch(&self, id: &ReportId) -> Result<Report> {
        self.reports
            .report(id)?
            .ok_or_else(|| CoreError::NotFound { kind: "report", id: id.to_string() })
    }

    /// All reports for a user, latest first.
    pub fn list(&self, user_id: &UserId) -> Result<Vec<Report>> {
        Ok(self.reports.reports_for_user(user_id)?)
    }
}
