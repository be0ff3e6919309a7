//! Storage interfaces the engine consumes.
//!
//! Persistence is an external collaborator: the engine only sees these
//! traits. Filters are typed rather than free-form so adapters can push
//! them down to whatever query surface they have. The bundled
//! [`MemoryStore`] backs tests and serves as the reference
//! implementation.

mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StorageError;
use crate::id::{ReportId, TaskId, UserId};
use crate::report::Report;
use crate::task::{Task, TaskStatus};

/// Conjunctive filter over task documents.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Owning user.
    pub user_id: Option<UserId>,
    /// Any of these statuses.
    pub statuses: Option<Vec<TaskStatus>>,
    /// Scheduled interval intersects `[start, end)`.
    pub scheduled_within: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Deadline falls in `[start, end)`.
    pub deadline_within: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Created in `[start, end)`.
    pub created_within: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Only tasks without a scheduled interval.
    pub unscheduled_only: bool,
}

impl TaskFilter {
    pub fn for_user(user_id: &UserId) -> Self {
        Self { user_id: Some(user_id.clone()), ..Self::default() }
    }

    pub fn with_statuses(mut self, statuses: &[TaskStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    pub fn scheduled_within(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.scheduled_within = Some((start, end));
        self
    }

    pub fn deadline_within(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.deadline_within = Some((start, end));
        self
    }

    pub fn created_within(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.created_within = Some((start, end));
        self
    }

    pub fn unscheduled_only(mut self) -> Self {
        self.unscheduled_only = true;
        self
    }

    /// Whether a task satisfies every set clause.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(user_id) = &self.user_id {
            if &task.user_id != user_id {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if let Some((start, end)) = self.scheduled_within {
            match task.scheduled_interval() {
                Some((s, e)) if s < end && e > start => {}
                _ => return false,
            }
        }
        if let Some((start, end)) = self.deadline_within {
            match task.deadline {
                Some(d) if d >= start && d < end => {}
                _ => return false,
            }
        }
        if let Some((start, end)) = self.created_within {
            if task.created_at < start || task.created_at >= end {
                return false;
            }
        }
        if self.unscheduled_only && task.is_scheduled() {
            return false;
        }
        true
    }
}

/// Document store for tasks.
pub trait TaskStore: Send + Sync {
    /// Insert a new task document.
    fn insert_task(&self, task: Task) -> Result<(), StorageError>;

    /// Fetch one task by id.
    fn task(&self, id: &TaskId) -> Result<Option<Task>, StorageError>;

    /// Replace an existing task document.
    fn put_task(&self, task: &Task) -> Result<(), StorageError>;

    /// Delete a task; returns whether it existed.
    fn delete_task(&self, id: &TaskId) -> Result<bool, StorageError>;

    /// All tasks matching the filter, ordered by creation time.
    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError>;
}

/// Document store for reports.
pub trait ReportStore: Send + Sync {
    /// Insert a new report document.
    fn insert_report(&self, report: Report) -> Result<(), StorageError>;

    /// Fetch one report by id.
    fn report(&self, id: &ReportId) -> Result<Option<Report>, StorageError>;

    /// The report for `(user, date)`, if one exists.
    fn report_for_day(&self, user_id: &UserId, date: NaiveDate)
        -> Result<Option<Report>, StorageError>;

    /// All reports for a user, latest first.
    fn reports_for_user(&self, user_id: &UserId) -> Result<Vec<Report>, StorageError>;

    /// Delete a report; returns whether it existed.
    fn delete_report(&self, id: &ReportId) -> Result<bool, StorageError>;
}
