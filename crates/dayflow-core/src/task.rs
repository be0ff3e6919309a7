//! Task model and field-level invariants.
//!
//! Statuses follow a strict transition graph:
//!
//!   PENDING ────> IN_PROGRESS ────> COMPLETED
//!      |               |
//!      +──> CANCELLED <+
//!
//! `BREAK` is reserved for rest blocks created by the schedule service; it
//! is never reachable through an execution update.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::clock::day_bounds;
use crate::error::ValidationError;
use crate::id::{TaskId, UserId};

/// Lowest accepted priority.
pub const MIN_PRIORITY: i32 = 1;
/// Highest accepted priority.
pub const MAX_PRIORITY: i32 = 5;

/// Tolerance between a scheduled interval and the declared duration.
const INTERVAL_TOLERANCE_MIN: i64 = 1;

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet started (initial state).
    Pending,
    /// Execution has begun.
    InProgress,
    /// Finished (terminal).
    Completed,
    /// Abandoned (terminal).
    Cancelled,
    /// Rest block owned by the schedule service (terminal).
    Break,
}

impl TaskStatus {
    /// Whether a transition to `to` is allowed for execution updates.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => matches!(to, TaskStatus::InProgress | TaskStatus::Cancelled),
            TaskStatus::InProgress => matches!(to, TaskStatus::Completed | TaskStatus::Cancelled),
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Break => false,
        }
    }

    /// Valid next statuses from this one.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Pending => &[TaskStatus::InProgress, TaskStatus::Cancelled],
            TaskStatus::InProgress => &[TaskStatus::Completed, TaskStatus::Cancelled],
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Break => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Break => "break",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            "break" => Ok(TaskStatus::Break),
            other => Err(format!(
                "unknown status '{other}', expected one of: pending, in_progress, completed, cancelled, break"
            )),
        }
    }
}

/// A task document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, assigned at creation.
    pub id: TaskId,
    /// Owning user.
    pub user_id: UserId,
    /// Non-empty display name.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Required duration in minutes (≥ 1).
    pub duration: i64,
    /// Priority from 1 (lowest) to 5 (highest).
    pub priority: i32,
    /// Current status.
    pub status: TaskStatus,
    /// Optional absolute deadline.
    pub deadline: Option<DateTime<Utc>>,
    /// Ids of same-user tasks that must complete first.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Planned interval start; present iff the end is present.
    pub scheduled_start_time: Option<DateTime<Utc>>,
    /// Planned interval end.
    pub scheduled_end_time: Option<DateTime<Utc>>,
    /// Observed execution start.
    pub actual_start_time: Option<DateTime<Utc>>,
    /// Observed execution end.
    pub actual_end_time: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub duration: i64,
    pub priority: i32,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

/// Partial update for task fields the user may edit. Absent fields are
/// left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub dependencies: Option<Vec<TaskId>>,
}

impl Task {
    /// Build a pending task from a validated draft.
    pub fn from_draft(draft: TaskDraft, now: DateTime<Utc>) -> Self {
        let mut dependencies = draft.dependencies;
        dependencies.sort();
        dependencies.dedup();
        Task {
            id: TaskId::new(),
            user_id: draft.user_id,
            name: draft.name,
            description: draft.description,
            duration: draft.duration,
            priority: draft.priority,
            status: TaskStatus::Pending,
            deadline: draft.deadline,
            dependencies,
            scheduled_start_time: None,
            scheduled_end_time: None,
            actual_start_time: None,
            actual_end_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Planned interval, when scheduled.
    pub fn scheduled_interval(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.scheduled_start_time, self.scheduled_end_time) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_interval().is_some()
    }

    pub fn is_break(&self) -> bool {
        self.status == TaskStatus::Break
    }

    /// Assign the planned interval `[start, start + duration)`.
    pub fn set_schedule(&mut self, start: DateTime<Utc>) {
        self.scheduled_start_time = Some(start);
        self.scheduled_end_time = Some(start + Duration::minutes(self.duration));
    }

    /// Drop the planned interval.
    pub fn clear_schedule(&mut self) {
        self.scheduled_start_time = None;
        self.scheduled_end_time = None;
    }

    /// Whether the planned interval intersects the given day in `zone`.
    pub fn scheduled_on(&self, date: NaiveDate, zone: Tz) -> bool {
        let (day_start, day_end) = day_bounds(date, zone);
        self.scheduled_interval()
            .map(|(start, end)| start < day_end && end > day_start)
            .unwrap_or(false)
    }

    /// Observed duration in minutes, when both actuals are present.
    pub fn actual_duration(&self) -> Option<i64> {
        match (self.actual_start_time, self.actual_end_time) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }

    /// Check document-level invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_duration(self.duration)?;
        validate_priority(self.priority)?;
        if self.dependencies.contains(&self.id) {
            return Err(ValidationError::SelfDependency);
        }
        match (self.scheduled_start_time, self.scheduled_end_time) {
            (None, None) => {}
            (Some(start), Some(end)) => {
                if end < start {
                    return Err(ValidationError::InvalidTimeRange { start, end });
                }
                let length = (end - start).num_minutes();
                if (length - self.duration).abs() > INTERVAL_TOLERANCE_MIN {
                    return Err(ValidationError::InvalidValue {
                        field: "scheduled_end_time",
                        message: format!(
                            "interval is {length} min but duration is {} min",
                            self.duration
                        ),
                    });
                }
            }
            _ => {
                return Err(ValidationError::InvalidValue {
                    field: "scheduled_start_time",
                    message: "scheduled start and end must be set together".to_string(),
                });
            }
        }
        if let (Some(start), Some(end)) = (self.actual_start_time, self.actual_end_time) {
            if end < start {
                return Err(ValidationError::InvalidTimeRange { start, end });
            }
        }
        if self.is_break() && !self.dependencies.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "dependencies",
                message: "break tasks do not participate in dependencies".to_string(),
            });
        }
        Ok(())
    }
}

impl TaskDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_duration(self.duration)?;
        validate_priority(self.priority)
    }
}

impl TaskPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(duration) = self.duration {
            validate_duration(duration)?;
        }
        if let Some(priority) = self.priority {
            validate_priority(priority)?;
        }
        Ok(())
    }

    /// Apply the patch to editable fields. Dependency checks beyond
    /// self-reference are the manager's job.
    pub fn apply_to(&self, task: &mut Task) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(duration) = self.duration {
            task.duration = duration;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(dependencies) = &self.dependencies {
            if dependencies.contains(&task.id) {
                return Err(ValidationError::SelfDependency);
            }
            let mut deps = dependencies.clone();
            deps.sort();
            deps.dedup();
            task.dependencies = deps;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "name",
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn validate_duration(duration: i64) -> Result<(), ValidationError> {
    if duration < 1 {
        return Err(ValidationError::InvalidValue {
            field: "duration",
            message: format!("must be at least 1 minute, got {duration}"),
        });
    }
    Ok(())
}

fn validate_priority(priority: i32) -> Result<(), ValidationError> {
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(ValidationError::InvalidValue {
            field: "priority",
            message: format!("must be in {MIN_PRIORITY}..={MAX_PRIORITY}, got {priority}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_task(name: &str) -> Task {
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 8, 0, 0).unwrap();
        Task::from_draft(
            TaskDraft {
                user_id: UserId::from("u1"),
                name: name.to_string(),
                description: None,
                duration: 60,
                priority: 3,
                deadline: None,
                dependencies: Vec::new(),
            },
            now,
        )
    }

    #[test]
    fn status_transition_graph() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Cancelled));
        assert!(!TaskStatus::InProgress.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Break.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Completed.is_terminal());
    }

    #[test]
    fn draft_produces_pending_unscheduled_task() {
        let task = make_task("write notes");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.scheduled_interval().is_none());
        assert!(task.validate().is_ok());
    }

    #[test]
    fn set_schedule_matches_duration() {
        let mut task = make_task("write notes");
        let start = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        task.set_schedule(start);
        let (s, e) = task.scheduled_interval().unwrap();
        assert_eq!(s, start);
        assert_eq!((e - s).num_minutes(), 60);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn interval_must_match_duration_within_tolerance() {
        let mut task = make_task("write notes");
        let start = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        task.scheduled_start_time = Some(start);
        task.scheduled_end_time = Some(start + Duration::minutes(90));
        assert!(task.validate().is_err());
        task.scheduled_end_time = Some(start + Duration::minutes(61));
        assert!(task.validate().is_ok());
    }

    #[test]
    fn half_set_interval_is_rejected() {
        let mut task = make_task("write notes");
        task.scheduled_start_time = Some(Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap());
        assert!(task.validate().is_err());
    }

    #[test]
    fn actual_end_before_start_is_rejected() {
        let mut task = make_task("write notes");
        let start = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        task.actual_start_time = Some(start);
        task.actual_end_time = Some(start - Duration::minutes(5));
        assert!(task.validate().is_err());
    }

    #[test]
    fn scheduled_on_respects_zone() {
        let mut task = make_task("write notes");
        // 23:30 UTC on Mar 14 is already Mar 15 in Tokyo.
        task.set_schedule(Utc.with_ymd_and_hms(2024, 3, 14, 23, 30, 0).unwrap());
        let march_14 = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let march_15 = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert!(task.scheduled_on(march_14, chrono_tz::UTC));
        assert!(!task.scheduled_on(march_15, chrono_tz::UTC));
        assert!(task.scheduled_on(march_15, chrono_tz::Asia::Tokyo));
    }

    #[test]
    fn draft_validation_bounds() {
        let mut draft = TaskDraft {
            user_id: UserId::from("u1"),
            name: "x".to_string(),
            description: None,
            duration: 0,
            priority: 3,
            deadline: None,
            dependencies: Vec::new(),
        };
        assert!(draft.validate().is_err());
        draft.duration = 30;
        draft.priority = 6;
        assert!(draft.validate().is_err());
        draft.priority = 5;
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn patch_replaces_dependencies_deduped() {
        let mut task = make_task("write notes");
        let dep = TaskId::new();
        let patch = TaskPatch {
            dependencies: Some(vec![dep, dep]),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task).unwrap();
        assert_eq!(task.dependencies, vec![dep]);
    }

    #[test]
    fn patch_rejects_self_dependency() {
        let mut task = make_task("write notes");
        let patch = TaskPatch {
            dependencies: Some(vec![task.id]),
            ..TaskPatch::default()
        };
        assert!(patch.apply_to(&mut task).is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        let status: TaskStatus = serde_json::from_str("\"break\"").unwrap();
        assert_eq!(status, TaskStatus::Break);
    }
}
