//! Execution tracking: actual times and status transitions.
//!
//! Accepts small patches against a single task and enforces the
//! field-level invariants on each one. Status changes must follow the
//! transition graph in [`crate::task::TaskStatus`]; `break` is never
//! reachable from here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::id::TaskId;
use crate::service::UserLocks;
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus};

/// Patch applied by an execution update. Absent fields stay untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    #[serde(default)]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

/// Applies execution updates under the per-user lock.
pub struct ExecutionTracker {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
}

impl ExecutionTracker {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, locks: UserLocks) -> Self {
        Self { store, clock, locks }
    }

    /// Apply `update` to the task, enforcing per-field invariants and the
    /// status transition graph. Returns the stored task.
    pub fn apply(
        &self,
        id: &TaskId,
        update: ExecutionUpdate,
        op_deadline: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let task = self
            .store
            .task(id)?
            .ok_or_else(|| CoreError::NotFound { kind: "task", id: id.to_string() })?;
        let user_id = task.user_id.clone();
        self.locks.with_user(&user_id, || {
            // Re-read under the lock; the first read only located the owner.
            let mut task = self
                .store
                .task(id)?
                .ok_or_else(|| CoreError::NotFound { kind: "task", id: id.to_string() })?;
            let now = self.clock.now();

            if let Some(start) = update.actual_start_time {
                task.actual_start_time = Some(start);
            }
            if let Some(end) = update.actual_end_time {
                task.actual_end_time = Some(end);
            }

            if let Some(next) = update.status {
                let current = task.status;
                if next != current {
                    if next == TaskStatus::Break || !current.can_transition_to(next) {
                        return Err(CoreError::IllegalTransition { from: current, to: next });
                    }
                    // Stamp observation times on entry, unless the caller
                    // supplied them explicitly.
                    match next {
                        TaskStatus::InProgress => {
                            if task.actual_start_time.is_none() {
                                task.actual_start_time = Some(now);
                            }
                        }
                        TaskStatus::Completed => {
                            if task.actual_end_time.is_none() {
                                task.actual_end_time = Some(now);
                            }
                        }
                        _ => {}
                    }
                    task.status = next;
                }
            }

            if let (Some(start), Some(end)) = (task.actual_start_time, task.actual_end_time) {
                if end < start {
                    return Err(ValidationError::InvalidTimeRange { start, end }.into());
                }
            }

            if let Some(limit) = op_deadline {
                if self.clock.now() > limit {
                    return Err(CoreError::Timeout { operation: "tracker.apply" });
                }
            }

            task.updated_at = now;
            self.store.put_task(&task)?;
            info!(task = %id, status = %task.status, "applied execution update");
            Ok(task)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::id::UserId;
    use crate::store::MemoryStore;
    use crate::task::TaskDraft;
    use chrono::{Duration, TimeZone};

    fn setup() -> (ExecutionTracker, Arc<MemoryStore>, Arc<FixedClock>, Task) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::at(
            Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap(),
        ));
        let task = Task::from_draft(
            TaskDraft {
                user_id: UserId::from("u1"),
                name: "task".to_string(),
                description: None,
                duration: 30,
                priority: 3,
                deadline: None,
                dependencies: Vec::new(),
            },
            clock.now(),
        );
        store.insert_task(task.clone()).unwrap();
        let tracker = ExecutionTracker::new(store.clone(), clock.clone(), UserLocks::new());
        (tracker, store, clock, task)
    }

    fn status(next: TaskStatus) -> ExecutionUpdate {
        ExecutionUpdate { status: Some(next), ..ExecutionUpdate::default() }
    }

    #[test]
    fn start_stamps_actual_start() {
        let (tracker, _, clock, task) = setup();
        let updated = tracker.apply(&task.id, status(TaskStatus::InProgress), None).unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.actual_start_time, Some(clock.now()));
        assert!(updated.actual_end_time.is_none());
    }

    #[test]
    fn complete_stamps_actual_end() {
        let (tracker, _, clock, task) = setup();
        tracker.apply(&task.id, status(TaskStatus::InProgress), None).unwrap();
        clock.advance(Duration::minutes(25));
        let updated = tracker.apply(&task.id, status(TaskStatus::Completed), None).unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert_eq!(updated.actual_duration(), Some(25));
    }

    #[test]
    fn explicit_actuals_win_over_stamping() {
        let (tracker, _, clock, task) = setup();
        let start = clock.now() - Duration::minutes(10);
        let update = ExecutionUpdate {
            actual_start_time: Some(start),
            actual_end_time: None,
            status: Some(TaskStatus::InProgress),
        };
        let updated = tracker.apply(&task.id, update, None).unwrap();
        assert_eq!(updated.actual_start_time, Some(start));
    }

    #[test]
    fn pending_to_completed_is_illegal() {
        let (tracker, _, _, task) = setup();
        let err = tracker.apply(&task.id, status(TaskStatus::Completed), None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IllegalTransition { from: TaskStatus::Pending, to: TaskStatus::Completed }
        ));
    }

    #[test]
    fn break_is_unreachable_from_updates() {
        let (tracker, _, _, task) = setup();
        let err = tracker.apply(&task.id, status(TaskStatus::Break), None).unwrap_err();
        assert!(matches!(err, CoreError::IllegalTransition { .. }));
    }

    #[test]
    fn cancel_from_pending_and_in_progress() {
        let (tracker, store, _, task) = setup();
        tracker.apply(&task.id, status(TaskStatus::Cancelled), None).unwrap();
        let stored = store.task(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);
        // Terminal: further transitions rejected.
        let err = tracker.apply(&task.id, status(TaskStatus::InProgress), None).unwrap_err();
        assert!(matches!(err, CoreError::IllegalTransition { .. }));
    }

    #[test]
    fn actual_end_before_start_is_rejected() {
        let (tracker, _, clock, task) = setup();
        let update = ExecutionUpdate {
            actual_start_time: Some(clock.now()),
            actual_end_time: Some(clock.now() - Duration::minutes(5)),
            status: None,
        };
        let err = tracker.apply(&task.id, update, None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn exceeded_deadline_aborts_without_write() {
        let (tracker, store, clock, task) = setup();
        let limit = clock.now() - Duration::seconds(1);
        let err = tracker.apply(&task.id, status(TaskStatus::InProgress), Some(limit)).unwrap_err();
        assert!(matches!(err, CoreError::Timeout { .. }));
        let stored = store.task(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
    }

    #[test]
    fn identity_status_update_is_a_noop_transition() {
        let (tracker, _, _, task) = setup();
        let updated = tracker.apply(&task.id, status(TaskStatus::Pending), None).unwrap();
        assert_eq!(updated.status, TaskStatus::Pending);
        assert!(updated.actual_start_time.is_none());
    }
}
