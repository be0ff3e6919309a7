//! Schedule orchestration: generate, reset, daily query and break
//! insertion.
//!
//! Mutating operations serialize per user through [`UserLocks`] and write
//! nothing until the whole outcome is computed in memory. Multi-document
//! persistence runs in ascending start order; shifts only ever move
//! intervals later, so every prefix of the write sequence leaves the
//! stored documents consistent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{day_bounds, local_date, local_instant, Clock};
use crate::config::CoreConfig;
use crate::dependency::DependencyGraph;
use crate::error::{CoreError, Result};
use crate::id::{TaskId, UserId};
use crate::packer::{pack, WorkingWindow};
use crate::policy::SchedulingPolicy;
use crate::store::{TaskFilter, TaskStore};
use crate::task::{Task, TaskStatus};

/// Keyed per-user mutex map with lazy construction and reference-counted
/// eviction. Cloning shares the map.
#[derive(Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<UserId, LockEntry>>>,
}

struct LockEntry {
    cell: Arc<Mutex<()>>,
    refs: usize,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the user's lock.
    pub fn with_user<R>(&self, user: &UserId, f: impl FnOnce() -> R) -> R {
        let cell = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let entry = map
                .entry(user.clone())
                .or_insert_with(|| LockEntry { cell: Arc::new(Mutex::new(())), refs: 0 });
            entry.refs += 1;
            entry.cell.clone()
        };
        let result = {
            let _held = cell.lock().unwrap_or_else(|p| p.into_inner());
            f()
        };
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = map.get_mut(user) {
            entry.refs -= 1;
            if entry.refs == 0 {
                map.remove(user);
            }
        }
        result
    }

    /// Number of users currently holding or waiting on a lock.
    pub fn active_users(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Result of a generate run.
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    /// Placed tasks, in timeline order, with their new intervals.
    pub scheduled: Vec<Task>,
    /// Candidates held out because a dependency is not completed.
    pub held_out: Vec<TaskId>,
    /// Admitted tasks that did not fit in the window.
    pub unplaced: Vec<TaskId>,
}

/// Result of inserting a break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakInsertion {
    /// The stored break task.
    pub break_task: Task,
    /// Same-day tasks moved forward, in their new timeline order.
    pub shifted: Vec<TaskId>,
    /// Set when a shifted task now ends past the configured window end.
    pub window_overflow: bool,
}

/// Orchestrates schedule mutations over the task store.
pub struct ScheduleService {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
    locks: UserLocks,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, config: CoreConfig) -> Self {
        Self::with_locks(store, clock, config, UserLocks::new())
    }

    /// Build with a shared lock map so other mutating components (the
    /// execution tracker) serialize against the same per-user locks.
    pub fn with_locks(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
        locks: UserLocks,
    ) -> Self {
        Self { store, clock, config, locks }
    }

    pub fn locks(&self) -> UserLocks {
        self.locks.clone()
    }

    /// The configured default working window on `date`.
    pub fn window_for(&self, date: NaiveDate) -> Result<WorkingWindow> {
        Ok(WorkingWindow::on_date(
            date,
            self.config.day_start_time()?,
            self.config.day_end_time()?,
            self.config.scheduling_zone,
        )?)
    }

    /// Generate the day's schedule: clear previous placements on the
    /// date, admit candidates whose dependencies are satisfied, order by
    /// `policy`, flatten the dependency constraint and pack into
    /// `window`. Nothing is written on failure.
    pub fn generate(
        &self,
        user_id: &UserId,
        date: NaiveDate,
        window: &WorkingWindow,
        policy: SchedulingPolicy,
        op_deadline: Option<DateTime<Utc>>,
    ) -> Result<GenerateOutcome> {
        self.locks.with_user(user_id, || {
            self.check_deadline(op_deadline, "scheduler.generate")?;
            let now = self.clock.now();
            let (day_start, day_end) = day_bounds(date, self.config.scheduling_zone);

            // Candidates: re-schedulable tasks due on the date or undated.
            let candidates: Vec<Task> = self
                .store
                .find_tasks(
                    &TaskFilter::for_user(user_id)
                        .with_statuses(&[TaskStatus::Pending, TaskStatus::InProgress]),
                )?
                .into_iter()
                .filter(|t| t.deadline.map_or(true, |d| d >= day_start && d < day_end))
                .collect();

            // Cycle detection precedes every write (a cycle aborts cleanly).
            let graph = DependencyGraph::build(&candidates);
            if let Some((from, to)) = graph.find_cycle() {
                return Err(CoreError::CycleDetected { from, to });
            }

            // Dependencies outside the candidate set satisfy admission
            // only when completed.
            let mut completed_outside = HashSet::new();
            for dep_id in graph.external_dependencies() {
                if let Some(dep) = self.store.task(&dep_id)? {
                    if dep.status == TaskStatus::Completed {
                        completed_outside.insert(dep_id);
                    }
                }
            }
            let admissible = graph.admissible(&completed_outside);
            let held_out: Vec<TaskId> = candidates
                .iter()
                .filter(|t| !admissible.contains(&t.id))
                .map(|t| t.id)
                .collect();

            // Preference order first, then the dependency constraint.
            let mut admitted: Vec<Task> = candidates
                .iter()
                .filter(|t| admissible.contains(&t.id))
                .cloned()
                .collect();
            policy.sort(&mut admitted, now);
            let preferred: Vec<TaskId> = admitted.iter().map(|t| t.id).collect();
            let order = graph.flatten_preferred(&preferred)?;

            let by_id: HashMap<TaskId, Task> =
                admitted.into_iter().map(|t| (t.id, t)).collect();
            let ordered: Vec<Task> =
                order.iter().filter_map(|id| by_id.get(id).cloned()).collect();
            let outcome = pack(window, &ordered);

            // Placements on the date are regenerated from scratch; old
            // intervals of re-schedulable tasks and breaks are dropped.
            let placed_ids: HashSet<TaskId> =
                outcome.placed.iter().map(|p| p.task_id).collect();
            let mut previously = self.store.find_tasks(
                &TaskFilter::for_user(user_id)
                    .scheduled_within(day_start, day_end)
                    .with_statuses(&[
                        TaskStatus::Pending,
                        TaskStatus::InProgress,
                        TaskStatus::Break,
                    ]),
            )?;
            previously.sort_by_key(|t| t.scheduled_start_time);

            let mut scheduled = Vec::with_capacity(outcome.placed.len());
            for placement in &outcome.placed {
                if let Some(task) = by_id.get(&placement.task_id) {
                    let mut task = task.clone();
                    task.set_schedule(placement.start);
                    task.updated_at = now;
                    scheduled.push(task);
                }
            }

            let mut updates: Vec<Task> = Vec::new();
            for mut task in previously {
                if !placed_ids.contains(&task.id) {
                    task.clear_schedule();
                    task.updated_at = now;
                    updates.push(task);
                }
            }
            updates.extend(scheduled.iter().cloned());

            self.check_deadline(op_deadline, "scheduler.generate")?;
            self.persist_ordered("scheduler.generate", Vec::new(), &updates)?;

            info!(
                user = %user_id,
                %date,
                placed = scheduled.len(),
                held_out = held_out.len(),
                unplaced = outcome.skipped.len(),
                "generated schedule"
            );
            Ok(GenerateOutcome { scheduled, held_out, unplaced: outcome.skipped })
        })
    }

    /// Clear every placement intersecting the date. Returns the count of
    /// cleared tasks.
    pub fn reset(
        &self,
        user_id: &UserId,
        date: NaiveDate,
        op_deadline: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        self.locks.with_user(user_id, || {
            self.check_deadline(op_deadline, "scheduler.reset")?;
            let now = self.clock.now();
            let (day_start, day_end) = day_bounds(date, self.config.scheduling_zone);
            let mut scheduled = self
                .store
                .find_tasks(&TaskFilter::for_user(user_id).scheduled_within(day_start, day_end))?;
            scheduled.sort_by_key(|t| t.scheduled_start_time);
            let mut updates = Vec::with_capacity(scheduled.len());
            for mut task in scheduled {
                task.clear_schedule();
                task.updated_at = now;
                updates.push(task);
            }
            self.persist_ordered("scheduler.reset", Vec::new(), &updates)?;
            info!(user = %user_id, %date, cleared = updates.len(), "reset schedule");
            Ok(updates.len())
        })
    }

    /// All tasks whose placement intersects the date, by start time. Read
    /// only; takes no lock.
    pub fn daily(&self, user_id: &UserId, date: NaiveDate) -> Result<Vec<Task>> {
        let (day_start, day_end) = day_bounds(date, self.config.scheduling_zone);
        let mut tasks = self
            .store
            .find_tasks(&TaskFilter::for_user(user_id).scheduled_within(day_start, day_end))?;
        tasks.sort_by_key(|t| t.scheduled_start_time);
        Ok(tasks)
    }

    /// Insert a rest break directly after a scheduled task, pushing later
    /// same-day placements forward when the break does not fit in the gap.
    /// Re-inserting the same break is a no-op returning the stored task.
    pub fn insert_break(
        &self,
        user_id: &UserId,
        after_task_id: &TaskId,
        duration_minutes: i64,
        op_deadline: Option<DateTime<Utc>>,
    ) -> Result<BreakInsertion> {
        if duration_minutes < self.config.min_break_minutes {
            return Err(CoreError::InvalidDuration {
                minutes: duration_minutes,
                minimum: self.config.min_break_minutes,
            });
        }
        self.locks.with_user(user_id, || {
            self.check_deadline(op_deadline, "scheduler.insert_break")?;
            let now = self.clock.now();

            let anchor = match self.store.task(after_task_id)? {
                Some(t) if &t.user_id == user_id => t,
                _ => {
                    return Err(CoreError::NotFound {
                        kind: "scheduled anchor task",
                        id: after_task_id.to_string(),
                    })
                }
            };
            let Some((_, anchor_end)) = anchor.scheduled_interval() else {
                return Err(CoreError::NotFound {
                    kind: "scheduled anchor task",
                    id: after_task_id.to_string(),
                });
            };

            let break_start = anchor_end;
            let break_end = break_start + Duration::minutes(duration_minutes);
            let date = local_date(break_start, self.config.scheduling_zone);
            let (day_start, day_end) = day_bounds(date, self.config.scheduling_zone);

            let mut same_day = self
                .store
                .find_tasks(&TaskFilter::for_user(user_id).scheduled_within(day_start, day_end))?;
            same_day.sort_by_key(|t| t.scheduled_start_time);

            // Idempotent re-insert: an identical break already in place.
            if let Some(existing) = same_day.iter().find(|t| {
                t.is_break()
                    && t.scheduled_start_time == Some(break_start)
                    && t.scheduled_end_time == Some(break_end)
            }) {
                return Ok(BreakInsertion {
                    break_task: existing.clone(),
                    shifted: Vec::new(),
                    window_overflow: false,
                });
            }

            // Gap until the next placement; a break that fits needs no reflow.
            let next_start = same_day
                .iter()
                .filter(|t| t.id != anchor.id)
                .filter_map(|t| t.scheduled_start_time)
                .filter(|&s| s >= break_start)
                .min();
            let gap = next_start.map(|s| (s - break_start).num_minutes()).unwrap_or(0);
            let shift = if next_start.is_some() && duration_minutes > gap {
                duration_minutes - gap
            } else {
                0
            };

            let break_task = Task {
                id: TaskId::new(),
                user_id: user_id.clone(),
                name: "Break".to_string(),
                description: None,
                duration: duration_minutes,
                priority: crate::task::MIN_PRIORITY,
                status: TaskStatus::Break,
                deadline: None,
                dependencies: Vec::new(),
                scheduled_start_time: Some(break_start),
                scheduled_end_time: Some(break_end),
                actual_start_time: None,
                actual_end_time: None,
                created_at: now,
                updated_at: now,
            };

            let mut shifted_tasks: Vec<Task> = Vec::new();
            if shift > 0 {
                for task in &same_day {
                    if task.id == anchor.id {
                        continue;
                    }
                    if let Some((start, end)) = task.scheduled_interval() {
                        if start >= break_start {
                            let mut moved = task.clone();
                            moved.scheduled_start_time = Some(start + Duration::minutes(shift));
                            moved.scheduled_end_time = Some(end + Duration::minutes(shift));
                            moved.updated_at = now;
                            shifted_tasks.push(moved);
                        }
                    }
                }
                shifted_tasks.sort_by_key(|t| t.scheduled_start_time);
            }

            // Shifted tasks are pushed past the window end rather than
            // truncated; the caller gets a warning flag instead.
            let window_end =
                local_instant(date, self.config.day_end_time()?, self.config.scheduling_zone);
            let window_overflow = shifted_tasks
                .iter()
                .filter_map(|t| t.scheduled_end_time)
                .any(|end| end > window_end);
            if window_overflow {
                warn!(user = %user_id, %date, "break reflow pushed tasks past the window end");
            }

            self.check_deadline(op_deadline, "scheduler.insert_break")?;

            // The break starts at or before every shifted task; writing it
            // first keeps the sequence ascending in start time.
            if let Err(e) = self.store.insert_task(break_task.clone()) {
                return Err(CoreError::Storage(e));
            }
            self.persist_ordered("scheduler.insert_break", vec![break_task.id], &shifted_tasks)?;

            info!(
                user = %user_id,
                %date,
                break_task = %break_task.id,
                shifted = shifted_tasks.len(),
                "inserted break"
            );
            Ok(BreakInsertion {
                break_task,
                shifted: shifted_tasks.iter().map(|t| t.id).collect(),
                window_overflow,
            })
        })
    }

    fn check_deadline(&self, limit: Option<DateTime<Utc>>, operation: &'static str) -> Result<()> {
        match limit {
            Some(limit) if self.clock.now() > limit => Err(CoreError::Timeout { operation }),
            _ => Ok(()),
        }
    }

    /// Write `updates` in order. A failure partway through surfaces
    /// `PartialApply` with everything written so far (including
    /// `already_applied` documents the caller wrote before calling in);
    /// a failure on the very first write is a plain retryable storage
    /// error.
    fn persist_ordered(
        &self,
        operation: &'static str,
        already_applied: Vec<TaskId>,
        updates: &[Task],
    ) -> Result<()> {
        let total = already_applied.len() + updates.len();
        let mut applied = already_applied;
        for task in updates {
            if let Err(e) = self.store.put_task(task) {
                if applied.is_empty() {
                    return Err(CoreError::Storage(e));
                }
                return Err(CoreError::PartialApply {
                    operation,
                    applied,
                    failed: task.id,
                    total,
                    source: e,
                });
            }
            applied.push(task.id);
        }
        Ok(())
    }
}
