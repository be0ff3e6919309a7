//! Task CRUD with invariant checks in front of the store.
//!
//! Every write validates field-level constraints and the dependency rules
//! (existing ids, same user, acyclic) before touching storage, so the
//! store only ever holds well-formed documents.

use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::dependency::would_create_cycle;
use crate::error::{CoreError, Result, ValidationError};
use crate::id::{TaskId, UserId};
use crate::store::{TaskFilter, TaskStore};
use crate::task::{Task, TaskDraft, TaskPatch};

/// Validating CRUD layer over the task store.
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl TaskManager {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a task from a draft. The new task starts `pending` and
    /// unscheduled.
    pub fn create(&self, draft: TaskDraft) -> Result<Task> {
        draft.validate()?;
        self.check_dependencies(&draft.user_id, &draft.dependencies)?;
        let task = Task::from_draft(draft, self.clock.now());
        self.store.insert_task(task.clone())?;
        info!(task = %task.id, user = %task.user_id, "created task");
        Ok(task)
    }

    /// Apply a partial update to user-editable fields.
    pub fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        patch.validate()?;
        let mut task = self.fetch(id)?;
        if let Some(deps) = &patch.dependencies {
            self.check_dependencies(&task.user_id, deps)?;
            let user_tasks = self.store.find_tasks(&TaskFilter::for_user(&task.user_id))?;
            if would_create_cycle(&user_tasks, task.id, deps) {
                // Name the edge that closes the loop.
                let to = deps
                    .iter()
                    .copied()
                    .find(|d| would_create_cycle(&user_tasks, task.id, &[*d]))
                    .unwrap_or(task.id);
                return Err(CoreError::CycleDetected { from: task.id, to });
            }
        }
        patch.apply_to(&mut task)?;
        task.updated_at = self.clock.now();
        task.validate()?;
        self.store.put_task(&task)?;
        Ok(task)
    }

    /// Delete a task. Refused while other tasks depend on it.
    pub fn delete(&self, id: &TaskId) -> Result<()> {
        let task = self.fetch(id)?;
        let user_tasks = self.store.find_tasks(&TaskFilter::for_user(&task.user_id))?;
        let dependents: Vec<TaskId> = user_tasks
            .iter()
            .filter(|t| t.dependencies.contains(id))
            .map(|t| t.id)
            .collect();
        if !dependents.is_empty() {
            return Err(ValidationError::HasDependents { dependents }.into());
        }
        self.store.delete_task(id)?;
        info!(task = %id, "deleted task");
        Ok(())
    }

    /// Fetch one task or fail with `NotFound`.
    pub fn fetch(&self, id: &TaskId) -> Result<Task> {
        self.store
            .task(id)?
            .ok_or_else(|| CoreError::NotFound { kind: "task", id: id.to_string() })
    }

    /// List tasks matching a filter.
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.store.find_tasks(filter)?)
    }

    /// Dependencies must exist, belong to the same user, and not be break
    /// tasks.
    fn check_dependencies(&self, user_id: &UserId, deps: &[TaskId]) -> Result<()> {
        for dep_id in deps {
            let dep = self
                .store
                .task(dep_id)?
                .ok_or(ValidationError::UnknownDependency(*dep_id))?;
            if &dep.user_id != user_id {
                return Err(ValidationError::ForeignDependency(*dep_id).into());
            }
            if dep.is_break() {
                return Err(ValidationError::InvalidValue {
                    field: "dependencies",
                    message: format!("{dep_id} is a break and cannot be depended on"),
                }
                .into());
            }
        }
        Ok(())
    }
}
