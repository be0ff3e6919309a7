//! In-memory store used by tests and as the reference adapter.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;

use crate::error::StorageError;
use crate::id::{ReportId, TaskId, UserId};
use crate::report::Report;
use crate::store::{ReportStore, TaskFilter, TaskStore};
use crate::task::Task;

/// Process-local document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    reports: RwLock<HashMap<ReportId, Report>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl TaskStore for MemoryStore {
    fn insert_task(&self, task: Task) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().unwrap_or_else(|p| p.into_inner());
        tasks.insert(task.id, task);
        Ok(())
    }

    fn task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let tasks = self.tasks.read().unwrap_or_else(|p| p.into_inner());
        Ok(tasks.get(id).cloned())
    }

    fn put_task(&self, task: &Task) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().unwrap_or_else(|p| p.into_inner());
        if !tasks.contains_key(&task.id) {
            return Err(StorageError::Missing(task.id.to_string()));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    fn delete_task(&self, id: &TaskId) -> Result<bool, StorageError> {
        let mut tasks = self.tasks.write().unwrap_or_else(|p| p.into_inner());
        Ok(tasks.remove(id).is_some())
    }

    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError> {
        let tasks = self.tasks.read().unwrap_or_else(|p| p.into_inner());
        let mut found: Vec<Task> = tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }
}

impl ReportStore for MemoryStore {
    fn insert_report(&self, report: Report) -> Result<(), StorageError> {
        let mut reports = self.reports.write().unwrap_or_else(|p| p.into_inner());
        reports.insert(report.id, report);
        Ok(())
    }

    fn report(&self, id: &ReportId) -> Result<Option<Report>, StorageError> {
        let reports = self.reports.read().unwrap_or_else(|p| p.into_inner());
        Ok(reports.get(id).cloned())
    }

    fn report_for_day(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<Option<Report>, StorageError> {
        let reports = self.reports.read().unwrap_or_else(|p| p.into_inner());
        Ok(reports
            .values()
            .find(|r| &r.user_id == user_id && r.date == date)
            .cloned())
    }

    fn reports_for_user(&self, user_id: &UserId) -> Result<Vec<Report>, StorageError> {
        let reports = self.reports.read().unwrap_or_else(|p| p.into_inner());
        let mut found: Vec<Report> =
            reports.values().filter(|r| &r.user_id == user_id).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.date.cmp(&a.date)));
        Ok(found)
    }

    fn delete_report(&self, id: &ReportId) -> Result<bool, StorageError> {
        let mut reports = self.reports.write().unwrap_or_else(|p| p.into_inner());
        Ok(reports.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskDraft, TaskStatus};
    use chrono::{TimeZone, Utc};

    fn make_task(user: &str, name: &str) -> Task {
        Task::from_draft(
            TaskDraft {
                user_id: UserId::from(user),
                name: name.to_string(),
                description: None,
                duration: 30,
                priority: 3,
                deadline: None,
                dependencies: Vec::new(),
            },
            Utc.with_ymd_and_hms(2024, 3, 14, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn insert_fetch_delete_roundtrip() {
        let store = MemoryStore::new();
        let task = make_task("u1", "a");
        let id = task.id;
        store.insert_task(task).unwrap();
        assert!(store.task(&id).unwrap().is_some());
        assert!(store.delete_task(&id).unwrap());
        assert!(store.task(&id).unwrap().is_none());
        assert!(!store.delete_task(&id).unwrap());
    }

    #[test]
    fn put_requires_existing_document() {
        let store = MemoryStore::new();
        let task = make_task("u1", "a");
        assert!(store.put_task(&task).is_err());
        store.insert_task(task.clone()).unwrap();
        assert!(store.put_task(&task).is_ok());
    }

    #[test]
    fn filter_combines_user_and_status() {
        let store = MemoryStore::new();
        let mut a = make_task("u1", "a");
        a.status = TaskStatus::Completed;
        let b = make_task("u1", "b");
        let c = make_task("u2", "c");
        for t in [a.clone(), b.clone(), c] {
            store.insert_task(t).unwrap();
        }
        let found = store
            .find_tasks(
                &TaskFilter::for_user(&UserId::from("u1")).with_statuses(&[TaskStatus::Pending]),
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b.id);
    }

    #[test]
    fn scheduled_within_matches_intersections() {
        let store = MemoryStore::new();
        let mut task = make_task("u1", "a");
        task.set_schedule(Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap());
        store.insert_task(task).unwrap();

        let day = |h| Utc.with_ymd_and_hms(2024, 3, 14, h, 0, 0).unwrap();
        let hit = TaskFilter::default().scheduled_within(day(9), day(10));
        let graze = TaskFilter::default().scheduled_within(day(8), day(9));
        assert_eq!(store.find_tasks(&hit).unwrap().len(), 1);
        // Interval [9:00, 9:30) does not intersect [8:00, 9:00).
        assert_eq!(store.find_tasks(&graze).unwrap().len(), 0);
    }
}
