//! Local JSON-file storage for the CLI.
//!
//! One document holds every task and report. Saves write to a temporary
//! file first and rename it over the real one, so a crash mid-write
//! cannot corrupt the store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use dayflow_core::{
    Report, ReportId, ReportStore, StorageError, Task, TaskFilter, TaskId, TaskStore, UserId,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DbFile {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    reports: Vec<Report>,
}

/// File-backed task and report store.
pub struct JsonFileStore {
    path: PathBuf,
    inner: RwLock<DbFile>,
}

impl JsonFileStore {
    /// Open the store, starting empty when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = if path.exists() {
            let text = fs::read_to_string(path)
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            serde_json::from_str(&text).map_err(|e| StorageError::Corrupt(e.to_string()))?
        } else {
            DbFile::default()
        };
        Ok(Self { path: path.to_path_buf(), inner: RwLock::new(db) })
    }

    fn save(&self, db: &DbFile) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(db)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

impl TaskStore for JsonFileStore {
    fn insert_task(&self, task: Task) -> Result<(), StorageError> {
        let mut db = self.inner.write().unwrap_or_else(|p| p.into_inner());
        db.tasks.push(task);
        self.save(&db)
    }

    fn task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let db = self.inner.read().unwrap_or_else(|p| p.into_inner());
        Ok(db.tasks.iter().find(|t| &t.id == id).cloned())
    }

    fn put_task(&self, task: &Task) -> Result<(), StorageError> {
        let mut db = self.inner.write().unwrap_or_else(|p| p.into_inner());
        match db.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task.clone(),
            None => return Err(StorageError::Missing(task.id.to_string())),
        }
        self.save(&db)
    }

    fn delete_task(&self, id: &TaskId) -> Result<bool, StorageError> {
        let mut db = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let before = db.tasks.len();
        db.tasks.retain(|t| &t.id != id);
        let removed = db.tasks.len() != before;
        if removed {
            self.save(&db)?;
        }
        Ok(removed)
    }

    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError> {
        let db = self.inner.read().unwrap_or_else(|p| p.into_inner());
        let mut found: Vec<Task> =
            db.tasks.iter().filter(|t| filter.matches(t)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }
}

impl ReportStore for JsonFileStore {
    fn insert_report(&self, report: Report) -> Result<(), StorageError> {
        let mut db = self.inner.write().unwrap_or_else(|p| p.into_inner());
        db.reports.push(report);
        self.save(&db)
    }

    fn report(&self, id: &ReportId) -> Result<Option<Report>, StorageError> {
        let db = self.inner.read().unwrap_or_else(|p| p.into_inner());
        Ok(db.reports.iter().find(|r| &r.id == id).cloned())
    }

    fn report_for_day(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<Option<Report>, StorageError> {
        let db = self.inner.read().unwrap_or_else(|p| p.into_inner());
        Ok(db
            .reports
            .iter()
            .find(|r| &r.user_id == user_id && r.date == date)
            .cloned())
    }

    fn reports_for_user(&self, user_id: &UserId) -> Result<Vec<Report>, StorageError> {
        let db = self.inner.read().unwrap_or_else(|p| p.into_inner());
        let mut found: Vec<Report> =
            db.reports.iter().filter(|r| &r.user_id == user_id).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.date.cmp(&a.date)));
        Ok(found)
    }

    fn delete_report(&self, id: &ReportId) -> Result<bool, StorageError> {
        let mut db = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let before = db.reports.len();
        db.reports.retain(|r| &r.id != id);
        let removed = db.reports.len() != before;
        if removed {
            self.save(&db)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dayflow_core::TaskDraft;

    fn temp_store(name: &str) -> (PathBuf, JsonFileStore) {
        let dir = std::env::temp_dir().join(format!("dayflow_store_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("db.json");
        let store = JsonFileStore::open(&path).unwrap();
        (dir, store)
    }

    fn make_task(name: &str) -> Task {
        Task::from_draft(
            TaskDraft {
                user_id: UserId::from("u1"),
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
    fn tasks_survive_reopen() {
        let (dir, store) = temp_store("reopen");
        let task = make_task("persisted");
        store.insert_task(task.clone()).unwrap();
        drop(store);

        let store = JsonFileStore::open(&dir.join("db.json")).unwrap();
        let loaded = store.task(&task.id).unwrap().unwrap();
        assert_eq!(loaded.name, "persisted");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn put_on_missing_task_fails() {
        let (dir, store) = temp_store("missing");
        let task = make_task("ghost");
        assert!(matches!(store.put_task(&task), Err(StorageError::Missing(_))));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = std::env::temp_dir().join("dayflow_store_corrupt");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("db.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StorageError::Corrupt(_))));
        fs::remove_dir_all(dir).unwrap();
    }
}
