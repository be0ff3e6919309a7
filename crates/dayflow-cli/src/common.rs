//! Shared wiring for CLI commands.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use dayflow_core::{
    clock::parse_date, CoreConfig, ExecutionTracker, ReportGenerator, ScheduleService,
    SystemClock, TaskManager, TemplateSummary, UserLocks,
};

use crate::store::JsonFileStore;

/// Data directory: `$DAYFLOW_HOME` or `.dayflow` under the working
/// directory.
pub fn data_dir() -> PathBuf {
    std::env::var_os("DAYFLOW_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".dayflow"))
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Everything a command needs, wired over the JSON file store.
pub struct Engine {
    pub config: CoreConfig,
    pub manager: TaskManager,
    pub tracker: ExecutionTracker,
    pub service: ScheduleService,
    pub reports: ReportGenerator,
}

pub fn open_engine() -> Result<Engine, Box<dyn Error>> {
    let config = CoreConfig::load_or_default(&config_path());
    let store = Arc::new(JsonFileStore::open(&data_dir().join("db.json"))?);
    let clock = Arc::new(SystemClock);
    let locks = UserLocks::new();

    let manager = TaskManager::new(store.clone(), clock.clone());
    let tracker = ExecutionTracker::new(store.clone(), clock.clone(), locks.clone());
    let service =
        ScheduleService::with_locks(store.clone(), clock.clone(), config.clone(), locks);
    let reports = ReportGenerator::new(
        store.clone(),
        store,
        Arc::new(TemplateSummary),
        clock,
        config.clone(),
    );
    Ok(Engine { config, manager, tracker, service, reports })
}

pub fn parse_date_arg(s: &str) -> Result<NaiveDate, Box<dyn Error>> {
    Ok(parse_date(s)?)
}
