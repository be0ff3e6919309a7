//! Timeline packing inside a working window.
//!
//! Tasks are placed end-to-end from the window start in the order given;
//! a task that does not fit in the remaining span is skipped, never an
//! error. The packer is pure: it reports placements and leaves the store
//! to the caller.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::clock::local_instant;
use crate::error::ValidationError;
use crate::id::TaskId;
use crate::task::Task;

/// The clock interval of one day during which tasks may be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WorkingWindow {
    /// Build a window; a zero-length window is legal (nothing will fit).
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window on `date` between two local clock times in `zone`.
    pub fn on_date(
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        zone: Tz,
    ) -> Result<Self, ValidationError> {
        Self::new(local_instant(date, start, zone), local_instant(date, end, zone))
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// A task placed on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub task_id: TaskId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Result of packing an ordered task list into a window.
#[derive(Debug, Clone, Default)]
pub struct PackOutcome {
    /// Placed intervals, in timeline order.
    pub placed: Vec<Placement>,
    /// Tasks that did not fit, in input order.
    pub skipped: Vec<TaskId>,
}

/// Place `ordered` end-to-end into `window`.
pub fn pack(window: &WorkingWindow, ordered: &[Task]) -> PackOutcome {
    let mut outcome = PackOutcome::default();
    let mut cursor = window.start;
    for task in ordered {
        let end = cursor + Duration::minutes(task.duration);
        if end <= window.end {
            outcome.placed.push(Placement { task_id: task.id, start: cursor, end });
            cursor = end;
        } else {
            outcome.skipped.push(task.id);
        }
    }
    outcome
}
