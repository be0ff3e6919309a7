//! Ordering policies for schedule generation.
//!
//! A policy is a comparator chain over pending tasks, applied before the
//! dependency constraint flattens the order. Policies are plain values;
//! switching is a matter of passing a different variant.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// Upper bound on deadline pressure.
const MAX_PRESSURE: f64 = 10.0;

/// Hours-to-pressure divisor: a deadline 24h out contributes 0, one due
/// now contributes the full 10.
const PRESSURE_HOURS_DIVISOR: f64 = 2.4;

/// Selectable ordering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Composite priority + deadline-pressure score (default).
    #[default]
    RoundRobin,
    /// First created, first served.
    Fcfs,
    /// Shortest job first.
    Sjf,
    /// Longest job first.
    Ljf,
    /// Raw priority.
    Priority,
}

impl SchedulingPolicy {
    pub const ALL: [SchedulingPolicy; 5] = [
        SchedulingPolicy::RoundRobin,
        SchedulingPolicy::Fcfs,
        SchedulingPolicy::Sjf,
        SchedulingPolicy::Ljf,
        SchedulingPolicy::Priority,
    ];

    /// Total preference order between two tasks; `Less` means `a` is
    /// scheduled earlier.
    pub fn compare(&self, a: &Task, b: &Task, now: DateTime<Utc>) -> Ordering {
        match self {
            SchedulingPolicy::RoundRobin => composite_score(b, now)
                .total_cmp(&composite_score(a, now))
                .then_with(|| cmp_deadline(a.deadline, b.deadline))
                .then_with(|| a.created_at.cmp(&b.created_at)),
            SchedulingPolicy::Fcfs => a.created_at.cmp(&b.created_at),
            SchedulingPolicy::Sjf => a
                .duration
                .cmp(&b.duration)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.created_at.cmp(&b.created_at)),
            SchedulingPolicy::Ljf => b
                .duration
                .cmp(&a.duration)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.created_at.cmp(&b.created_at)),
            SchedulingPolicy::Priority => b
                .priority
                .cmp(&a.priority)
                .then_with(|| cmp_deadline(a.deadline, b.deadline))
                .then_with(|| a.created_at.cmp(&b.created_at)),
        }
    }

    /// Stable-sort tasks into preference order.
    pub fn sort(&self, tasks: &mut [Task], now: DateTime<Utc>) {
        tasks.sort_by(|a, b| self.compare(a, b, now));
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulingPolicy::RoundRobin => "round_robin",
            SchedulingPolicy::Fcfs => "fcfs",
            SchedulingPolicy::Sjf => "sjf",
            SchedulingPolicy::Ljf => "ljf",
            SchedulingPolicy::Priority => "priority",
        };
        f.write_str(s)
    }
}

impl FromStr for SchedulingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(SchedulingPolicy::RoundRobin),
            "fcfs" => Ok(SchedulingPolicy::Fcfs),
            "sjf" => Ok(SchedulingPolicy::Sjf),
            "ljf" => Ok(SchedulingPolicy::Ljf),
            "priority" => Ok(SchedulingPolicy::Priority),
            other => Err(format!(
                "unknown policy '{other}', expected one of: round_robin, fcfs, sjf, ljf, priority"
            )),
        }
    }
}

/// Composite round-robin score: priority dominates, a deadline within the
/// next 24h adds up to ~10 on top.
pub fn composite_score(task: &Task, now: DateTime<Utc>) -> f64 {
    task.priority as f64 * 10.0 + deadline_pressure(task.deadline, now)
}

/// Pressure in `[0, 10]`, rising as a future deadline approaches. Past or
/// absent deadlines contribute nothing.
pub fn deadline_pressure(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match deadline {
        Some(due) if due > now => {
            let hours_left = (due - now).num_minutes() as f64 / 60.0;
            (MAX_PRESSURE - hours_left / PRESSURE_HOURS_DIVISOR).max(0.0)
        }
        _ => 0.0,
    }
}

/// Earlier deadlines first; tasks without a deadline sort last.
fn cmp_deadline(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::UserId;
    use crate::task::TaskDraft;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 8, 0, 0).unwrap()
    }

    fn make_task(name: &str, duration: i64, priority: i32) -> Task {
        Task::from_draft(
            TaskDraft {
                user_id: UserId::from("u1"),
                name: name.to_string(),
                description: None,
                duration,
                priority,
                deadline: None,
                dependencies: Vec::new(),
            },
            now(),
        )
    }

    #[test]
    fn pressure_is_zero_without_deadline_or_in_the_past() {
        assert_eq!(deadline_pressure(None, now()), 0.0);
        assert_eq!(deadline_pressure(Some(now() - Duration::hours(1)), now()), 0.0);
    }

    #[test]
    fn pressure_grows_toward_the_deadline() {
        let far = deadline_pressure(Some(now() + Duration::hours(20)), now());
        let near = deadline_pressure(Some(now() + Duration::hours(2)), now());
        assert!(near > far);
        assert!(near <= MAX_PRESSURE);
        // 24h out is exactly at the zero boundary.
        assert_eq!(deadline_pressure(Some(now() + Duration::hours(24)), now()), 0.0);
    }

    #[test]
    fn composite_score_is_priority_dominated() {
        let mut low = make_task("low", 30, 2);
        low.deadline = Some(now() + Duration::hours(1));
        let high = make_task("high", 30, 3);
        // One priority step (10) outweighs even a one-hour-out deadline.
        assert!(composite_score(&high, now()) > composite_score(&low, now()));
        assert!(composite_score(&low, now()) > 20.0);
    }

    #[test]
    fn round_robin_prefers_priority_then_deadline() {
        let a = make_task("a", 30, 5);
        let mut b = make_task("b", 30, 5);
        b.deadline = Some(now() + Duration::hours(2));
        let c = make_task("c", 30, 3);
        let mut tasks = vec![a.clone(), c.clone(), b.clone()];
        SchedulingPolicy::RoundRobin.sort(&mut tasks, now());
        // b's pressure beats a's bare priority; c trails on priority.
        assert_eq!(tasks[0].id, b.id);
        assert_eq!(tasks[1].id, a.id);
        assert_eq!(tasks[2].id, c.id);
    }

    #[test]
    fn fcfs_orders_by_creation() {
        let a = make_task("a", 30, 1);
        let mut b = make_task("b", 10, 5);
        b.created_at = a.created_at + Duration::minutes(1);
        let mut tasks = vec![b.clone(), a.clone()];
        SchedulingPolicy::Fcfs.sort(&mut tasks, now());
        assert_eq!(tasks[0].id, a.id);
    }

    #[test]
    fn sjf_and_ljf_are_mirrors_on_duration() {
        let short = make_task("short", 15, 1);
        let long = make_task("long", 90, 1);
        let mut tasks = vec![long.clone(), short.clone()];
        SchedulingPolicy::Sjf.sort(&mut tasks, now());
        assert_eq!(tasks[0].id, short.id);
        SchedulingPolicy::Ljf.sort(&mut tasks, now());
        assert_eq!(tasks[0].id, long.id);
    }

    #[test]
    fn sjf_breaks_duration_ties_by_priority() {
        let low = make_task("low", 30, 2);
        let high = make_task("high", 30, 4);
        let mut tasks = vec![low.clone(), high.clone()];
        SchedulingPolicy::Sjf.sort(&mut tasks, now());
        assert_eq!(tasks[0].id, high.id);
    }

    #[test]
    fn priority_policy_breaks_ties_by_deadline() {
        let mut soon = make_task("soon", 30, 4);
        soon.deadline = Some(now() + Duration::hours(3));
        let mut later = make_task("later", 30, 4);
        later.deadline = Some(now() + Duration::hours(8));
        let none = make_task("none", 30, 4);
        let mut tasks = vec![none.clone(), later.clone(), soon.clone()];
        SchedulingPolicy::Priority.sort(&mut tasks, now());
        assert_eq!(tasks[0].id, soon.id);
        assert_eq!(tasks[1].id, later.id);
        assert_eq!(tasks[2].id, none.id);
    }

    #[test]
    fn policy_parses_wire_names() {
        for policy in SchedulingPolicy::ALL {
            let parsed: SchedulingPolicy = policy.to_string().parse().unwrap();
            assert_eq!(parsed, policy);
        }
        assert!("fifo".parse::<SchedulingPolicy>().is_err());
        assert_eq!(
            serde_json::to_string(&SchedulingPolicy::RoundRobin).unwrap(),
            "\"round_robin\""
        );
    }
}
