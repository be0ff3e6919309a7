//! Time sources and local-zone calendar arithmetic.
//!
//! All time-dependent logic in the engine reads from an injected [`Clock`];
//! `SystemClock` is the only place that touches the wall clock. Dates in
//! external interfaces are calendar days in the configured scheduling zone,
//! converted here to UTC instants.

use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;

/// Injectable time provider.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time provider used outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for deterministic tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

/// Parse a `HH:MM` clock time.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, ValidationError> {
    let invalid = || ValidationError::InvalidTime(s.to_string());
    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// UTC instant of `time` on `date` in the scheduling zone. Ambiguous local
/// times (DST transitions) resolve to the earlier instant.
pub fn local_instant(date: NaiveDate, time: NaiveTime, zone: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match zone.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Gap (spring-forward): nudge an hour later and retry.
        None => zone
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

/// Half-open UTC bounds `[start, end)` of a calendar day in the scheduling
/// zone.
pub fn day_bounds(date: NaiveDate, zone: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_instant(date, NaiveTime::MIN, zone);
    let end = local_instant(date + Duration::days(1), NaiveTime::MIN, zone);
    (start, end)
}

/// Calendar day of `instant` in the scheduling zone.
pub fn local_date(instant: DateTime<Utc>, zone: Tz) -> NaiveDate {
    instant.with_timezone(&zone).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parse_hhmm_accepts_and_rejects() {
        assert_eq!(parse_hhmm("09:30").unwrap().hour(), 9);
        assert_eq!(parse_hhmm("09:30").unwrap().minute(), 30);
        assert!(parse_hhmm("9h30").is_err());
        assert!(parse_hhmm("25:00").is_err());
    }

    #[test]
    fn parse_date_accepts_and_rejects() {
        assert!(parse_date("2024-03-14").is_ok());
        assert!(parse_date("14/03/2024").is_err());
    }

    #[test]
    fn day_bounds_cover_24_hours_in_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let (start, end) = day_bounds(date, chrono_tz::UTC);
        assert_eq!(end - start, Duration::days(1));
        assert_eq!(start.to_rfc3339(), "2024-03-14T00:00:00+00:00");
    }

    #[test]
    fn local_instant_applies_zone_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let instant = local_instant(date, nine, chrono_tz::Asia::Tokyo);
        // 09:00 JST is midnight UTC.
        assert_eq!(instant.to_rfc3339(), "2024-01-15T00:00:00+00:00");
    }

    #[test]
    fn fixed_clock_is_settable() {
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        clock.advance(Duration::minutes(30));
        assert_eq!(clock.now().to_rfc3339(), "2024-01-01T12:30:00+00:00");
    }
}
