//! Effective trip intervals and the scheduling constants around them.
//!
//! Every trip occupies the half-open span `[date + departure, end_date + return)`
//! where `end_date` is the next calendar day when the return time is earlier than
//! the departure time. All comparisons in the engine go through [`TripWindow`] so
//! the overnight rule is applied the same way everywhere.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use fleetline_shared::TripSchedule;
use serde::{Deserialize, Serialize};

/// Skew between the host clock and the local time trips are entered in.
pub const DEFAULT_CLOCK_OFFSET_MINUTES: i64 = 180;
/// Minimum notice before a newly scheduled trip may depart.
pub const DEFAULT_LEAD_TIME_MINUTES: i64 = 180;
/// An unbooked trip this close to departure is dropped.
pub const DEFAULT_GRACE_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingRules {
    pub clock_offset: Duration,
    pub lead_time: Duration,
    pub grace_window: Duration,
}

impl SchedulingRules {
    pub fn from_minutes(clock_offset: i64, lead_time: i64, grace_window: i64) -> Self {
        Self {
            clock_offset: Duration::minutes(clock_offset),
            lead_time: Duration::minutes(lead_time),
            grace_window: Duration::minutes(grace_window),
        }
    }
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self::from_minutes(
            DEFAULT_CLOCK_OFFSET_MINUTES,
            DEFAULT_LEAD_TIME_MINUTES,
            DEFAULT_GRACE_WINDOW_MINUTES,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("departure and return are both at {0}; the trip would have no duration")]
    ZeroLength(NaiveTime),
    #[error("trip on {0} falls outside the supported calendar range")]
    OutOfRange(NaiveDate),
    #[error("trip starts at {start} but new trips may not depart before {earliest}")]
    InsideLeadTime {
        start: NaiveDateTime,
        earliest: NaiveDateTime,
    },
}

/// Half-open `[start, end)` span a trip holds its driver and bus for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TripWindow {
    /// Applies the overnight rule to a stored schedule.
    pub fn of(schedule: &TripSchedule) -> Result<Self, ScheduleError> {
        if schedule.departure_time == schedule.return_time {
            return Err(ScheduleError::ZeroLength(schedule.departure_time));
        }

        let end_date = if schedule.is_overnight() {
            schedule
                .date
                .succ_opt()
                .ok_or(ScheduleError::OutOfRange(schedule.date))?
        } else {
            schedule.date
        };

        Ok(Self {
            start: schedule.date.and_time(schedule.departure_time),
            end: end_date.and_time(schedule.return_time),
        })
    }

    /// Builds a window from explicit bounds; `None` unless `end > start`.
    pub fn from_bounds(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &TripWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Inclusive range of trip dates that can produce an overlapping window.
    /// A trip never spans more than one midnight, so anything overlapping
    /// `self` departs no earlier than the day before `start`.
    pub fn candidate_dates(&self) -> (NaiveDate, NaiveDate) {
        let first = self.start.date();
        (first.pred_opt().unwrap_or(first), self.end.date())
    }

    pub fn check_lead_time(&self, now: NaiveDateTime, lead_time: Duration) -> Result<(), ScheduleError> {
        let earliest = now + lead_time;
        if self.start < earliest {
            return Err(ScheduleError::InsideLeadTime {
                start: self.start,
                earliest,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn schedule(dep: (u32, u32), ret: (u32, u32)) -> TripSchedule {
        TripSchedule::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(dep.0, dep.1, 0).unwrap(),
            NaiveTime::from_hms_opt(ret.0, ret.1, 0).unwrap(),
        )
    }

    #[test]
    fn test_overnight_trip_ends_next_day() {
        let window = TripWindow::of(&schedule((23, 0), (1, 0))).unwrap();
        assert_eq!(window.start, at(1, 23, 0));
        assert_eq!(window.end, at(2, 1, 0));
        assert!(window.contains(at(2, 0, 30)));
        assert_eq!(window.duration(), Duration::hours(2));
    }

    #[test]
    fn test_same_day_trip() {
        let window = TripWindow::of(&schedule((8, 0), (10, 0))).unwrap();
        assert_eq!(window.start, at(1, 8, 0));
        assert_eq!(window.end, at(1, 10, 0));
        assert!(!window.contains(at(1, 10, 0)));
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let err = TripWindow::of(&schedule((9, 0), (9, 0))).unwrap_err();
        assert!(matches!(err, ScheduleError::ZeroLength(_)));
    }

    #[test]
    fn test_half_open_touching_windows_do_not_overlap() {
        let morning = TripWindow::of(&schedule((8, 0), (10, 0))).unwrap();
        let late_morning = TripWindow::of(&schedule((10, 0), (12, 0))).unwrap();
        let overlapping = TripWindow::of(&schedule((9, 0), (11, 0))).unwrap();

        assert!(!morning.overlaps(&late_morning));
        assert!(morning.overlaps(&overlapping));
        assert!(overlapping.overlaps(&late_morning));
    }

    #[test]
    fn test_candidate_dates_reach_back_one_day() {
        let window = TripWindow::of(&schedule((23, 0), (1, 0))).unwrap();
        let (from, to) = window.candidate_dates();
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
    }

    #[test]
    fn test_lead_time() {
        let window = TripWindow::of(&schedule((12, 0), (14, 0))).unwrap();
        let lead = Duration::hours(3);

        assert!(window.check_lead_time(at(1, 9, 0), lead).is_ok());
        assert!(matches!(
            window.check_lead_time(at(1, 9, 1), lead),
            Err(ScheduleError::InsideLeadTime { .. })
        ));
    }

    #[test]
    fn test_from_bounds_requires_positive_length() {
        assert!(TripWindow::from_bounds(at(1, 8, 0), at(1, 8, 0)).is_none());
        assert!(TripWindow::from_bounds(at(1, 8, 0), at(1, 9, 0)).is_some());
    }
}
