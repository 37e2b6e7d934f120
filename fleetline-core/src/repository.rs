use async_trait::async_trait;
use chrono::NaiveDate;
use fleetline_shared::{DeviceToken, Resource, ResourceKind, Trip, TripSchedule, TripStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::schedule::TripWindow;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Storage call timed out")]
    Timeout,
    #[error("{kind} {resource_id} is already assigned to trip {trip_id}")]
    Conflict {
        kind: ResourceKind,
        resource_id: Uuid,
        trip_id: Uuid,
    },
    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),
    #[error("{kind} {resource_id} not found")]
    ResourceNotFound { kind: ResourceKind, resource_id: Uuid },
    #[error("Trip {trip_id} is {status} and can no longer be changed")]
    Locked { trip_id: Uuid, status: TripStatus },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// A non-cancelled trip currently holding a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentWindow {
    pub trip_id: Uuid,
    pub schedule: TripSchedule,
}

/// Per-trip facts the reconciler decides on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripSnapshot {
    pub trip_id: Uuid,
    pub status: TripStatus,
    pub schedule: TripSchedule,
    pub booked_seats: u32,
    pub bus_capacity: Option<u32>,
}

/// A status write guarded by the status it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub trip_id: Uuid,
    pub from: TripStatus,
    pub to: TripStatus,
}

#[derive(Debug, Clone, Default)]
pub struct Recipients {
    pub driver: Vec<DeviceToken>,
    pub passengers: Vec<DeviceToken>,
}

impl Recipients {
    pub fn merge(mut self, other: Recipients) -> Self {
        for token in other.driver {
            if !self.driver.contains(&token) {
                self.driver.push(token);
            }
        }
        for token in other.passengers {
            if !self.passengers.contains(&token) {
                self.passengers.push(token);
            }
        }
        self
    }

    pub fn into_tokens(self) -> Vec<DeviceToken> {
        let mut tokens = self.driver;
        tokens.extend(self.passengers);
        tokens
    }
}

/// Persistence port over trips, assignments, bookings, drivers and buses.
///
/// `insert_trip` and `replace_trip` write the trip, its assignment and its
/// stops as one unit, and must re-check both resources for overlapping
/// non-cancelled assignments inside that unit, failing with
/// [`LedgerError::Conflict`]. `replace_trip` also re-reads the stored status
/// in that unit: a Complete or Cancelled trip fails with
/// [`LedgerError::Locked`], and the stored status always wins over the
/// caller's copy.
#[async_trait]
pub trait TripLedger: Send + Sync {
    async fn get_trip(&self, id: Uuid) -> LedgerResult<Option<Trip>>;

    async fn get_resource(&self, kind: ResourceKind, id: Uuid) -> LedgerResult<Option<Resource>>;

    async fn list_resources(&self, kind: ResourceKind, manager_id: Uuid) -> LedgerResult<Vec<Resource>>;

    /// Non-cancelled assignments of one resource on trips dated within `[from, to]`.
    async fn assignments_between(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<AssignmentWindow>>;

    /// Every trip that is neither Complete nor Cancelled.
    async fn reconciliation_snapshot(&self) -> LedgerResult<Vec<TripSnapshot>>;

    /// Applies each change only where the stored status still equals `from`.
    /// Returns how many rows changed.
    async fn apply_status_changes(&self, changes: &[StatusChange]) -> LedgerResult<usize>;

    async fn insert_trip(&self, trip: &Trip) -> LedgerResult<()>;

    async fn replace_trip(&self, trip: &Trip) -> LedgerResult<()>;

    /// Manager override, applied only while the stored status is still
    /// `from`. Returns false when the trip has moved on.
    async fn set_trip_status(&self, trip_id: Uuid, from: TripStatus, to: TripStatus) -> LedgerResult<bool>;

    async fn set_resource_archived(&self, kind: ResourceKind, id: Uuid, archived: bool) -> LedgerResult<()>;

    async fn notification_recipients(&self, trip_id: Uuid) -> LedgerResult<Recipients>;
}

/// First assignment whose effective window overlaps `window`, ignoring `exclude_trip_id`.
/// Stored schedules that do not form a valid window never conflict.
pub fn first_conflict(
    assignments: &[AssignmentWindow],
    window: &TripWindow,
    exclude_trip_id: Option<Uuid>,
) -> Option<Uuid> {
    assignments
        .iter()
        .filter(|a| Some(a.trip_id) != exclude_trip_id)
        .find(|a| {
            TripWindow::of(&a.schedule)
                .map(|existing| existing.overlaps(window))
                .unwrap_or(false)
        })
        .map(|a| a.trip_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn assignment(day: u32, dep: u32, ret: u32) -> AssignmentWindow {
        AssignmentWindow {
            trip_id: Uuid::new_v4(),
            schedule: TripSchedule::new(
                NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
                NaiveTime::from_hms_opt(dep, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(ret, 0, 0).unwrap(),
            ),
        }
    }

    #[test]
    fn test_first_conflict_finds_overlap() {
        let existing = vec![assignment(1, 8, 10), assignment(1, 14, 16)];
        let candidate = TripWindow::of(&assignment(1, 9, 11).schedule).unwrap();

        assert_eq!(first_conflict(&existing, &candidate, None), Some(existing[0].trip_id));
        assert_eq!(first_conflict(&existing, &candidate, Some(existing[0].trip_id)), None);
    }

    #[test]
    fn test_overnight_assignment_blocks_early_morning() {
        let existing = vec![assignment(1, 23, 2)];
        let early = TripWindow::of(&assignment(2, 1, 5).schedule).unwrap();
        assert!(first_conflict(&existing, &early, None).is_some());
    }

    #[test]
    fn test_merge_deduplicates_tokens() {
        let a = Recipients {
            driver: vec![DeviceToken::new("driver-old-token".into())],
            passengers: vec![DeviceToken::new("passenger-token".into())],
        };
        let b = Recipients {
            driver: vec![DeviceToken::new("driver-new-token".into())],
            passengers: vec![DeviceToken::new("passenger-token".into())],
        };
        assert_eq!(a.merge(b).into_tokens().len(), 3);
    }
}
