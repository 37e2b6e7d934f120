use async_trait::async_trait;
use chrono::NaiveDate;
use fleetline_shared::{Booking, DeviceToken, Resource, ResourceKind, Trip, TripStatus};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::repository::{
    first_conflict, AssignmentWindow, LedgerError, LedgerResult, Recipients, StatusChange,
    TripLedger, TripSnapshot,
};
use crate::schedule::TripWindow;

#[derive(Default)]
struct LedgerState {
    trips: HashMap<Uuid, Trip>,
    resources: HashMap<(ResourceKind, Uuid), Resource>,
    bookings: Vec<Booking>,
    driver_tokens: HashMap<Uuid, DeviceToken>,
    fail_writes: bool,
}

impl LedgerState {
    fn assignments(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<AssignmentWindow> {
        self.trips
            .values()
            .filter(|t| t.status != TripStatus::Cancelled)
            .filter(|t| t.assignment.resource_id(kind) == resource_id)
            .filter(|t| t.schedule.date >= from && t.schedule.date <= to)
            .map(|t| AssignmentWindow {
                trip_id: t.id,
                schedule: t.schedule,
            })
            .collect()
    }

    fn booked_seats(&self, trip_id: Uuid) -> u32 {
        self.bookings.iter().filter(|b| b.trip_id == trip_id).count() as u32
    }

    fn ensure_writable(&self) -> LedgerResult<()> {
        if self.fail_writes {
            return Err(LedgerError::Storage("write rejected by test ledger".to_string()));
        }
        Ok(())
    }

    // Same re-check a relational ledger runs under its advisory locks.
    fn ensure_free(&self, trip: &Trip) -> LedgerResult<()> {
        let window = TripWindow::of(&trip.schedule)
            .map_err(|e| LedgerError::Storage(format!("refusing to store trip {}: {}", trip.id, e)))?;
        let (from, to) = window.candidate_dates();

        for kind in ResourceKind::ALL {
            let resource_id = trip.assignment.resource_id(kind);
            let held = self.assignments(kind, resource_id, from, to);
            if let Some(trip_id) = first_conflict(&held, &window, Some(trip.id)) {
                return Err(LedgerError::Conflict {
                    kind,
                    resource_id,
                    trip_id,
                });
            }
        }
        Ok(())
    }
}

/// Ledger kept in process memory behind one mutex.
///
/// Implements the full [`TripLedger`] contract and is what the engine's
/// tests run against; it also backs local demos that have no database.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_resource(&self, resource: Resource) -> Uuid {
        let id = resource.id;
        self.state
            .lock()
            .await
            .resources
            .insert((resource.kind, id), resource);
        id
    }

    pub async fn set_driver_token(&self, driver_id: Uuid, token: impl Into<String>) {
        self.state
            .lock()
            .await
            .driver_tokens
            .insert(driver_id, DeviceToken::new(token.into()));
    }

    /// Seeds a trip as-is, skipping overlap checks.
    pub async fn add_trip(&self, trip: Trip) -> Uuid {
        let id = trip.id;
        self.state.lock().await.trips.insert(id, trip);
        id
    }

    pub async fn add_booking(&self, booking: Booking) {
        self.state.lock().await.bookings.push(booking);
    }

    pub async fn trip_status(&self, trip_id: Uuid) -> Option<TripStatus> {
        self.state.lock().await.trips.get(&trip_id).map(|t| t.status)
    }

    pub async fn statuses(&self) -> HashMap<Uuid, TripStatus> {
        self.state
            .lock()
            .await
            .trips
            .values()
            .map(|t| (t.id, t.status))
            .collect()
    }

    pub async fn trips(&self) -> Vec<Trip> {
        self.state.lock().await.trips.values().cloned().collect()
    }

    /// Makes every subsequent write fail with a storage error.
    pub async fn fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }
}

#[async_trait]
impl TripLedger for InMemoryLedger {
    async fn get_trip(&self, id: Uuid) -> LedgerResult<Option<Trip>> {
        Ok(self.state.lock().await.trips.get(&id).cloned())
    }

    async fn get_resource(&self, kind: ResourceKind, id: Uuid) -> LedgerResult<Option<Resource>> {
        Ok(self.state.lock().await.resources.get(&(kind, id)).cloned())
    }

    async fn list_resources(&self, kind: ResourceKind, manager_id: Uuid) -> LedgerResult<Vec<Resource>> {
        let state = self.state.lock().await;
        let mut resources: Vec<Resource> = state
            .resources
            .values()
            .filter(|r| r.kind == kind && r.manager_id == manager_id)
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(resources)
    }

    async fn assignments_between(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<AssignmentWindow>> {
        Ok(self.state.lock().await.assignments(kind, resource_id, from, to))
    }

    async fn reconciliation_snapshot(&self) -> LedgerResult<Vec<TripSnapshot>> {
        let state = self.state.lock().await;
        Ok(state
            .trips
            .values()
            .filter(|t| !t.status.is_sticky())
            .map(|t| TripSnapshot {
                trip_id: t.id,
                status: t.status,
                schedule: t.schedule,
                booked_seats: state.booked_seats(t.id),
                bus_capacity: state
                    .resources
                    .get(&(ResourceKind::Bus, t.assignment.bus_id))
                    .and_then(|bus| bus.capacity),
            })
            .collect())
    }

    async fn apply_status_changes(&self, changes: &[StatusChange]) -> LedgerResult<usize> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;

        let mut applied = 0;
        for change in changes {
            if let Some(trip) = state.trips.get_mut(&change.trip_id) {
                if trip.status == change.from {
                    trip.update_status(change.to);
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    async fn insert_trip(&self, trip: &Trip) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;
        state.ensure_free(trip)?;
        state.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn replace_trip(&self, trip: &Trip) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;
        let stored = state
            .trips
            .get(&trip.id)
            .map(|t| t.status)
            .ok_or(LedgerError::TripNotFound(trip.id))?;
        if stored.is_sticky() {
            return Err(LedgerError::Locked {
                trip_id: trip.id,
                status: stored,
            });
        }
        state.ensure_free(trip)?;

        let mut replacement = trip.clone();
        replacement.status = stored;
        state.trips.insert(trip.id, replacement);
        Ok(())
    }

    async fn set_trip_status(&self, trip_id: Uuid, from: TripStatus, to: TripStatus) -> LedgerResult<bool> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;
        let trip = state
            .trips
            .get_mut(&trip_id)
            .ok_or(LedgerError::TripNotFound(trip_id))?;
        if trip.status != from {
            return Ok(false);
        }
        trip.update_status(to);
        Ok(true)
    }

    async fn set_resource_archived(&self, kind: ResourceKind, id: Uuid, archived: bool) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;
        let resource = state
            .resources
            .get_mut(&(kind, id))
            .ok_or(LedgerError::ResourceNotFound {
                kind,
                resource_id: id,
            })?;
        resource.archived = archived;
        Ok(())
    }

    async fn notification_recipients(&self, trip_id: Uuid) -> LedgerResult<Recipients> {
        let state = self.state.lock().await;
        let trip = state
            .trips
            .get(&trip_id)
            .ok_or(LedgerError::TripNotFound(trip_id))?;

        let driver = state
            .driver_tokens
            .get(&trip.assignment.driver_id)
            .cloned()
            .into_iter()
            .collect();
        let passengers = state
            .bookings
            .iter()
            .filter(|b| b.trip_id == trip_id)
            .filter_map(|b| b.device_token.clone())
            .collect();

        Ok(Recipients { driver, passengers })
    }
}
