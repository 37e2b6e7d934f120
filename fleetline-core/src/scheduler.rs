use chrono::{NaiveDate, Utc};
use fleetline_shared::{
    Assignment, Resource, ResourceKind, Trip, TripNotification, TripSchedule, TripStatus, TripStop,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability::ConflictChecker;
use crate::clock::Clock;
use crate::locks::{LockKey, ResourceLocks};
use crate::notify::{self, NotificationSink};
use crate::repository::{Recipients, TripLedger};
use crate::schedule::TripWindow;
use crate::{CoreError, CoreResult};

const CANCEL_ATTEMPTS: usize = 3;

/// What a manager submits when scheduling or editing a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRequest {
    pub manager_id: Uuid,
    #[serde(flatten)]
    pub schedule: TripSchedule,
    pub seat_price_cents: i64,
    pub departure_location: String,
    pub destination_location: String,
    #[serde(default)]
    pub departure_coords: Option<String>,
    #[serde(default)]
    pub stops: Vec<TripStop>,
    pub driver_id: Uuid,
    pub bus_id: Uuid,
}

impl TripRequest {
    pub fn assignment(&self) -> Assignment {
        Assignment::new(self.driver_id, self.bus_id)
    }

    fn apply_to(&self, trip: &mut Trip) {
        trip.schedule = self.schedule;
        trip.seat_price_cents = self.seat_price_cents;
        trip.departure_location = self.departure_location.clone();
        trip.destination_location = self.destination_location.clone();
        trip.departure_coords = self.departure_coords.clone();
        trip.stops = self.stops.clone();
        trip.assignment = self.assignment();
    }
}

/// Trip create/edit and the manager overrides.
///
/// Every check-then-write sequence runs while holding the keyed locks of
/// the trip and of the driver and bus it touches, so two overlapping
/// requests for one resource cannot both pass the checker. The ledger
/// repeats the overlap check inside its own atomic write for requests
/// coming from other processes.
pub struct TripScheduler {
    ledger: Arc<dyn TripLedger>,
    checker: Arc<ConflictChecker>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    locks: ResourceLocks,
}

impl TripScheduler {
    pub fn new(
        ledger: Arc<dyn TripLedger>,
        checker: Arc<ConflictChecker>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            checker,
            notifier,
            clock,
            locks: ResourceLocks::new(),
        }
    }

    pub fn checker(&self) -> &ConflictChecker {
        &self.checker
    }

    /// Creates a Pending trip together with its assignment and stops.
    pub async fn schedule_trip(&self, request: TripRequest) -> CoreResult<Trip> {
        let window = TripWindow::of(&request.schedule)?;
        let assignment = request.assignment();

        let held = self.locks.acquire(LockKey::for_assignment(&assignment)).await;

        for kind in ResourceKind::ALL {
            let resource_id = assignment.resource_id(kind);
            self.checker
                .check(kind, resource_id, request.manager_id, &window, None)
                .await?
                .into_result(kind, resource_id)?;
        }

        let mut trip = Trip::new(request.manager_id, request.schedule, assignment);
        request.apply_to(&mut trip);
        self.ledger.insert_trip(&trip).await?;

        drop(held);
        self.locks.prune();

        info!(
            trip_id = %trip.id,
            manager_id = %trip.manager_id,
            driver_id = %assignment.driver_id,
            bus_id = %assignment.bus_id,
            start = %window.start,
            end = %window.end,
            "trip scheduled"
        );
        Ok(trip)
    }

    /// Replaces schedule, resources and stops of a trip that is not yet
    /// Complete or Cancelled. Status is left for the reconciler.
    pub async fn update_trip(&self, trip_id: Uuid, request: TripRequest) -> CoreResult<Trip> {
        let window = TripWindow::of(&request.schedule)?;
        let assignment = request.assignment();

        let trip_lock = self.locks.acquire([LockKey::Trip(trip_id)]).await;
        let existing = self.load_trip(trip_id, Some(request.manager_id)).await?;
        if existing.status.is_sticky() {
            return Err(CoreError::TripLocked {
                trip_id,
                status: existing.status,
            });
        }

        let resource_locks = self.locks.acquire(LockKey::for_assignment(&assignment)).await;

        for kind in ResourceKind::ALL {
            let resource_id = assignment.resource_id(kind);
            let availability = if existing.assignment.resource_id(kind) == resource_id {
                self.checker
                    .check_retained(kind, resource_id, request.manager_id, &window, trip_id)
                    .await?
            } else {
                self.checker
                    .check(kind, resource_id, request.manager_id, &window, Some(trip_id))
                    .await?
            };
            availability.into_result(kind, resource_id)?;
        }

        let previous_recipients = if existing.assignment != assignment {
            self.recipients(trip_id).await
        } else {
            Recipients::default()
        };

        let mut trip = existing.clone();
        request.apply_to(&mut trip);
        trip.updated_at = Utc::now();
        // Fails with TripLocked if the reconciler finished the trip since
        // `existing` was read; otherwise the stored status is kept.
        self.ledger.replace_trip(&trip).await?;
        if let Some(stored) = self.ledger.get_trip(trip_id).await? {
            trip.status = stored.status;
        }

        drop(resource_locks);
        drop(trip_lock);
        self.locks.prune();

        info!(trip_id = %trip.id, start = %window.start, end = %window.end, "trip updated");

        if existing.assignment != assignment {
            info!(
                trip_id = %trip.id,
                driver_id = %assignment.driver_id,
                bus_id = %assignment.bus_id,
                "trip resources changed"
            );
            let tokens = previous_recipients
                .merge(self.recipients(trip_id).await)
                .into_tokens();
            notify::dispatch(self.notifier.as_ref(), &TripNotification::reassigned(&trip, tokens)).await;
        }

        Ok(trip)
    }

    /// Manager override: Cancelled immediately, sticky until reactivated.
    ///
    /// The write only lands on the status that was read. The reconciler may
    /// move a live trip between Pending, Full and Active in the meantime, in
    /// which case the trip is re-read and the cancel retried; a trip that
    /// reached Complete stays Complete.
    pub async fn cancel_trip(&self, trip_id: Uuid, manager_id: Option<Uuid>) -> CoreResult<Trip> {
        let lock = self.locks.acquire([LockKey::Trip(trip_id)]).await;

        let mut attempts = 0;
        let (mut trip, previous) = loop {
            let trip = self.load_trip(trip_id, manager_id).await?;
            match trip.status {
                TripStatus::Cancelled => return Ok(trip),
                TripStatus::Complete => {
                    return Err(CoreError::InvalidTransition {
                        from: TripStatus::Complete,
                        to: TripStatus::Cancelled,
                    })
                }
                _ => {}
            }

            let previous = trip.status;
            if self
                .ledger
                .set_trip_status(trip_id, previous, TripStatus::Cancelled)
                .await?
            {
                break (trip, previous);
            }

            attempts += 1;
            if attempts >= CANCEL_ATTEMPTS {
                warn!(%trip_id, attempts, "trip status kept moving under cancel");
                return Err(CoreError::InvalidTransition {
                    from: previous,
                    to: TripStatus::Cancelled,
                });
            }
        };
        trip.update_status(TripStatus::Cancelled);

        drop(lock);
        self.locks.prune();

        info!(trip_id = %trip_id, from = %previous, "trip cancelled by manager");

        let tokens = self.recipients(trip_id).await.into_tokens();
        notify::dispatch(self.notifier.as_ref(), &TripNotification::cancelled(&trip, tokens)).await;

        Ok(trip)
    }

    /// Manager override: clears a cancellation. The next reconciliation
    /// pass works out the trip's real status.
    pub async fn reactivate_trip(&self, trip_id: Uuid, manager_id: Option<Uuid>) -> CoreResult<Trip> {
        let lock = self.locks.acquire([LockKey::Trip(trip_id)]).await;
        let mut trip = self.load_trip(trip_id, manager_id).await?;

        if trip.status != TripStatus::Cancelled {
            return Err(CoreError::InvalidTransition {
                from: trip.status,
                to: TripStatus::Pending,
            });
        }

        if !self
            .ledger
            .set_trip_status(trip_id, TripStatus::Cancelled, TripStatus::Pending)
            .await?
        {
            let current = self.load_trip(trip_id, manager_id).await?;
            return Err(CoreError::InvalidTransition {
                from: current.status,
                to: TripStatus::Pending,
            });
        }
        trip.update_status(TripStatus::Pending);

        drop(lock);
        self.locks.prune();

        info!(trip_id = %trip_id, "trip reactivated by manager");

        let tokens = self.recipients(trip_id).await.into_tokens();
        notify::dispatch(self.notifier.as_ref(), &TripNotification::reactivated(&trip, tokens)).await;

        Ok(trip)
    }

    /// Soft-deletes a driver or bus so it is refused for new assignments.
    ///
    /// A resource still assigned to a trip that has not ended is refused
    /// with [`CoreError::ResourceInUse`] unless `force` is set; forced
    /// archives leave those trips holding the resource.
    pub async fn archive_resource(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        manager_id: Uuid,
        force: bool,
    ) -> CoreResult<Resource> {
        let lock = self
            .locks
            .acquire([LockKey::Resource(kind, resource_id)])
            .await;

        let mut resource = match self.ledger.get_resource(kind, resource_id).await? {
            Some(resource) if resource.manager_id == manager_id => resource,
            _ => return Err(CoreError::ResourceNotFound { kind, resource_id }),
        };
        if resource.archived {
            return Ok(resource);
        }

        let upcoming = self.upcoming_assignments(kind, resource_id).await?;
        if upcoming > 0 && !force {
            return Err(CoreError::ResourceInUse {
                kind,
                resource_id,
                upcoming,
            });
        }

        self.ledger.set_resource_archived(kind, resource_id, true).await?;
        resource.archived = true;

        drop(lock);
        self.locks.prune();

        if upcoming > 0 {
            warn!(%kind, %resource_id, upcoming, "archived resource still holds upcoming trips");
        }
        info!(%kind, %resource_id, "resource archived");

        Ok(resource)
    }

    /// Trips holding the resource whose window has not ended yet.
    async fn upcoming_assignments(&self, kind: ResourceKind, resource_id: Uuid) -> CoreResult<usize> {
        let now = self.clock.now();
        // Overnight trips from yesterday can still be running.
        let from = now.date().pred_opt().unwrap_or(now.date());
        Ok(self
            .ledger
            .assignments_between(kind, resource_id, from, NaiveDate::MAX)
            .await?
            .iter()
            .filter(|a| TripWindow::of(&a.schedule).map(|w| w.end > now).unwrap_or(false))
            .count())
    }

    async fn load_trip(&self, trip_id: Uuid, manager_id: Option<Uuid>) -> CoreResult<Trip> {
        match self.ledger.get_trip(trip_id).await? {
            Some(trip) if manager_id.map_or(true, |m| m == trip.manager_id) => Ok(trip),
            _ => Err(CoreError::TripNotFound(trip_id)),
        }
    }

    async fn recipients(&self, trip_id: Uuid) -> Recipients {
        match self.ledger.notification_recipients(trip_id).await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(%trip_id, error = %e, "could not load notification recipients");
                Recipients::default()
            }
        }
    }
}
