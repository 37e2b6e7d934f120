use chrono::NaiveDateTime;
use fleetline_shared::{Resource, ResourceKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::repository::{first_conflict, TripLedger};
use crate::schedule::{SchedulingRules, TripWindow};
use crate::{CoreError, CoreResult, UnavailableReason};

/// Outcome of an availability check for one driver or bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available,
    AlreadyAssigned { trip_id: Uuid },
    Archived,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    /// Turns a negative answer into the error handed back to callers.
    pub fn into_result(self, kind: ResourceKind, resource_id: Uuid) -> CoreResult<()> {
        let reason = match self {
            Availability::Available => return Ok(()),
            Availability::AlreadyAssigned { trip_id } => UnavailableReason::AlreadyAssigned { trip_id },
            Availability::Archived => UnavailableReason::Archived,
        };
        Err(CoreError::ResourceUnavailable {
            kind,
            resource_id,
            reason,
        })
    }
}

/// Answers "is resource R free during `[a, b)`?" against the ledger.
///
/// Drivers and buses share one code path; the kind only selects which side
/// of the assignment is compared. Pure read, no side effects.
pub struct ConflictChecker {
    ledger: Arc<dyn TripLedger>,
    clock: Arc<dyn Clock>,
    rules: SchedulingRules,
}

impl ConflictChecker {
    pub fn new(ledger: Arc<dyn TripLedger>, clock: Arc<dyn Clock>, rules: SchedulingRules) -> Self {
        Self {
            ledger,
            clock,
            rules,
        }
    }

    /// Full check. With no `exclude_trip_id` the window is treated as a new
    /// trip and must respect the lead time.
    pub async fn check(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        manager_id: Uuid,
        window: &TripWindow,
        exclude_trip_id: Option<Uuid>,
    ) -> CoreResult<Availability> {
        if exclude_trip_id.is_none() {
            window.check_lead_time(self.clock.now(), self.rules.lead_time)?;
        }

        let resource = self.owned_resource(kind, resource_id, manager_id).await?;
        if resource.archived {
            debug!(%kind, %resource_id, "resource archived");
            return Ok(Availability::Archived);
        }

        self.overlap_check(kind, resource_id, window, exclude_trip_id).await
    }

    pub async fn is_available(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        manager_id: Uuid,
        window: &TripWindow,
        exclude_trip_id: Option<Uuid>,
    ) -> CoreResult<bool> {
        Ok(self
            .check(kind, resource_id, manager_id, window, exclude_trip_id)
            .await?
            .is_available())
    }

    /// Check for a resource a trip already holds. Archiving after the fact
    /// does not revoke an existing assignment, so only overlaps count.
    pub async fn check_retained(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        manager_id: Uuid,
        window: &TripWindow,
        trip_id: Uuid,
    ) -> CoreResult<Availability> {
        self.owned_resource(kind, resource_id, manager_id).await?;
        self.overlap_check(kind, resource_id, window, Some(trip_id)).await
    }

    /// Every non-archived resource of the manager that is free for `window`.
    pub async fn available_resources(
        &self,
        kind: ResourceKind,
        manager_id: Uuid,
        window: &TripWindow,
        exclude_trip_id: Option<Uuid>,
    ) -> CoreResult<Vec<Resource>> {
        if exclude_trip_id.is_none() {
            window.check_lead_time(self.clock.now(), self.rules.lead_time)?;
        }

        let mut free = Vec::new();
        for resource in self.ledger.list_resources(kind, manager_id).await? {
            if resource.archived {
                continue;
            }
            let availability = self
                .overlap_check(kind, resource.id, window, exclude_trip_id)
                .await?;
            if availability.is_available() {
                free.push(resource);
            }
        }
        Ok(free)
    }

    /// The trip occupying the resource at `instant`, if any.
    pub async fn occupied_at(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        instant: NaiveDateTime,
    ) -> CoreResult<Option<Uuid>> {
        let day = instant.date();
        let from = day.pred_opt().unwrap_or(day);
        let held = self
            .ledger
            .assignments_between(kind, resource_id, from, day)
            .await?;

        Ok(held
            .into_iter()
            .find(|a| {
                TripWindow::of(&a.schedule)
                    .map(|w| w.contains(instant))
                    .unwrap_or(false)
            })
            .map(|a| a.trip_id))
    }

    async fn owned_resource(&self, kind: ResourceKind, resource_id: Uuid, manager_id: Uuid) -> CoreResult<Resource> {
        match self.ledger.get_resource(kind, resource_id).await? {
            Some(resource) if resource.manager_id == manager_id => Ok(resource),
            _ => Err(CoreError::ResourceNotFound { kind, resource_id }),
        }
    }

    async fn overlap_check(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        window: &TripWindow,
        exclude_trip_id: Option<Uuid>,
    ) -> CoreResult<Availability> {
        let (from, to) = window.candidate_dates();
        let held = self
            .ledger
            .assignments_between(kind, resource_id, from, to)
            .await?;

        Ok(match first_conflict(&held, window, exclude_trip_id) {
            Some(trip_id) => {
                debug!(%kind, %resource_id, %trip_id, "resource already assigned");
                Availability::AlreadyAssigned { trip_id }
            }
            None => Availability::Available,
        })
    }
}
