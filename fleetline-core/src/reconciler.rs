use chrono::{Duration, NaiveDateTime};
use fleetline_shared::TripStatus;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::repository::{StatusChange, TripLedger, TripSnapshot};
use crate::schedule::{SchedulingRules, TripWindow};
use crate::{CoreError, CoreResult};

/// Status a trip should hold at `now`.
///
/// Complete and Cancelled are returned unchanged. Otherwise the rules apply
/// in precedence order: ended → Complete, running → Active, booked to
/// capacity → Full, unbooked and departing within `grace` → Cancelled,
/// else Pending. Only the sticky guard looks at `current`.
pub fn derive_status(
    current: TripStatus,
    window: &TripWindow,
    booked_seats: u32,
    bus_capacity: Option<u32>,
    now: NaiveDateTime,
    grace: Duration,
) -> TripStatus {
    if current.is_sticky() {
        return current;
    }

    if now >= window.end {
        return TripStatus::Complete;
    }

    if window.start <= now {
        return TripStatus::Active;
    }

    let mut status = TripStatus::Pending;

    if bus_capacity.is_some_and(|capacity| booked_seats >= capacity) {
        status = TripStatus::Full;
    }

    if booked_seats == 0 && window.start <= now + grace {
        status = TripStatus::Cancelled;
    }

    status
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub evaluated_at: NaiveDateTime,
    pub examined: usize,
    /// Changes the pass decided on
    pub changes: Vec<StatusChange>,
    /// Changes that landed; a concurrent override can make this smaller
    pub applied: usize,
}

/// Re-derives every non-sticky trip's status from the clock and bookings.
pub struct StatusReconciler {
    ledger: Arc<dyn TripLedger>,
    clock: Arc<dyn Clock>,
    rules: SchedulingRules,
}

impl StatusReconciler {
    pub fn new(ledger: Arc<dyn TripLedger>, clock: Arc<dyn Clock>, rules: SchedulingRules) -> Self {
        Self {
            ledger,
            clock,
            rules,
        }
    }

    /// One full pass: read, decide, write the changed statuses as one batch.
    pub async fn reconcile_now(&self) -> CoreResult<ReconcileReport> {
        let now = self.clock.now();

        let snapshot = self
            .ledger
            .reconciliation_snapshot()
            .await
            .map_err(|e| CoreError::PartialReconciliationFailure(format!("reading trips: {}", e)))?;

        let changes = plan_changes(&snapshot, now, self.rules.grace_window);

        let applied = if changes.is_empty() {
            0
        } else {
            self.ledger
                .apply_status_changes(&changes)
                .await
                .map_err(|e| CoreError::PartialReconciliationFailure(format!("writing statuses: {}", e)))?
        };

        if applied < changes.len() {
            debug!(
                skipped = changes.len() - applied,
                "some trips changed status during the pass and were left alone"
            );
        }

        info!(
            evaluated_at = %now,
            examined = snapshot.len(),
            changed = applied,
            "status reconciliation pass finished"
        );

        Ok(ReconcileReport {
            evaluated_at: now,
            examined: snapshot.len(),
            changes,
            applied,
        })
    }
}

/// Decisions for one pass, all against the same `now`.
pub fn plan_changes(snapshot: &[TripSnapshot], now: NaiveDateTime, grace: Duration) -> Vec<StatusChange> {
    snapshot
        .iter()
        .filter_map(|trip| {
            let window = match TripWindow::of(&trip.schedule) {
                Ok(window) => window,
                Err(e) => {
                    warn!(trip_id = %trip.trip_id, error = %e, "skipping trip with unusable schedule");
                    return None;
                }
            };

            let target = derive_status(
                trip.status,
                &window,
                trip.booked_seats,
                trip.bus_capacity,
                now,
                grace,
            );

            (target != trip.status).then(|| {
                debug!(trip_id = %trip.trip_id, from = %trip.status, to = %target, "status change");
                StatusChange {
                    trip_id: trip.trip_id,
                    from: trip.status,
                    to: target,
                }
            })
        })
        .collect()
}
