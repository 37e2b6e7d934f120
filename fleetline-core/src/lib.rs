pub mod availability;
pub mod clock;
pub mod locks;
pub mod memory;
pub mod notify;
pub mod reconciler;
pub mod repository;
pub mod schedule;
pub mod scheduler;

use fleetline_shared::{ResourceKind, TripStatus};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::repository::LedgerError;
use crate::schedule::ScheduleError;

pub use availability::{Availability, ConflictChecker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::InMemoryLedger;
pub use notify::{NotificationSink, NotifyError, TracingSink};
pub use reconciler::{derive_status, ReconcileReport, StatusReconciler};
pub use repository::TripLedger;
pub use schedule::{SchedulingRules, TripWindow};
pub use scheduler::{TripRequest, TripScheduler};

/// Why a driver or bus cannot take a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnavailableReason {
    AlreadyAssigned { trip_id: Uuid },
    Archived,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::AlreadyAssigned { trip_id } => {
                write!(f, "already assigned to trip {}", trip_id)
            }
            UnavailableReason::Archived => f.write_str("archived"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid trip interval: {0}")]
    InvalidInterval(String),
    #[error("{kind} {resource_id} is unavailable: {reason}")]
    ResourceUnavailable {
        kind: ResourceKind,
        resource_id: Uuid,
        reason: UnavailableReason,
    },
    #[error("{kind} {resource_id} not found")]
    ResourceNotFound { kind: ResourceKind, resource_id: Uuid },
    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),
    #[error("Trip {trip_id} is {status} and can no longer be edited")]
    TripLocked { trip_id: Uuid, status: TripStatus },
    #[error("{kind} {resource_id} is still assigned to {upcoming} upcoming trip(s)")]
    ResourceInUse {
        kind: ResourceKind,
        resource_id: Uuid,
        upcoming: usize,
    },
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: TripStatus, to: TripStatus },
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("Reconciliation pass failed: {0}")]
    PartialReconciliationFailure(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<ScheduleError> for CoreError {
    fn from(err: ScheduleError) -> Self {
        CoreError::InvalidInterval(err.to_string())
    }
}

impl From<LedgerError> for CoreError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Conflict {
                kind,
                resource_id,
                trip_id,
            } => CoreError::ResourceUnavailable {
                kind,
                resource_id,
                reason: UnavailableReason::AlreadyAssigned { trip_id },
            },
            LedgerError::TripNotFound(id) => CoreError::TripNotFound(id),
            LedgerError::ResourceNotFound { kind, resource_id } => {
                CoreError::ResourceNotFound { kind, resource_id }
            }
            LedgerError::Locked { trip_id, status } => CoreError::TripLocked { trip_id, status },
            other => CoreError::PersistenceFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_messages_name_the_cause() {
        let id = Uuid::new_v4();
        let trip_id = Uuid::new_v4();
        let assigned = CoreError::ResourceUnavailable {
            kind: ResourceKind::Driver,
            resource_id: id,
            reason: UnavailableReason::AlreadyAssigned { trip_id },
        };
        assert_eq!(
            assigned.to_string(),
            format!("driver {} is unavailable: already assigned to trip {}", id, trip_id)
        );

        let archived = CoreError::ResourceUnavailable {
            kind: ResourceKind::Bus,
            resource_id: id,
            reason: UnavailableReason::Archived,
        };
        assert!(archived.to_string().ends_with("archived"));
    }

    #[test]
    fn test_ledger_conflict_maps_to_unavailable() {
        let err: CoreError = LedgerError::Conflict {
            kind: ResourceKind::Bus,
            resource_id: Uuid::new_v4(),
            trip_id: Uuid::new_v4(),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::ResourceUnavailable {
                reason: UnavailableReason::AlreadyAssigned { .. },
                ..
            }
        ));

        let err: CoreError = LedgerError::Timeout.into();
        assert!(matches!(err, CoreError::PersistenceFailure(_)));
    }

    #[test]
    fn test_ledger_lock_maps_to_trip_locked() {
        let trip_id = Uuid::new_v4();
        let err: CoreError = LedgerError::Locked {
            trip_id,
            status: TripStatus::Complete,
        }
        .into();
        assert!(matches!(
            err,
            CoreError::TripLocked { trip_id: id, status: TripStatus::Complete } if id == trip_id
        ));
    }
}
