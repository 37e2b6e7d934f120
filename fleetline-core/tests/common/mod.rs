#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use fleetline_core::notify::{NotificationSink, NotifyError};
use fleetline_core::repository::{
    AssignmentWindow, LedgerResult, Recipients, StatusChange, TripLedger, TripSnapshot,
};
use fleetline_core::{
    ConflictChecker, InMemoryLedger, ManualClock, SchedulingRules, StatusReconciler, TripRequest,
    TripScheduler,
};
use fleetline_shared::{
    Resource, ResourceKind, Trip, TripNotification, TripSchedule, TripStatus,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<TripNotification>>,
    pub fail: bool,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: &TripNotification) -> Result<(), NotifyError> {
        self.sent.lock().await.push(notification.clone());
        if self.fail {
            return Err(NotifyError::Delivery("gateway unreachable".into()));
        }
        Ok(())
    }
}

/// Ledger that lets a test slip a reconciler status write in right before
/// the scheduler's next trip write, as if the two had raced.
pub struct InterleavingLedger {
    inner: Arc<InMemoryLedger>,
    staged: Mutex<Option<StatusChange>>,
}

impl InterleavingLedger {
    pub fn new(inner: Arc<InMemoryLedger>) -> Self {
        Self {
            inner,
            staged: Mutex::new(None),
        }
    }

    pub async fn land_before_next_write(&self, change: StatusChange) {
        *self.staged.lock().await = Some(change);
    }

    async fn land_staged(&self) -> LedgerResult<()> {
        if let Some(change) = self.staged.lock().await.take() {
            self.inner.apply_status_changes(&[change]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TripLedger for InterleavingLedger {
    async fn get_trip(&self, id: Uuid) -> LedgerResult<Option<Trip>> {
        self.inner.get_trip(id).await
    }

    async fn get_resource(&self, kind: ResourceKind, id: Uuid) -> LedgerResult<Option<Resource>> {
        self.inner.get_resource(kind, id).await
    }

    async fn list_resources(&self, kind: ResourceKind, manager_id: Uuid) -> LedgerResult<Vec<Resource>> {
        self.inner.list_resources(kind, manager_id).await
    }

    async fn assignments_between(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<AssignmentWindow>> {
        self.inner.assignments_between(kind, resource_id, from, to).await
    }

    async fn reconciliation_snapshot(&self) -> LedgerResult<Vec<TripSnapshot>> {
        self.inner.reconciliation_snapshot().await
    }

    async fn apply_status_changes(&self, changes: &[StatusChange]) -> LedgerResult<usize> {
        self.inner.apply_status_changes(changes).await
    }

    async fn insert_trip(&self, trip: &Trip) -> LedgerResult<()> {
        self.land_staged().await?;
        self.inner.insert_trip(trip).await
    }

    async fn replace_trip(&self, trip: &Trip) -> LedgerResult<()> {
        self.land_staged().await?;
        self.inner.replace_trip(trip).await
    }

    async fn set_trip_status(&self, trip_id: Uuid, from: TripStatus, to: TripStatus) -> LedgerResult<bool> {
        self.land_staged().await?;
        self.inner.set_trip_status(trip_id, from, to).await
    }

    async fn set_resource_archived(&self, kind: ResourceKind, id: Uuid, archived: bool) -> LedgerResult<()> {
        self.inner.set_resource_archived(kind, id, archived).await
    }

    async fn notification_recipients(&self, trip_id: Uuid) -> LedgerResult<Recipients> {
        self.inner.notification_recipients(trip_id).await
    }
}

pub struct Engine {
    pub ledger: Arc<InMemoryLedger>,
    /// What the scheduler writes through
    pub interleaving: Arc<InterleavingLedger>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
    pub scheduler: Arc<TripScheduler>,
    pub reconciler: StatusReconciler,
    pub manager: Uuid,
    pub driver: Uuid,
    pub bus: Uuid,
}

impl Engine {
    pub async fn new(now: NaiveDateTime) -> Self {
        Self::with_sink(now, RecordingSink::default()).await
    }

    pub async fn with_sink(now: NaiveDateTime, sink: RecordingSink) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let interleaving = Arc::new(InterleavingLedger::new(ledger.clone()));
        let clock = Arc::new(ManualClock::new(now));
        let sink = Arc::new(sink);
        let rules = SchedulingRules::default();

        let checker = Arc::new(ConflictChecker::new(interleaving.clone(), clock.clone(), rules));
        let scheduler = Arc::new(TripScheduler::new(
            interleaving.clone(),
            checker,
            sink.clone(),
            clock.clone(),
        ));
        let reconciler = StatusReconciler::new(ledger.clone(), clock.clone(), rules);

        let manager = Uuid::new_v4();
        let driver = ledger.add_resource(Resource::driver(manager, "Dana")).await;
        let bus = ledger.add_resource(Resource::bus(manager, "AB-100", 40)).await;
        ledger.set_driver_token(driver, "driver-device-token-0001").await;

        Self {
            ledger,
            interleaving,
            clock,
            sink,
            scheduler,
            reconciler,
            manager,
            driver,
            bus,
        }
    }

    pub fn request(&self, schedule: TripSchedule) -> TripRequest {
        TripRequest {
            manager_id: self.manager,
            schedule,
            seat_price_cents: 2500,
            departure_location: "Amman".into(),
            destination_location: "Irbid".into(),
            departure_coords: None,
            stops: vec![],
            driver_id: self.driver,
            bus_id: self.bus,
        }
    }
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

pub fn schedule(y: i32, mo: u32, d: u32, dep: (u32, u32), ret: (u32, u32)) -> TripSchedule {
    TripSchedule::new(
        NaiveDate::from_ymd_opt(y, mo, d).unwrap(),
        NaiveTime::from_hms_opt(dep.0, dep.1, 0).unwrap(),
        NaiveTime::from_hms_opt(ret.0, ret.1, 0).unwrap(),
    )
}
