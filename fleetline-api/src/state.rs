use fleetline_core::{ConflictChecker, StatusReconciler, TripScheduler};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub checker: Arc<ConflictChecker>,
    pub scheduler: Arc<TripScheduler>,
    pub reconciler: Arc<StatusReconciler>,
}
