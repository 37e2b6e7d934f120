use fleetline_core::{ReconcileReport, StatusReconciler};
use fleetline_store::RedisClient;
use std::sync::Arc;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const LEASE_NAME: &str = "status-reconciler";

/// Lease key and TTL for the reconcile cycle containing `epoch_seconds`.
///
/// Each cycle of length `every` gets its own key, so a lease taken in one
/// cycle never blocks the next tick, and replicas ticking within the same
/// cycle compete for one key. The TTL only has to outlive that cycle.
pub fn cycle_lease(name: &str, epoch_seconds: i64, every: Duration) -> (String, u64) {
    let period = every.as_secs().max(1);
    let cycle = epoch_seconds.max(0) as u64 / period;
    (format!("{}:{}", name, cycle), period)
}

/// What one tick of the reconciler worker did.
#[derive(Debug)]
pub enum PassOutcome {
    Completed(ReconcileReport),
    /// Another replica holds this cycle's lease
    Skipped,
    Failed,
    TimedOut,
}

pub struct ReconcileWorker {
    reconciler: Arc<StatusReconciler>,
    lease: Option<Arc<RedisClient>>,
    holder: String,
    every: Duration,
    pass_timeout: Duration,
}

impl ReconcileWorker {
    pub fn new(
        reconciler: Arc<StatusReconciler>,
        lease: Option<Arc<RedisClient>>,
        every: Duration,
        pass_timeout: Duration,
    ) -> Self {
        Self {
            reconciler,
            lease,
            holder: uuid::Uuid::new_v4().to_string(),
            every,
            pass_timeout,
        }
    }

    /// Ticks forever. A failed pass is logged and left for the next tick.
    pub async fn run(self) {
        info!(
            every_seconds = self.every.as_secs(),
            timeout_seconds = self.pass_timeout.as_secs(),
            lease = self.lease.is_some(),
            "Status reconciler worker started"
        );

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.run_pass().await;
        }
    }

    pub async fn run_pass(&self) -> PassOutcome {
        if let Some(lease) = &self.lease {
            let (key, ttl) = cycle_lease(LEASE_NAME, chrono::Utc::now().timestamp(), self.every);
            match lease.acquire_lease(&key, &self.holder, ttl).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("reconcile lease held elsewhere, skipping this cycle");
                    return PassOutcome::Skipped;
                }
                // Fail open
                Err(e) => warn!(error = %e, "reconcile lease unavailable, running pass anyway"),
            }
        }

        match timeout(self.pass_timeout, self.reconciler.reconcile_now()).await {
            Ok(Ok(report)) => {
                debug!(
                    examined = report.examined,
                    applied = report.applied,
                    "reconcile tick done"
                );
                PassOutcome::Completed(report)
            }
            Ok(Err(e)) => {
                error!(error = %e, "status reconciliation pass failed");
                PassOutcome::Failed
            }
            Err(_) => {
                error!(
                    timeout_seconds = self.pass_timeout.as_secs(),
                    "status reconciliation pass timed out"
                );
                PassOutcome::TimedOut
            }
        }
    }
}
