use async_trait::async_trait;
use fleetline_shared::TripNotification;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
    #[error("Notification gateway rejected the request with status {status}")]
    Rejected { status: u16 },
}

/// Outbound push delivery. Callers treat it as fire-and-forget.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &TripNotification) -> Result<(), NotifyError>;
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, notification: &TripNotification) -> Result<(), NotifyError> {
        info!(
            trip_id = %notification.trip_id,
            recipients = notification.recipient_tokens.len(),
            title = %notification.title,
            "push delivery disabled, notification logged only"
        );
        Ok(())
    }
}

/// Sends a notification and swallows any failure. A failed push never
/// undoes the status or assignment change that triggered it.
pub async fn dispatch(sink: &dyn NotificationSink, notification: &TripNotification) {
    if !notification.is_addressed() {
        debug!(trip_id = %notification.trip_id, "no device tokens, skipping notification");
        return;
    }

    if let Err(e) = sink.notify(notification).await {
        warn!(
            trip_id = %notification.trip_id,
            error = %e,
            "notification delivery failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetline_shared::DeviceToken;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _notification: &TripNotification) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Rejected { status: 503 })
        }
    }

    fn notification(tokens: Vec<DeviceToken>) -> TripNotification {
        TripNotification {
            trip_id: Uuid::new_v4(),
            recipient_tokens: tokens,
            title: "Trip cancelled".into(),
            body: "body".into(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let sink = FailingSink {
            calls: AtomicUsize::new(0),
        };
        dispatch(&sink, &notification(vec![DeviceToken::new("token-1234567890".into())])).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_skips_unaddressed() {
        let sink = FailingSink {
            calls: AtomicUsize::new(0),
        };
        dispatch(&sink, &notification(vec![])).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }
}
