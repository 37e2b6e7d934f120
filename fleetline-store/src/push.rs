use async_trait::async_trait;
use fleetline_core::notify::{NotificationSink, NotifyError};
use fleetline_shared::TripNotification;
use std::time::Duration;
use tracing::info;

use crate::app_config::PushConfig;

/// Delivers trip notifications by POSTing them as JSON to a push gateway.
pub struct PushGatewaySink {
    gateway_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl PushGatewaySink {
    pub fn new(config: &PushConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| NotifyError::Delivery(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            gateway_url: config.gateway_url.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl NotificationSink for PushGatewaySink {
    async fn notify(&self, notification: &TripNotification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.gateway_url).json(notification);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(
            trip_id = %notification.trip_id,
            recipients = notification.recipient_tokens.len(),
            title = %notification.title,
            "push notification delivered"
        );
        Ok(())
    }
}
