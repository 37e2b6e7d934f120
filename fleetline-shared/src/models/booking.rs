use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pii::DeviceToken;

/// A passenger's seat on a trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub passenger_id: Uuid,
    pub device_token: Option<DeviceToken>,
    pub payment_confirmed: bool,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(trip_id: Uuid, passenger_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            passenger_id,
            device_token: None,
            payment_confirmed: false,
            payment_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_device_token(mut self, token: impl Into<String>) -> Self {
        self.device_token = Some(DeviceToken::new(token.into()));
        self
    }
}
