use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::trip::Trip;
use crate::pii::DeviceToken;

/// A push message about a trip, addressed to driver and passenger devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripNotification {
    pub trip_id: Uuid,
    pub recipient_tokens: Vec<DeviceToken>,
    pub title: String,
    pub body: String,
}

impl TripNotification {
    pub fn cancelled(trip: &Trip, recipient_tokens: Vec<DeviceToken>) -> Self {
        Self {
            trip_id: trip.id,
            recipient_tokens,
            title: "Trip cancelled".to_string(),
            body: format!(
                "The trip from {} to {} on {} at {} has been cancelled.",
                trip.departure_location,
                trip.destination_location,
                trip.schedule.date,
                trip.schedule.departure_time.format("%H:%M"),
            ),
        }
    }

    pub fn reactivated(trip: &Trip, recipient_tokens: Vec<DeviceToken>) -> Self {
        Self {
            trip_id: trip.id,
            recipient_tokens,
            title: "Trip reactivated".to_string(),
            body: format!(
                "The trip from {} to {} on {} at {} is back on schedule.",
                trip.departure_location,
                trip.destination_location,
                trip.schedule.date,
                trip.schedule.departure_time.format("%H:%M"),
            ),
        }
    }

    pub fn reassigned(trip: &Trip, recipient_tokens: Vec<DeviceToken>) -> Self {
        Self {
            trip_id: trip.id,
            recipient_tokens,
            title: "Trip updated".to_string(),
            body: format!(
                "The driver or bus for your trip from {} to {} on {} has changed.",
                trip.departure_location, trip.destination_location, trip.schedule.date,
            ),
        }
    }

    pub fn is_addressed(&self) -> bool {
        !self.recipient_tokens.is_empty()
    }
}
