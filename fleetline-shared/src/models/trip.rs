use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::resource::ResourceKind;
use super::UnknownVariant;

/// Trip status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Pending,
    Active,
    Full,
    Complete,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => "PENDING",
            TripStatus::Active => "ACTIVE",
            TripStatus::Full => "FULL",
            TripStatus::Complete => "COMPLETE",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    /// Statuses the reconciler never overwrites on its own.
    pub fn is_sticky(&self) -> bool {
        matches!(self, TripStatus::Complete | TripStatus::Cancelled)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TripStatus::Pending),
            "ACTIVE" => Ok(TripStatus::Active),
            "FULL" => Ok(TripStatus::Full),
            "COMPLETE" => Ok(TripStatus::Complete),
            "CANCELLED" => Ok(TripStatus::Cancelled),
            _ => Err(UnknownVariant {
                kind: "trip status",
                value: s.to_string(),
            }),
        }
    }
}

/// Calendar date plus local departure/return times, as a manager enters them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripSchedule {
    pub date: NaiveDate,
    pub departure_time: NaiveTime,
    pub return_time: NaiveTime,
}

impl TripSchedule {
    pub fn new(date: NaiveDate, departure_time: NaiveTime, return_time: NaiveTime) -> Self {
        Self {
            date,
            departure_time,
            return_time,
        }
    }

    /// Return time earlier than departure means the trip ends the next day.
    pub fn is_overnight(&self) -> bool {
        self.return_time < self.departure_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripStop {
    pub location: String,
    pub geo: Option<String>,
}

/// The driver and bus bound to a trip for its whole interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub driver_id: Uuid,
    pub bus_id: Uuid,
}

impl Assignment {
    pub fn new(driver_id: Uuid, bus_id: Uuid) -> Self {
        Self { driver_id, bus_id }
    }

    pub fn resource_id(&self, kind: ResourceKind) -> Uuid {
        match kind {
            ResourceKind::Driver => self.driver_id,
            ResourceKind::Bus => self.bus_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub manager_id: Uuid,
    pub schedule: TripSchedule,
    pub status: TripStatus,
    pub seat_price_cents: i64,
    pub departure_location: String,
    pub destination_location: String,
    pub departure_coords: Option<String>,
    pub stops: Vec<TripStop>,
    pub assignment: Assignment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(manager_id: Uuid, schedule: TripSchedule, assignment: Assignment) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            manager_id,
            schedule,
            status: TripStatus::Pending,
            seat_price_cents: 0,
            departure_location: String::new(),
            destination_location: String::new(),
            departure_coords: None,
            stops: Vec::new(),
            assignment,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: TripStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels_parse_back() {
        for status in [
            TripStatus::Pending,
            TripStatus::Active,
            TripStatus::Full,
            TripStatus::Complete,
            TripStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TripStatus>().unwrap(), status);
        }
        assert!("Cancelled".parse::<TripStatus>().is_ok());
        assert!("DELAYED".parse::<TripStatus>().is_err());
    }

    #[test]
    fn test_sticky_statuses() {
        assert!(TripStatus::Complete.is_sticky());
        assert!(TripStatus::Cancelled.is_sticky());
        assert!(!TripStatus::Full.is_sticky());
        assert!(!TripStatus::Active.is_sticky());
    }

    #[test]
    fn test_overnight_schedule() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let late = TripSchedule::new(
            date,
            NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
        );
        assert!(late.is_overnight());

        let day = TripSchedule::new(
            date,
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        assert!(!day.is_overnight());
    }
}
