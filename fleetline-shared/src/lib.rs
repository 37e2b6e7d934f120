pub mod models;
pub mod pii;

pub use models::booking::Booking;
pub use models::events::TripNotification;
pub use models::resource::{Resource, ResourceKind};
pub use models::trip::{Assignment, Trip, TripSchedule, TripStatus, TripStop};
pub use pii::{DeviceToken, Masked};
