//! GTFS input: the static schedule store and the real-time vehicle
//! positions feed.

pub mod error;
pub mod realtime;
pub mod static_data;

pub use error::{FeedError, ScheduleError};
pub use static_data::Schedule;
