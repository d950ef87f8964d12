//! Journey routing: the in-memory timetable and the round-based
//! search engine that runs over it.

pub mod raptor;
pub mod timetable;

pub use raptor::{Journey, Leg, Place, RaptorEngine};
pub use timetable::Timetable;
