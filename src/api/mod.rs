pub mod error;
pub mod health;
pub mod navigation;
pub mod routes;
pub mod stops;
pub mod trips;
pub mod vehicles;

pub use error::ErrorResponse;

use std::sync::Arc;

use axum::Router;

use crate::gtfs::Schedule;
use crate::routing::Timetable;
use crate::services::{NavigationService, StopArrivalsService};
use crate::sync::ArrivalObserver;

pub fn router(
    schedule: Arc<Schedule>,
    timetable: Arc<Timetable>,
    navigation: Arc<NavigationService>,
    arrivals: Arc<StopArrivalsService>,
    observer: Arc<ArrivalObserver>,
) -> Router {
    Router::new()
        .merge(navigation::router(navigation))
        .nest("/stops", stops::router(schedule.clone(), arrivals))
        .nest("/routes", routes::router(schedule.clone()))
        .nest("/trips", trips::router(schedule.clone()))
        .nest("/vehicles", vehicles::router(observer))
        .nest("/health", health::router(schedule, timetable))
}
