//! Request-facing services composed over the core stores and engine.

pub mod arrivals;
pub mod navigation;

pub use arrivals::StopArrivalsService;
pub use navigation::NavigationService;
