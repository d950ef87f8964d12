pub mod api;
mod config;
mod geo;
mod gtfs;
mod realistic;
mod routing;
mod services;
mod sync;

use std::path::Path;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use gtfs::Schedule;
use routing::Timetable;
use services::{NavigationService, StopArrivalsService};
use sync::ArrivalObserver;

#[derive(OpenApi)]
#[openapi(
    info(title = "Transit Router API", version = "0.1.0"),
    paths(
        api::navigation::navigate,
        api::navigation::nearby_stops,
        api::stops::list_stops,
        api::stops::stop_arrivals,
        api::routes::reallife_id,
        api::trips::get_trip,
        api::vehicles::latest_arrival,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::navigation::NearbyStopsResponse,
        api::stops::StopDoc,
        api::stops::StopListResponse,
        api::stops::StopArrivalsResponse,
        api::routes::RealLifeIdResponse,
        api::trips::TripDoc,
        api::health::HealthResponse,
        services::navigation::NavigationResponse,
        services::navigation::RouteDoc,
        services::navigation::LegDoc,
        services::navigation::PlaceDoc,
        services::navigation::PointDoc,
        services::navigation::NearbyStopDoc,
        services::arrivals::StopArrivalDoc,
        services::arrivals::VehiclePositionDoc,
        sync::LatestArrival,
    )),
    tags(
        (name = "navigation", description = "Journey planning between coordinates"),
        (name = "stops", description = "Stop listing and real-time arrivals"),
        (name = "routes", description = "Route lookups"),
        (name = "trips", description = "Trip lookups"),
        (name = "vehicles", description = "Observed vehicle arrivals"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    config.validate().expect("Invalid configuration");
    let tz = config.parsed_timezone();
    tracing::info!(timezone = %config.timezone, gtfs_dir = %config.gtfs_dir, "Loaded configuration");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<axum::http::HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Static schedule. A missing mandatory feed file is fatal.
    let schedule = Arc::new(
        Schedule::load(Path::new(&config.gtfs_dir)).expect("Failed to load GTFS schedule"),
    );

    // Synthesise the realistic timetable from logged observations and
    // persist it next to the feed.
    let realistic = realistic::synthesise(&schedule, Path::new(&config.arrival_log));
    if let Err(e) = realistic::write_table(&realistic, &config.realistic_stop_times_path()) {
        tracing::warn!(error = %e, "Could not persist realistic stop times");
    }
    let realistic = Arc::new(realistic);

    // Routing structures for the active service date.
    let now = chrono::Utc::now().with_timezone(&tz);
    let timetable = Arc::new(Timetable::build(&schedule, &realistic, now));
    let navigation = Arc::new(NavigationService::new(timetable.clone(), tz));

    // Background arrival observer.
    let observer = Arc::new(
        ArrivalObserver::new(
            schedule.clone(),
            config.vehicle_positions_url.clone(),
            config.arrival_log.clone().into(),
            tz,
        )
        .expect("Failed to initialise arrivals log"),
    );
    let observer_task = tokio::spawn(observer.clone().run());

    let arrivals = Arc::new(StopArrivalsService::new(
        schedule.clone(),
        realistic,
        observer.clone(),
        config.vehicle_positions_url.clone(),
        tz,
    ));

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest(
            "/api",
            api::router(schedule, timetable, navigation, arrivals, observer),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listen address");

    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    // The polling loop has no work left once the server is down.
    observer_task.abort();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received");
}

async fn root() -> &'static str {
    "Transit Router API"
}
