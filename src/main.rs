use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ride_booking_backend::{
    config::Config,
    db,
    middleware::rate_limit::{create_global_governor, log_request},
    routes,
    services::{
        fanout::FanoutScheduler,
        notify::RideRequestHub,
        pricing::{HttpPriceQuoter, PriceQuoter, SqlFunctionPriceQuoter},
        session::SessionStore,
    },
    AppState,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ride_booking_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    // Connect to database
    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    // Run migrations
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    let pricer: Arc<dyn PriceQuoter> = match &config.pricing_url {
        Some(url) => {
            tracing::info!(%url, "Pricing via HTTP");
            Arc::new(HttpPriceQuoter::new(url.clone()))
        }
        None => {
            tracing::info!("Pricing via database function");
            Arc::new(SqlFunctionPriceQuoter::new(db.clone()))
        }
    };

    let ride_requests = RideRequestHub::new();
    let fanout = Arc::new(FanoutScheduler::new(
        db.clone(),
        ride_requests.clone(),
        config.fanout_delay(),
        config.fanout_driver_limit,
    ));

    let state = AppState {
        db,
        config: config.clone(),
        sessions: Arc::new(SessionStore::default()),
        fanout,
        ride_requests,
        pricer,
    };

    // Create router with middleware
    let app = routes::create_router(state)
        .layer(middleware::from_fn(log_request))
        .layer(create_global_governor())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server with socket address for rate limiting
    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
