use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{auth, bookings, driver, push};
use crate::middleware::auth::{auth_middleware, require_driver};
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let driver_governor = create_role_governor(RateLimitedRole::Driver);
    let rider_governor = create_role_governor(RateLimitedRole::Rider);
    let public_governor = create_public_governor();

    // Public routes (IP-based rate limiting)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor);

    let session_routes = Router::new()
        .route("/logout", post(auth::logout))
        .layer(rider_governor.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Any authenticated user; drivers can book rides too
    let booking_routes = Router::new()
        .route("/", post(bookings::create_booking).get(bookings::list_bookings))
        .route("/current", get(bookings::current_bookings))
        .route("/past", get(bookings::past_bookings))
        .route(
            "/{id}",
            get(bookings::get_booking).delete(bookings::cancel_booking),
        )
        .route("/{id}/rating", post(bookings::rate_ride))
        .layer(rider_governor.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let onboarding_routes = Router::new()
        .route("/register", post(driver::register_driver))
        .layer(rider_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Driver routes (requires auth + driver role)
    let driver_routes = Router::new()
        .route("/me", get(driver::my_profile))
        .route("/availability", put(driver::toggle_availability))
        .route("/ride-requests", get(driver::pending_ride_requests))
        .route("/ride-requests/ws", get(push::ride_request_feed))
        .route("/ride-requests/{id}/accept", post(driver::accept_ride_request))
        .route("/ride-requests/{id}/reject", post(driver::reject_ride_request))
        .route("/bookings/{id}/complete", post(driver::complete_ride))
        .layer(driver_governor)
        .layer(middleware::from_fn(require_driver))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes.merge(session_routes))
        .nest("/api/bookings", booking_routes)
        .nest("/api/drivers", onboarding_routes)
        .nest("/api/driver", driver_routes)
        .with_state(state)
}
