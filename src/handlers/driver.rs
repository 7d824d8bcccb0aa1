use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::ride_request;
use crate::error::AppResult;
use crate::handlers::auth::UserInfo;
use crate::services::booking::BookingView;
use crate::services::driver::{self, DriverProfile, DriverRegistration};
use crate::services::resolution::{self, PendingRideRequest};
use crate::utils::jwt::{create_token, Claims};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DriverRegistrationResponse {
    pub token: String,
    pub user: UserInfo,
    pub driver: DriverProfile,
}

/// Register the caller as a driver
pub async fn register_driver(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<DriverRegistration>,
) -> AppResult<Json<DriverRegistrationResponse>> {
    let (user, driver) = driver::register_driver(&state.db, claims.sub, payload).await?;

    // The role lives in the token, so hand out one that carries the promotion
    let token = create_token(
        user.id,
        &user.email,
        user.role.clone(),
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    Ok(Json(DriverRegistrationResponse {
        token,
        user: user.into(),
        driver: driver.into(),
    }))
}

/// The logged-in driver's profile
pub async fn my_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<DriverProfile>> {
    let driver = driver::driver_for_user(&state.db, claims.sub).await?;
    Ok(Json(driver.into()))
}

pub async fn toggle_availability(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<DriverProfile>> {
    let driver = driver::driver_for_user(&state.db, claims.sub).await?;
    let updated = resolution::toggle_availability(&state.db, driver).await?;
    Ok(Json(updated.into()))
}

/// Pending ride requests offered to the logged-in driver
pub async fn pending_ride_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<PendingRideRequest>>> {
    let driver = driver::driver_for_user(&state.db, claims.sub).await?;
    Ok(Json(resolution::pending_requests(&state.db, driver.id).await?))
}

pub async fn accept_ride_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<BookingView>> {
    let driver = driver::driver_for_user(&state.db, claims.sub).await?;
    let booking =
        resolution::accept_ride_request(&state.db, &state.ride_requests, driver.id, request_id)
            .await?;

    state.sessions.refresh_if_present(&state.db, booking.user_id).await;

    Ok(Json(BookingView::new(booking, Some(driver))))
}

pub async fn reject_ride_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ride_request::Model>> {
    let driver = driver::driver_for_user(&state.db, claims.sub).await?;
    Ok(Json(
        resolution::reject_ride_request(&state.db, driver.id, request_id).await?,
    ))
}

/// Finish a confirmed ride
pub async fn complete_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<BookingView>> {
    let driver = driver::driver_for_user(&state.db, claims.sub).await?;
    let booking = resolution::complete_ride(&state.db, driver.id, booking_id).await?;

    state.sessions.refresh_if_present(&state.db, booking.user_id).await;

    Ok(Json(BookingView::new(booking, Some(driver))))
}
