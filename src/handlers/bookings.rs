use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::booking::{self, BookingView, NewBooking};
use crate::services::rating::{self, RatingOutcome};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Create a booking
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewBooking>,
) -> AppResult<Json<BookingView>> {
    let created = booking::create_booking(
        &state.db,
        state.pricer.as_ref(),
        &state.fanout,
        state.config.fallback_price,
        claims.sub,
        payload,
    )
    .await?;

    state.sessions.refresh_if_present(&state.db, claims.sub).await;

    Ok(Json(BookingView::new(created, None)))
}

/// Refetch all of the caller's bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<BookingView>>> {
    Ok(Json(state.sessions.refresh(&state.db, claims.sub).await?))
}

/// Pending and confirmed bookings
pub async fn current_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<BookingView>>> {
    Ok(Json(state.sessions.current_bookings(&state.db, claims.sub).await?))
}

/// Completed and cancelled bookings
pub async fn past_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<BookingView>>> {
    Ok(Json(state.sessions.past_bookings(&state.db, claims.sub).await?))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<BookingView>> {
    Ok(Json(booking::get_booking(&state.db, claims.sub, booking_id).await?))
}

/// Cancel a booking
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<BookingView>> {
    booking::cancel_booking(
        &state.db,
        &state.fanout,
        &state.ride_requests,
        claims.sub,
        booking_id,
    )
    .await?;

    state.sessions.refresh_if_present(&state.db, claims.sub).await;

    Ok(Json(booking::get_booking(&state.db, claims.sub, booking_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RateRideRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

/// Rate a completed ride
pub async fn rate_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<RateRideRequest>,
) -> AppResult<Json<RatingOutcome>> {
    let outcome = rating::submit_rating(
        &state.db,
        claims.sub,
        booking_id,
        payload.rating,
        payload.comment,
    )
    .await?;

    Ok(Json(outcome))
}
