//! Rider ratings of completed rides.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::driver;
use crate::entities::ride_rating;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RatingOutcome {
    Submitted { rating: ride_rating::Model },
    /// The rider had already rated this booking; nothing was written.
    AlreadyRated,
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Record a 1-5 rating for a completed booking and refresh the driver's average.
pub async fn submit_rating(
    db: &DatabaseConnection,
    user_id: Uuid,
    booking_id: Uuid,
    rating: i32,
    comment: Option<String>,
) -> AppResult<RatingOutcome> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".to_string()));
    }

    let booking = booking::Entity::find_by_id(booking_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only rate your own rides".to_string(),
        ));
    }
    if booking.status != BookingStatus::Completed {
        return Err(AppError::BadRequest(
            "Only completed rides can be rated".to_string(),
        ));
    }
    let driver_id = booking
        .assigned_driver_id
        .ok_or_else(|| AppError::BadRequest("This ride has no driver to rate".to_string()))?;

    let comment = comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let txn = db.begin().await?;

    let inserted = ride_rating::ActiveModel {
        id: Set(Uuid::new_v4()),
        booking_id: Set(booking_id),
        user_id: Set(user_id),
        driver_id: Set(driver_id),
        rating: Set(rating),
        comment: Set(comment),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await;

    let rating = match inserted {
        Ok(rating) => rating,
        Err(e) if is_unique_violation(&e) => {
            txn.rollback().await?;
            tracing::info!(%booking_id, %user_id, "Ride already rated");
            return Ok(RatingOutcome::AlreadyRated);
        }
        Err(e) => return Err(e.into()),
    };

    let scores: Vec<i32> = ride_rating::Entity::find()
        .filter(ride_rating::Column::DriverId.eq(driver_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|r| r.rating)
        .collect();
    let average = scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64;

    driver::Entity::update_many()
        .set(driver::ActiveModel {
            rating: Set(Some(average)),
            ..Default::default()
        })
        .filter(driver::Column::Id.eq(driver_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(%booking_id, %driver_id, score = rating.rating, "Ride rated");
    Ok(RatingOutcome::Submitted { rating })
}
