//! Booking lifecycle: creation, rider read paths and cancellation.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::driver;
use crate::entities::ride_request::{self, RideRequestStatus};
use crate::error::{AppError, AppResult};
use crate::services::fanout::FanoutScheduler;
use crate::services::notify::{RideRequestEvent, RideRequestHub};
use crate::services::pricing::{price_or_fallback, PriceQuoter};

/// Rating shown on a rider's booking when the assigned driver has none yet.
pub const DEFAULT_ASSIGNED_DRIVER_RATING: f64 = 4.8;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub pickup: String,
    pub dropoff: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleInfo {
    pub make: String,
    pub model: String,
    pub color: String,
    pub license_plate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverCard {
    pub name: String,
    pub phone: String,
    pub rating: f64,
    pub vehicle: VehicleInfo,
}

impl From<driver::Model> for DriverCard {
    fn from(d: driver::Model) -> Self {
        Self {
            name: d.name,
            phone: d.phone,
            rating: d.rating.unwrap_or(DEFAULT_ASSIGNED_DRIVER_RATING),
            vehicle: VehicleInfo {
                make: d.vehicle_make,
                model: d.vehicle_model,
                color: d.vehicle_color,
                license_plate: d.vehicle_license_plate,
            },
        }
    }
}

/// A booking as its rider sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pickup: String,
    pub dropoff: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: BookingStatus,
    pub price: f64,
    pub assigned_driver_id: Option<Uuid>,
    pub driver: Option<DriverCard>,
    pub created_at: DateTime<Utc>,
}

impl BookingView {
    pub fn new(b: booking::Model, driver: Option<driver::Model>) -> Self {
        Self {
            id: b.id,
            user_id: b.user_id,
            pickup: b.pickup_location,
            dropoff: b.dropoff_location,
            date: b.booking_date,
            time: b.booking_time,
            status: b.status,
            price: b.price,
            assigned_driver_id: b.assigned_driver_id,
            driver: driver.map(DriverCard::from),
            created_at: b.created_at.with_timezone(&Utc),
        }
    }
}

/// Create a pending booking and schedule its driver fan-out.
///
/// A failed price quote falls back to `fallback_price`. The fan-out is only
/// scheduled once the booking row exists.
pub async fn create_booking(
    db: &DatabaseConnection,
    quoter: &dyn PriceQuoter,
    scheduler: &FanoutScheduler,
    fallback_price: f64,
    user_id: Uuid,
    input: NewBooking,
) -> AppResult<booking::Model> {
    let pickup = input.pickup.trim();
    let dropoff = input.dropoff.trim();
    if pickup.is_empty() || dropoff.is_empty() {
        return Err(AppError::BadRequest(
            "Pickup and dropoff locations are required".to_string(),
        ));
    }

    let price = price_or_fallback(quoter, pickup, dropoff, fallback_price).await;

    let new_booking = booking::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        pickup_location: Set(pickup.to_string()),
        dropoff_location: Set(dropoff.to_string()),
        booking_date: Set(input.date),
        booking_time: Set(input.time),
        status: Set(BookingStatus::Pending),
        price: Set(price),
        assigned_driver_id: Set(None),
        created_at: Set(Utc::now().into()),
    };

    let booking = new_booking.insert(db).await.map_err(|e| {
        tracing::error!(%user_id, error = %e, "Error creating booking");
        AppError::Internal(format!("Failed to create booking: {}", e))
    })?;

    scheduler.schedule(booking.id).await;
    tracing::info!(booking_id = %booking.id, %user_id, price, "Booking created");

    Ok(booking)
}

/// All of a rider's bookings with their assigned drivers, oldest first.
pub async fn load_bookings(db: &DatabaseConnection, user_id: Uuid) -> AppResult<Vec<BookingView>> {
    let rows = booking::Entity::find()
        .filter(booking::Column::UserId.eq(user_id))
        .order_by_asc(booking::Column::CreatedAt)
        .find_also_related(driver::Entity)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(b, d)| BookingView::new(b, d))
        .collect())
}

pub async fn get_booking(
    db: &DatabaseConnection,
    user_id: Uuid,
    booking_id: Uuid,
) -> AppResult<BookingView> {
    let (booking, driver) = booking::Entity::find_by_id(booking_id)
        .find_also_related(driver::Entity)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only view your own bookings".to_string(),
        ));
    }

    Ok(BookingView::new(booking, driver))
}

/// Bookings still in progress: pending or confirmed.
pub fn current_bookings(bookings: &[BookingView], user_id: Uuid) -> Vec<BookingView> {
    bookings
        .iter()
        .filter(|b| b.user_id == user_id && b.status.is_current())
        .cloned()
        .collect()
}

/// Finished bookings: completed or cancelled.
pub fn past_bookings(bookings: &[BookingView], user_id: Uuid) -> Vec<BookingView> {
    bookings
        .iter()
        .filter(|b| b.user_id == user_id && !b.status.is_current())
        .cloned()
        .collect()
}

/// Cancel a rider's pending or confirmed booking.
///
/// Drops a fan-out that has not run yet and expires the booking's open ride
/// requests.
pub async fn cancel_booking(
    db: &DatabaseConnection,
    scheduler: &FanoutScheduler,
    hub: &RideRequestHub,
    user_id: Uuid,
    booking_id: Uuid,
) -> AppResult<booking::Model> {
    let booking = booking::Entity::find_by_id(booking_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only cancel your own bookings".to_string(),
        ));
    }

    if !booking.status.is_current() {
        return Err(AppError::BadRequest(
            "Only pending or confirmed bookings can be cancelled".to_string(),
        ));
    }

    scheduler.cancel(booking_id).await;

    let txn = db.begin().await?;

    // Booking row before its requests; a running fan-out holds it until commit
    let updated = booking::Entity::update_many()
        .set(booking::ActiveModel {
            status: Set(BookingStatus::Cancelled),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.is_in([BookingStatus::Pending, BookingStatus::Confirmed]))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        txn.rollback().await?;
        return Err(AppError::Conflict(
            "Booking was completed or cancelled concurrently".to_string(),
        ));
    }

    let open_requests = ride_request::Entity::find()
        .filter(ride_request::Column::BookingId.eq(booking_id))
        .filter(ride_request::Column::Status.eq(RideRequestStatus::Pending))
        .all(&txn)
        .await?;

    ride_request::Entity::update_many()
        .set(ride_request::ActiveModel {
            status: Set(RideRequestStatus::Expired),
            ..Default::default()
        })
        .filter(ride_request::Column::BookingId.eq(booking_id))
        .filter(ride_request::Column::Status.eq(RideRequestStatus::Pending))
        .exec(&txn)
        .await?;

    let cancelled = booking::Entity::find_by_id(booking_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    txn.commit().await?;

    for request in open_requests {
        hub.publish(RideRequestEvent::Expired {
            request_id: request.id,
            booking_id,
            driver_id: request.driver_id,
        });
    }

    tracing::info!(%booking_id, %user_id, "Booking cancelled");
    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::test_connection;
    use crate::entities::user::UserRole;
    use crate::services::fixtures::{insert_booking, insert_driver, insert_request, insert_user};
    use crate::services::pricing::tests::StubQuoter;

    fn new_booking() -> NewBooking {
        NewBooking {
            pickup: "Andheri West".to_string(),
            dropoff: "Bandra Kurla Complex".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            time: NaiveTime::from_hms_opt(18, 15, 0).unwrap(),
        }
    }

    fn scheduler(db: &DatabaseConnection, delay_ms: u64) -> FanoutScheduler {
        FanoutScheduler::new(db.clone(), RideRequestHub::new(), Duration::from_millis(delay_ms), 3)
    }

    #[tokio::test]
    async fn test_create_booking_uses_quoted_price() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let scheduler = scheduler(&db, 60_000);

        let booking = create_booking(
            &db,
            &StubQuoter(Some(275.0)),
            &scheduler,
            100.0,
            rider.id,
            new_booking(),
        )
        .await
        .unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.price, 275.0);
        assert_eq!(booking.user_id, rider.id);
        assert!(booking.assigned_driver_id.is_none());
        assert!(scheduler.is_scheduled(booking.id).await);
    }

    #[tokio::test]
    async fn test_create_booking_falls_back_when_pricing_fails() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let scheduler = scheduler(&db, 60_000);

        let booking = create_booking(
            &db,
            &StubQuoter::failing(),
            &scheduler,
            100.0,
            rider.id,
            new_booking(),
        )
        .await
        .unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.price, 100.0);
    }

    #[tokio::test]
    async fn test_create_booking_requires_locations() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let scheduler = scheduler(&db, 60_000);

        let mut input = new_booking();
        input.dropoff = "   ".to_string();

        let result = create_booking(&db, &StubQuoter(Some(1.0)), &scheduler, 100.0, rider.id, input).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_failed_insert_schedules_nothing() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let scheduler = scheduler(&db, 60_000);

        db.clone().close().await.unwrap();
        let result = create_booking(
            &db,
            &StubQuoter(Some(1.0)),
            &scheduler,
            100.0,
            rider.id,
            new_booking(),
        )
        .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(scheduler.scheduled_count().await, 0);
    }

    #[tokio::test]
    async fn test_created_booking_fans_out_after_delay() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        for _ in 0..4 {
            insert_driver(&db, true).await;
        }
        let scheduler = scheduler(&db, 10);

        let booking = create_booking(
            &db,
            &StubQuoter(Some(180.0)),
            &scheduler,
            100.0,
            rider.id,
            new_booking(),
        )
        .await
        .unwrap();

        let mut requests = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            requests = ride_request::Entity::find()
                .filter(ride_request::Column::BookingId.eq(booking.id))
                .all(&db)
                .await
                .unwrap();
            if !requests.is_empty() {
                break;
            }
        }

        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn test_current_and_past_partition_bookings() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let other = insert_user(&db, UserRole::Rider).await;
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            insert_booking(&db, rider.id, status, None).await;
        }
        insert_booking(&db, other.id, BookingStatus::Pending, None).await;

        let all = load_bookings(&db, rider.id).await.unwrap();
        let current = current_bookings(&all, rider.id);
        let past = past_bookings(&all, rider.id);

        assert_eq!(all.len(), 4);
        assert_eq!(current.len(), 2);
        assert_eq!(past.len(), 2);
        assert!(current.iter().all(|b| matches!(b.status, BookingStatus::Pending | BookingStatus::Confirmed)));
        assert!(past.iter().all(|b| matches!(b.status, BookingStatus::Completed | BookingStatus::Cancelled)));
        assert!(current.iter().all(|c| !past.iter().any(|p| p.id == c.id)));

        // Another rider's snapshot never leaks through the filters
        assert!(current_bookings(&all, other.id).is_empty());
    }

    #[tokio::test]
    async fn test_get_booking_includes_driver_card() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let driver = insert_driver(&db, true).await;
        let booking = insert_booking(&db, rider.id, BookingStatus::Confirmed, Some(driver.id)).await;

        let view = get_booking(&db, rider.id, booking.id).await.unwrap();
        let card = view.driver.expect("driver card");
        assert_eq!(card.name, driver.name);
        assert_eq!(card.rating, DEFAULT_ASSIGNED_DRIVER_RATING);
        assert_eq!(card.vehicle.license_plate, "ABC 1234");

        let stranger = insert_user(&db, UserRole::Rider).await;
        assert!(matches!(
            get_booking(&db, stranger.id, booking.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_expires_open_requests_and_fanout() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let driver = insert_driver(&db, true).await;
        let booking = insert_booking(&db, rider.id, BookingStatus::Pending, None).await;
        let request = insert_request(&db, booking.id, driver.id, RideRequestStatus::Pending).await;

        let scheduler = scheduler(&db, 60_000);
        scheduler.schedule(booking.id).await;
        let hub = RideRequestHub::new();
        let mut rx = hub.subscribe();

        let cancelled = cancel_booking(&db, &scheduler, &hub, rider.id, booking.id).await.unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(!scheduler.is_scheduled(booking.id).await);
        let request = ride_request::Entity::find_by_id(request.id).one(&db).await.unwrap().unwrap();
        assert_eq!(request.status, RideRequestStatus::Expired);
        assert!(matches!(rx.recv().await.unwrap(), RideRequestEvent::Expired { .. }));

        assert!(matches!(
            cancel_booking(&db, &scheduler, &hub, rider.id, booking.id).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
