//! Driver-side handling of ride requests.
//!
//! Request states: `pending -> accepted | rejected | expired`. Only pending
//! requests ever change, and acceptance, booking confirmation and sibling
//! expiry commit together.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::driver;
use crate::entities::ride_request::{self, RideRequestStatus};
use crate::error::{AppError, AppResult};
use crate::services::notify::{RideRequestEvent, RideRequestHub};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingSummary {
    pub pickup: String,
    pub dropoff: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub price: f64,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRideRequest {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub driver_id: Uuid,
    pub status: RideRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub booking: Option<BookingSummary>,
}

/// The driver's open requests, newest first.
pub async fn pending_requests(
    db: &DatabaseConnection,
    driver_id: Uuid,
) -> AppResult<Vec<PendingRideRequest>> {
    let rows = ride_request::Entity::find()
        .filter(ride_request::Column::DriverId.eq(driver_id))
        .filter(ride_request::Column::Status.eq(RideRequestStatus::Pending))
        .order_by_desc(ride_request::Column::RequestedAt)
        .find_also_related(booking::Entity)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(r, b)| PendingRideRequest {
            id: r.id,
            booking_id: r.booking_id,
            driver_id: r.driver_id,
            status: r.status,
            requested_at: r.requested_at.with_timezone(&Utc),
            responded_at: r.responded_at.map(|t| t.with_timezone(&Utc)),
            booking: b.map(|b| BookingSummary {
                pickup: b.pickup_location,
                dropoff: b.dropoff_location,
                date: b.booking_date,
                time: b.booking_time,
                price: b.price,
                user_id: b.user_id,
            }),
        })
        .collect())
}

/// Accept a pending request on behalf of `driver_id`.
///
/// Fails with `Conflict` when the request is no longer pending or the
/// booking has already been taken or cancelled; nothing is written then.
pub async fn accept_ride_request(
    db: &DatabaseConnection,
    hub: &RideRequestHub,
    driver_id: Uuid,
    request_id: Uuid,
) -> AppResult<booking::Model> {
    let request = ride_request::Entity::find_by_id(request_id)
        .filter(ride_request::Column::DriverId.eq(driver_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride request not found".to_string()))?;
    let booking_id = request.booking_id;
    let now = Utc::now();

    let txn = db.begin().await?;

    // Booking row first, same as cancellation and fan-out, so racing
    // transactions queue on it instead of deadlocking on request rows
    let confirmed = booking::Entity::update_many()
        .set(booking::ActiveModel {
            status: Set(BookingStatus::Confirmed),
            assigned_driver_id: Set(Some(driver_id)),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Pending))
        .exec(&txn)
        .await?;

    if confirmed.rows_affected == 0 {
        txn.rollback().await?;
        return Err(AppError::Conflict(
            "Booking has already been confirmed or cancelled".to_string(),
        ));
    }

    let accepted = ride_request::Entity::update_many()
        .set(ride_request::ActiveModel {
            status: Set(RideRequestStatus::Accepted),
            responded_at: Set(Some(now.into())),
            ..Default::default()
        })
        .filter(ride_request::Column::Id.eq(request_id))
        .filter(ride_request::Column::Status.eq(RideRequestStatus::Pending))
        .exec(&txn)
        .await?;

    if accepted.rows_affected == 0 {
        txn.rollback().await?;
        return Err(AppError::Conflict(
            "Ride request is no longer pending".to_string(),
        ));
    }

    let siblings = ride_request::Entity::find()
        .filter(ride_request::Column::BookingId.eq(booking_id))
        .filter(ride_request::Column::Id.ne(request_id))
        .filter(ride_request::Column::Status.eq(RideRequestStatus::Pending))
        .all(&txn)
        .await?;

    ride_request::Entity::update_many()
        .set(ride_request::ActiveModel {
            status: Set(RideRequestStatus::Expired),
            ..Default::default()
        })
        .filter(ride_request::Column::BookingId.eq(booking_id))
        .filter(ride_request::Column::Id.ne(request_id))
        .filter(ride_request::Column::Status.eq(RideRequestStatus::Pending))
        .exec(&txn)
        .await?;

    let booking = booking::Entity::find_by_id(booking_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    txn.commit().await?;

    for sibling in siblings {
        hub.publish(RideRequestEvent::Expired {
            request_id: sibling.id,
            booking_id,
            driver_id: sibling.driver_id,
        });
    }

    tracing::info!(%booking_id, %driver_id, %request_id, "Ride request accepted");
    Ok(booking)
}

/// Reject a pending request. Siblings and the booking are left alone.
pub async fn reject_ride_request(
    db: &DatabaseConnection,
    driver_id: Uuid,
    request_id: Uuid,
) -> AppResult<ride_request::Model> {
    let rejected = ride_request::Entity::update_many()
        .set(ride_request::ActiveModel {
            status: Set(RideRequestStatus::Rejected),
            responded_at: Set(Some(Utc::now().into())),
            ..Default::default()
        })
        .filter(ride_request::Column::Id.eq(request_id))
        .filter(ride_request::Column::DriverId.eq(driver_id))
        .filter(ride_request::Column::Status.eq(RideRequestStatus::Pending))
        .exec(db)
        .await?;

    let request = ride_request::Entity::find_by_id(request_id)
        .filter(ride_request::Column::DriverId.eq(driver_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride request not found".to_string()))?;

    if rejected.rows_affected == 0 {
        return Err(AppError::Conflict(
            "Ride request is no longer pending".to_string(),
        ));
    }

    tracing::info!(booking_id = %request.booking_id, %driver_id, %request_id, "Ride request rejected");
    Ok(request)
}

/// Mark a confirmed booking completed and count the ride for its driver.
pub async fn complete_ride(
    db: &DatabaseConnection,
    driver_id: Uuid,
    booking_id: Uuid,
) -> AppResult<booking::Model> {
    let booking = booking::Entity::find_by_id(booking_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.assigned_driver_id != Some(driver_id) {
        return Err(AppError::Forbidden(
            "You are not assigned to this booking".to_string(),
        ));
    }

    let txn = db.begin().await?;

    let completed = booking::Entity::update_many()
        .set(booking::ActiveModel {
            status: Set(BookingStatus::Completed),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Confirmed))
        .exec(&txn)
        .await?;

    if completed.rows_affected == 0 {
        txn.rollback().await?;
        return Err(AppError::Conflict(
            "Only confirmed bookings can be completed".to_string(),
        ));
    }

    driver::Entity::update_many()
        .col_expr(
            driver::Column::TotalRides,
            Expr::col(driver::Column::TotalRides).add(1),
        )
        .filter(driver::Column::Id.eq(driver_id))
        .exec(&txn)
        .await?;

    let booking = booking::Entity::find_by_id(booking_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    txn.commit().await?;

    tracing::info!(%booking_id, %driver_id, "Ride completed");
    Ok(booking)
}

/// Flip whether the driver is offered new bookings.
pub async fn toggle_availability(
    db: &DatabaseConnection,
    driver: driver::Model,
) -> AppResult<driver::Model> {
    let available = !driver.is_available;
    let mut active: driver::ActiveModel = driver.into();
    active.is_available = Set(available);
    let updated = active.update(db).await?;

    tracing::info!(driver_id = %updated.id, available, "Driver availability changed");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::db::{test_connection, test_postgres_connection};
    use crate::entities::user::UserRole;
    use crate::services::booking::cancel_booking;
    use crate::services::fanout::{assign_driver_to_booking, FanoutScheduler};
    use crate::services::fixtures::{insert_booking, insert_driver, insert_request, insert_user};

    async fn request(db: &DatabaseConnection, id: Uuid) -> ride_request::Model {
        ride_request::Entity::find_by_id(id).one(db).await.unwrap().unwrap()
    }

    async fn booking(db: &DatabaseConnection, id: Uuid) -> booking::Model {
        booking::Entity::find_by_id(id).one(db).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_accept_confirms_booking_and_expires_siblings() {
        let db = test_connection().await;
        let hub = RideRequestHub::new();
        let mut rx = hub.subscribe();
        let rider = insert_user(&db, UserRole::Rider).await;
        let winner = insert_driver(&db, true).await;
        let other_a = insert_driver(&db, true).await;
        let other_b = insert_driver(&db, true).await;
        let b = insert_booking(&db, rider.id, BookingStatus::Pending, None).await;
        let accepted = insert_request(&db, b.id, winner.id, RideRequestStatus::Pending).await;
        let sibling_a = insert_request(&db, b.id, other_a.id, RideRequestStatus::Pending).await;
        let sibling_b = insert_request(&db, b.id, other_b.id, RideRequestStatus::Pending).await;

        let confirmed = accept_ride_request(&db, &hub, winner.id, accepted.id).await.unwrap();

        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.assigned_driver_id, Some(winner.id));

        let accepted = request(&db, accepted.id).await;
        assert_eq!(accepted.status, RideRequestStatus::Accepted);
        assert!(accepted.responded_at.is_some());
        assert_eq!(request(&db, sibling_a.id).await.status, RideRequestStatus::Expired);
        assert_eq!(request(&db, sibling_b.id).await.status, RideRequestStatus::Expired);

        let mut expired_for = vec![rx.recv().await.unwrap().driver_id(), rx.recv().await.unwrap().driver_id()];
        expired_for.sort();
        let mut expected = vec![other_a.id, other_b.id];
        expected.sort();
        assert_eq!(expired_for, expected);
    }

    #[tokio::test]
    async fn test_second_accept_conflicts_and_changes_nothing() {
        let db = test_connection().await;
        let hub = RideRequestHub::new();
        let rider = insert_user(&db, UserRole::Rider).await;
        let first = insert_driver(&db, true).await;
        let second = insert_driver(&db, true).await;
        let b = insert_booking(&db, rider.id, BookingStatus::Pending, None).await;
        let first_req = insert_request(&db, b.id, first.id, RideRequestStatus::Pending).await;
        let second_req = insert_request(&db, b.id, second.id, RideRequestStatus::Pending).await;

        accept_ride_request(&db, &hub, first.id, first_req.id).await.unwrap();
        let result = accept_ride_request(&db, &hub, second.id, second_req.id).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(request(&db, second_req.id).await.status, RideRequestStatus::Expired);
        assert_eq!(booking(&db, b.id).await.assigned_driver_id, Some(first.id));

        let accepted = ride_request::Entity::find()
            .filter(ride_request::Column::BookingId.eq(b.id))
            .filter(ride_request::Column::Status.eq(RideRequestStatus::Accepted))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(accepted.len(), 1);
    }

    /// Two drivers accept sibling requests of one booking at the same time.
    async fn race_sibling_accepts(db: &DatabaseConnection) {
        let hub = RideRequestHub::new();
        let rider = insert_user(db, UserRole::Rider).await;
        let first = insert_driver(db, true).await;
        let second = insert_driver(db, true).await;
        let b = insert_booking(db, rider.id, BookingStatus::Pending, None).await;
        let first_req = insert_request(db, b.id, first.id, RideRequestStatus::Pending).await;
        let second_req = insert_request(db, b.id, second.id, RideRequestStatus::Pending).await;

        let (a, c) = tokio::join!(
            accept_ride_request(db, &hub, first.id, first_req.id),
            accept_ride_request(db, &hub, second.id, second_req.id),
        );

        let outcomes = [a, c];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1, "{:?}", outcomes);
        assert!(
            outcomes.iter().any(|r| matches!(r, Err(AppError::Conflict(_)))),
            "{:?}",
            outcomes
        );

        let statuses = [
            request(db, first_req.id).await.status,
            request(db, second_req.id).await.status,
        ];
        assert!(statuses.contains(&RideRequestStatus::Accepted));
        assert!(statuses.contains(&RideRequestStatus::Expired));

        let winner = booking(db, b.id).await.assigned_driver_id;
        assert!(winner == Some(first.id) || winner == Some(second.id));
    }

    #[tokio::test]
    async fn test_concurrent_accepts_have_one_winner() {
        let db = test_connection().await;
        for _ in 0..10 {
            race_sibling_accepts(&db).await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_accepts_on_postgres_conflict_cleanly() {
        let Some(db) = test_postgres_connection().await else {
            return;
        };
        for _ in 0..100 {
            race_sibling_accepts(&db).await;
        }
    }

    /// A driver accepts while the rider cancels the same booking.
    async fn race_accept_with_cancel(db: &DatabaseConnection) {
        let hub = RideRequestHub::new();
        let scheduler = FanoutScheduler::new(db.clone(), hub.clone(), Duration::from_secs(60), 3);
        let rider = insert_user(db, UserRole::Rider).await;
        let driver = insert_driver(db, true).await;
        let other = insert_driver(db, true).await;
        let b = insert_booking(db, rider.id, BookingStatus::Pending, None).await;
        let req = insert_request(db, b.id, driver.id, RideRequestStatus::Pending).await;
        let sibling = insert_request(db, b.id, other.id, RideRequestStatus::Pending).await;

        let (accepted, cancelled) = tokio::join!(
            accept_ride_request(db, &hub, driver.id, req.id),
            cancel_booking(db, &scheduler, &hub, rider.id, b.id),
        );

        assert!(
            matches!(accepted, Ok(_) | Err(AppError::Conflict(_))),
            "{:?}",
            accepted
        );
        assert_eq!(cancelled.unwrap().status, BookingStatus::Cancelled);
        assert_eq!(request(db, sibling.id).await.status, RideRequestStatus::Expired);

        let expected = if accepted.is_ok() {
            RideRequestStatus::Accepted
        } else {
            RideRequestStatus::Expired
        };
        assert_eq!(request(db, req.id).await.status, expected);
    }

    #[tokio::test]
    async fn test_accept_racing_cancel_stays_consistent() {
        let db = test_connection().await;
        for _ in 0..10 {
            race_accept_with_cancel(&db).await;
        }
    }

    #[tokio::test]
    async fn test_accept_racing_cancel_on_postgres() {
        let Some(db) = test_postgres_connection().await else {
            return;
        };
        for _ in 0..100 {
            race_accept_with_cancel(&db).await;
        }
    }

    #[tokio::test]
    async fn test_accept_on_cancelled_booking_rolls_back() {
        let db = test_connection().await;
        let hub = RideRequestHub::new();
        let rider = insert_user(&db, UserRole::Rider).await;
        let driver = insert_driver(&db, true).await;
        let b = insert_booking(&db, rider.id, BookingStatus::Cancelled, None).await;
        let req = insert_request(&db, b.id, driver.id, RideRequestStatus::Pending).await;

        let result = accept_ride_request(&db, &hub, driver.id, req.id).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(request(&db, req.id).await.status, RideRequestStatus::Pending);
        assert_eq!(booking(&db, b.id).await.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_accept_requires_own_request() {
        let db = test_connection().await;
        let hub = RideRequestHub::new();
        let rider = insert_user(&db, UserRole::Rider).await;
        let driver = insert_driver(&db, true).await;
        let intruder = insert_driver(&db, true).await;
        let b = insert_booking(&db, rider.id, BookingStatus::Pending, None).await;
        let req = insert_request(&db, b.id, driver.id, RideRequestStatus::Pending).await;

        assert!(matches!(
            accept_ride_request(&db, &hub, intruder.id, req.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_only_touches_that_request() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let driver = insert_driver(&db, true).await;
        let other = insert_driver(&db, true).await;
        let b = insert_booking(&db, rider.id, BookingStatus::Pending, None).await;
        let req = insert_request(&db, b.id, driver.id, RideRequestStatus::Pending).await;
        let sibling = insert_request(&db, b.id, other.id, RideRequestStatus::Pending).await;

        let rejected = reject_ride_request(&db, driver.id, req.id).await.unwrap();

        assert_eq!(rejected.status, RideRequestStatus::Rejected);
        assert!(rejected.responded_at.is_some());
        assert_eq!(request(&db, sibling.id).await.status, RideRequestStatus::Pending);
        let b = booking(&db, b.id).await;
        assert_eq!(b.status, BookingStatus::Pending);
        assert!(b.assigned_driver_id.is_none());

        // Terminal: a second response is refused
        assert!(matches!(
            reject_ride_request(&db, driver.id, req.id).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            reject_ride_request(&db, driver.id, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_ride_counts_once() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let driver = insert_driver(&db, true).await;
        let b = insert_booking(&db, rider.id, BookingStatus::Confirmed, Some(driver.id)).await;

        let completed = complete_ride(&db, driver.id, b.id).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);

        assert!(matches!(
            complete_ride(&db, driver.id, b.id).await,
            Err(AppError::Conflict(_))
        ));

        let driver = driver::Entity::find_by_id(driver.id).one(&db).await.unwrap().unwrap();
        assert_eq!(driver.total_rides, 1);
    }

    #[tokio::test]
    async fn test_complete_ride_requires_assignment() {
        let db = test_connection().await;
        let rider = insert_user(&db, UserRole::Rider).await;
        let driver = insert_driver(&db, true).await;
        let stranger = insert_driver(&db, true).await;
        let b = insert_booking(&db, rider.id, BookingStatus::Confirmed, Some(driver.id)).await;

        assert!(matches!(
            complete_ride(&db, stranger.id, b.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_driver_is_skipped_by_later_fanouts() {
        let db = test_connection().await;
        let hub = RideRequestHub::new();
        let rider = insert_user(&db, UserRole::Rider).await;
        let driver = insert_driver(&db, true).await;
        let first = insert_booking(&db, rider.id, BookingStatus::Pending, None).await;
        assert_eq!(assign_driver_to_booking(&db, &hub, first.id, 3).await.unwrap(), 1);

        let driver = toggle_availability(&db, driver).await.unwrap();
        assert!(!driver.is_available);

        let second = insert_booking(&db, rider.id, BookingStatus::Pending, None).await;
        assert_eq!(assign_driver_to_booking(&db, &hub, second.id, 3).await.unwrap(), 0);

        // The in-flight request is unaffected
        let pending = pending_requests(&db, driver.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].booking_id, first.id);
        assert_eq!(pending[0].booking.as_ref().unwrap().pickup, "Andheri");

        assert!(toggle_availability(&db, driver).await.unwrap().is_available);
    }
}
