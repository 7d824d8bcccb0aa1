//! Driver matching fan-out.
//!
//! A new booking is offered to the first few available drivers, one pending
//! ride request each. The fan-out runs as a delayed task owned by
//! [`FanoutScheduler`] so that it can be cancelled with its booking.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::driver;
use crate::entities::ride_request::{self, RideRequestStatus};
use crate::error::AppResult;
use crate::services::notify::{RideRequestEvent, RideRequestHub};

/// Offer `booking_id` to up to `limit` available drivers.
///
/// Returns the number of ride requests created. A booking that is gone or no
/// longer pending, or an empty driver pool, creates nothing.
pub async fn assign_driver_to_booking(
    db: &DatabaseConnection,
    hub: &RideRequestHub,
    booking_id: Uuid,
    limit: u64,
) -> AppResult<usize> {
    let txn = db.begin().await?;

    // Held until commit so a cancellation waits for the offers and then expires them
    let booking = booking::Entity::find_by_id(booking_id)
        .lock_exclusive()
        .one(&txn)
        .await?;
    match booking {
        Some(b) if b.status == BookingStatus::Pending => {}
        Some(b) => {
            txn.rollback().await?;
            tracing::info!(%booking_id, status = ?b.status, "Booking no longer pending, skipping fan-out");
            return Ok(0);
        }
        None => {
            txn.rollback().await?;
            tracing::info!(%booking_id, "Booking not found, skipping fan-out");
            return Ok(0);
        }
    }

    let drivers = driver::Entity::find()
        .filter(driver::Column::IsAvailable.eq(true))
        .limit(limit)
        .all(&txn)
        .await?;

    if drivers.is_empty() {
        txn.rollback().await?;
        tracing::info!(%booking_id, "No available drivers found");
        return Ok(0);
    }

    let requested_at = Utc::now();
    let offers: Vec<(Uuid, Uuid)> = drivers.iter().map(|d| (Uuid::new_v4(), d.id)).collect();

    let requests = offers.iter().map(|(request_id, driver_id)| ride_request::ActiveModel {
        id: Set(*request_id),
        booking_id: Set(booking_id),
        driver_id: Set(*driver_id),
        status: Set(RideRequestStatus::Pending),
        requested_at: Set(requested_at.into()),
        responded_at: Set(None),
    });

    ride_request::Entity::insert_many(requests).exec(&txn).await?;
    txn.commit().await?;

    let created = offers.len();
    for (request_id, driver_id) in offers {
        hub.publish(RideRequestEvent::Created {
            request_id,
            booking_id,
            driver_id,
        });
    }

    tracing::info!(%booking_id, drivers = created, "Looking for available drivers");
    Ok(created)
}

/// Delayed, cancellable fan-out tasks keyed by booking.
pub struct FanoutScheduler {
    db: DatabaseConnection,
    hub: RideRequestHub,
    delay: Duration,
    driver_limit: u64,
    next_ticket: AtomicU64,
    tasks: Arc<Mutex<HashMap<Uuid, (u64, JoinHandle<()>)>>>,
}

impl FanoutScheduler {
    pub fn new(
        db: DatabaseConnection,
        hub: RideRequestHub,
        delay: Duration,
        driver_limit: u64,
    ) -> Self {
        Self {
            db,
            hub,
            delay,
            driver_limit,
            next_ticket: AtomicU64::new(0),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule the fan-out for a booking, replacing any earlier schedule.
    pub async fn schedule(&self, booking_id: Uuid) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let db = self.db.clone();
        let hub = self.hub.clone();
        let delay = self.delay;
        let limit = self.driver_limit;
        let tasks = Arc::clone(&self.tasks);

        // Held across the spawn so the task cannot deregister before it is registered
        let mut guard = self.tasks.lock().await;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut tasks = tasks.lock().await;
                if tasks.get(&booking_id).is_some_and(|(t, _)| *t == ticket) {
                    tasks.remove(&booking_id);
                }
            }

            if let Err(e) = assign_driver_to_booking(&db, &hub, booking_id, limit).await {
                tracing::error!(%booking_id, error = %e, "Driver fan-out failed");
            }
        });

        if let Some((_, previous)) = guard.insert(booking_id, (ticket, handle)) {
            previous.abort();
        }
        tracing::debug!(%booking_id, delay_ms = delay.as_millis() as u64, "Fan-out scheduled");
    }

    /// Cancel a fan-out that has not started yet. Returns whether one was pending.
    pub async fn cancel(&self, booking_id: Uuid) -> bool {
        match self.tasks.lock().await.remove(&booking_id) {
            Some((_, handle)) => {
                handle.abort();
                tracing::debug!(%booking_id, "Fan-out cancelled");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_scheduled(&self, booking_id: Uuid) -> bool {
        self.tasks.lock().await.contains_key(&booking_id)
    }

    #[cfg(test)]
    pub(crate) async fn scheduled_count(&self) -> usize {
        self.tasks.lock().await.len()
    }
}
