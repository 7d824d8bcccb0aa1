//! Per-user booking snapshots.
//!
//! Each signed-in rider has one snapshot of their bookings. Snapshots are
//! only ever replaced wholesale from the database; the lock here is the
//! single point where they change.

use std::collections::HashMap;

use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::booking::{self, BookingView};

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Vec<BookingView>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refetch the user's bookings and replace their snapshot.
    ///
    /// The write lock is taken before the load, so the last refresh to finish
    /// always installs the newest rows.
    pub async fn refresh(&self, db: &DatabaseConnection, user_id: Uuid) -> AppResult<Vec<BookingView>> {
        let mut sessions = self.sessions.write().await;
        let bookings = booking::load_bookings(db, user_id).await?;
        sessions.insert(user_id, bookings.clone());
        tracing::debug!(%user_id, bookings = bookings.len(), "Session refreshed");
        Ok(bookings)
    }

    /// Refresh only users that currently hold a snapshot. Errors are logged.
    pub async fn refresh_if_present(&self, db: &DatabaseConnection, user_id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&user_id) {
            return;
        }
        match booking::load_bookings(db, user_id).await {
            Ok(bookings) => {
                tracing::debug!(%user_id, bookings = bookings.len(), "Session refreshed");
                sessions.insert(user_id, bookings);
            }
            Err(e) => tracing::warn!(%user_id, error = %e, "Failed to refresh session"),
        }
    }

    pub async fn clear(&self, user_id: Uuid) {
        self.sessions.write().await.remove(&user_id);
    }

    /// The user's snapshot, loading it first if there is none.
    pub async fn snapshot(&self, db: &DatabaseConnection, user_id: Uuid) -> AppResult<Vec<BookingView>> {
        if let Some(bookings) = self.sessions.read().await.get(&user_id) {
            return Ok(bookings.clone());
        }
        self.refresh(db, user_id).await
    }

    pub async fn current_bookings(&self, db: &DatabaseConnection, user_id: Uuid) -> AppResult<Vec<BookingView>> {
        let snapshot = self.snapshot(db, user_id).await?;
        Ok(booking::current_bookings(&snapshot, user_id))
    }

    pub async fn past_bookings(&self, db: &DatabaseConnection, user_id: Uuid) -> AppResult<Vec<BookingView>> {
        let snapshot = self.snapshot(db, user_id).await?;
        Ok(booking::past_bookings(&snapshot, user_id))
    }
}
