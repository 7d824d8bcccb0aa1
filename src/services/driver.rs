//! Driver profiles: registration, lookup and the rider-to-driver promotion.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::driver;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};

/// Rating reported for a driver who has not been rated yet.
pub const DEFAULT_DRIVER_RATING: f64 = 4.5;

#[derive(Debug, Clone, Deserialize)]
pub struct DriverRegistration {
    pub name: String,
    pub phone: String,
    pub license_number: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub vehicle_color: String,
    pub vehicle_license_plate: String,
}

impl DriverRegistration {
    fn validate(&self) -> AppResult<()> {
        let fields = [
            ("name", &self.name),
            ("phone", &self.phone),
            ("license_number", &self.license_number),
            ("vehicle_make", &self.vehicle_make),
            ("vehicle_model", &self.vehicle_model),
            ("vehicle_color", &self.vehicle_color),
            ("vehicle_license_plate", &self.vehicle_license_plate),
        ];

        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(AppError::BadRequest(format!("{} is required", field))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub phone: String,
    pub license_number: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub vehicle_color: String,
    pub vehicle_license_plate: String,
    pub rating: f64,
    pub total_rides: i32,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

impl From<driver::Model> for DriverProfile {
    fn from(d: driver::Model) -> Self {
        Self {
            id: d.id,
            user_id: d.user_id,
            name: d.name,
            phone: d.phone,
            license_number: d.license_number,
            vehicle_make: d.vehicle_make,
            vehicle_model: d.vehicle_model,
            vehicle_color: d.vehicle_color,
            vehicle_license_plate: d.vehicle_license_plate,
            rating: d.rating.unwrap_or(DEFAULT_DRIVER_RATING),
            total_rides: d.total_rides,
            is_available: d.is_available,
            created_at: d.created_at.with_timezone(&Utc),
        }
    }
}

/// Create the caller's driver profile and promote them to the driver role.
pub async fn register_driver(
    db: &DatabaseConnection,
    user_id: Uuid,
    input: DriverRegistration,
) -> AppResult<(user::Model, driver::Model)> {
    input.validate()?;

    let existing = driver::Entity::find()
        .filter(driver::Column::UserId.eq(user_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Already registered as a driver".to_string()));
    }

    let user = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let txn = db.begin().await?;

    let driver = driver::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        name: Set(input.name.trim().to_string()),
        phone: Set(input.phone.trim().to_string()),
        license_number: Set(input.license_number.trim().to_string()),
        vehicle_make: Set(input.vehicle_make.trim().to_string()),
        vehicle_model: Set(input.vehicle_model.trim().to_string()),
        vehicle_color: Set(input.vehicle_color.trim().to_string()),
        vehicle_license_plate: Set(input.vehicle_license_plate.trim().to_string()),
        rating: Set(None),
        total_rides: Set(0),
        is_available: Set(true),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;

    let mut active: user::ActiveModel = user.into();
    active.role = Set(UserRole::Driver);
    let user = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(%user_id, driver_id = %driver.id, "Driver registered");
    Ok((user, driver))
}

/// The driver profile owned by a user.
pub async fn driver_for_user(db: &DatabaseConnection, user_id: Uuid) -> AppResult<driver::Model> {
    driver::Entity::find()
        .filter(driver::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver profile not found".to_string()))
}
