//! Row builders shared by the service tests.

use chrono::{NaiveDate, NaiveTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::ride_request::{self, RideRequestStatus};
use crate::entities::user::{self, UserRole};
use crate::entities::driver;

pub async fn insert_user(db: &DatabaseConnection, role: UserRole) -> user::Model {
    let id = Uuid::new_v4();
    user::ActiveModel {
        id: Set(id),
        email: Set(format!("{}@example.com", id)),
        password_hash: Set("hash".to_string()),
        name: Set("Test User".to_string()),
        role: Set(role),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("insert user")
}

pub async fn insert_driver(db: &DatabaseConnection, is_available: bool) -> driver::Model {
    let user = insert_user(db, UserRole::Driver).await;
    driver::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        name: Set("Michael Smith".to_string()),
        phone: Set("+1 555 123 4567".to_string()),
        license_number: Set("DL-0001".to_string()),
        vehicle_make: Set("Toyota".to_string()),
        vehicle_model: Set("Camry".to_string()),
        vehicle_color: Set("Silver".to_string()),
        vehicle_license_plate: Set("ABC 1234".to_string()),
        rating: Set(None),
        total_rides: Set(0),
        is_available: Set(is_available),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("insert driver")
}

pub async fn insert_booking(
    db: &DatabaseConnection,
    user_id: Uuid,
    status: BookingStatus,
    assigned_driver_id: Option<Uuid>,
) -> booking::Model {
    booking::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        pickup_location: Set("Andheri".to_string()),
        dropoff_location: Set("Bandra".to_string()),
        booking_date: Set(NaiveDate::from_ymd_opt(2026, 11, 2).expect("date")),
        booking_time: Set(NaiveTime::from_hms_opt(9, 30, 0).expect("time")),
        status: Set(status),
        price: Set(100.0),
        assigned_driver_id: Set(assigned_driver_id),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("insert booking")
}

pub async fn insert_request(
    db: &DatabaseConnection,
    booking_id: Uuid,
    driver_id: Uuid,
    status: RideRequestStatus,
) -> ride_request::Model {
    ride_request::ActiveModel {
        id: Set(Uuid::new_v4()),
        booking_id: Set(booking_id),
        driver_id: Set(driver_id),
        status: Set(status),
        requested_at: Set(Utc::now().into()),
        responded_at: Set(None),
    }
    .insert(db)
    .await
    .expect("insert ride request")
}
