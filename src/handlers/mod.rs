pub mod auth;
pub mod bookings;
pub mod driver;
pub mod push;
