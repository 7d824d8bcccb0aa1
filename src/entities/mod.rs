pub mod booking;
pub mod driver;
pub mod ride_rating;
pub mod ride_request;
pub mod user;
