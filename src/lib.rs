pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use services::fanout::FanoutScheduler;
use services::notify::RideRequestHub;
use services::pricing::PriceQuoter;
use services::session::SessionStore;

pub use config::Config;
pub use error::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub sessions: Arc<SessionStore>,
    pub fanout: Arc<FanoutScheduler>,
    pub ride_requests: RideRequestHub,
    pub pricer: Arc<dyn PriceQuoter>,
}
