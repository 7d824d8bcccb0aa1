use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    /// Remote pricing endpoint. When unset, prices come from the
    /// `calculate_ride_price` database function.
    pub pricing_url: Option<String>,
    pub fallback_price: f64,
    pub fanout_delay_ms: u64,
    pub fanout_driver_limit: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            pricing_url: env::var("PRICING_URL").ok().filter(|url| !url.is_empty()),
            fallback_price: env::var("FALLBACK_PRICE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .expect("FALLBACK_PRICE must be a number"),
            fanout_delay_ms: env::var("FANOUT_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .expect("FANOUT_DELAY_MS must be a number"),
            fanout_driver_limit: env::var("FANOUT_DRIVER_LIMIT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("FANOUT_DRIVER_LIMIT must be a number"),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn fanout_delay(&self) -> Duration {
        Duration::from_millis(self.fanout_delay_ms)
    }
}
