// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Generated-question batches a user may request per calendar day.
pub const DEFAULT_AI_DAILY_LIMIT: u32 = 5;

/// Leaderboard rows returned when the caller does not ask for a size.
pub const DEFAULT_LEADERBOARD_SIZE: i64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    pub max_connections: u32,
    pub ai_daily_limit: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let ai_daily_limit = env::var("AI_DAILY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_AI_DAILY_LIMIT);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            port,
            max_connections,
            ai_daily_limit,
        }
    }
}
