// src/config.rs

use std::env;
use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    /// Number of top-level comments in the first (and only) thread page.
    pub thread_page_size: i64,
    pub moderation_page_size: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            thread_page_size: page_size_var("THREAD_PAGE_SIZE"),
            moderation_page_size: page_size_var("MODERATION_PAGE_SIZE"),
        }
    }
}

/// Reads a page size, defaulting to 20 and capped at 100.
fn page_size_var(name: &str) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(20)
        .clamp(1, 100)
}
