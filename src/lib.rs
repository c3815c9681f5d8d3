// src/lib.rs

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

// Entry points for embedders driving a thread or the moderation listing.
pub use engine::{ModerationView, ThreadSession};
pub use routes::create_router;
