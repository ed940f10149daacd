//! HTTP backend for a polling app: one-time code login, poll management
//! and voting over PostgreSQL.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod poll;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
