pub mod auth;
pub mod body;
pub mod chat;
pub mod error;
pub mod health;
pub mod models;
pub mod root;

pub use error::AppError;
