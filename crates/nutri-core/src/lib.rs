pub mod age;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod error;

// Re-export common error type
pub use error::{NutriError, Result, ValidationError};
