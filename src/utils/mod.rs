//! Shared utilities

pub mod error;
pub mod time;
pub mod validation;

pub use error::{AppError, AppResult};
