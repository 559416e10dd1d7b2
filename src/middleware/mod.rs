//! Middleware components
//!
//! This module contains middleware for:
//! - Authentication (JWT cookie or bearer token)
//! - Rate limiting
//! - Security and cache-control response headers

pub mod auth;
pub mod rate_limit;
pub mod security_headers;

pub use auth::{auth_middleware, AuthUser, Claims};
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitState};
pub use security_headers::{with_no_store, with_security_headers};
