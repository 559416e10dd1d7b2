//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Seeding helpers for tenants and users
//! - Request payload fixtures
//! - Test database setup and API test client

pub mod factories;
pub mod fixtures;
pub mod test_app;

pub use factories::*;
pub use fixtures::*;
pub use test_app::*;
