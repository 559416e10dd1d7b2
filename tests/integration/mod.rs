//! Integration tests for MedSAS
//!
//! These tests verify the behavior of the API endpoints with a real
//! (temporary file) database and all middleware.

mod auth_tests;
mod entitlement_tests;
mod ledger_tests;
mod lifecycle_tests;
mod payment_tests;
