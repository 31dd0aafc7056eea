//! Integration tests for the catalog
//!
//! These tests use wiremock to stand in for the upstream marketplace and
//! drive synchronization, queries and analytics end-to-end.

mod common;
mod service_tests;
mod sync_tests;
