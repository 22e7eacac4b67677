//! Integration tests
//!
//! These tests use wiremock to stand in for listing sites and the
//! extraction API, and run fetchers and full harvests against them.

mod fetch_tests;
mod harvest_tests;
