//! This crate provides a salary statistics server. It computes aggregated statistics about
//! technology salaries, by role, level, location, currency and work model, from a table of
//! reported salary observations.
//!
//! Statistics for a role with no other filters may be served from precomputed per-role
//! aggregates, which are rebuilt out-of-band. Every other query is computed from the live
//! observations.
//!
//! The server is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of query strings, response data and stored
//!   aggregates.
//! * [rusqlite] provides the embedded SQLite observation store.
//! * [rust_decimal] provides exact fixed-point arithmetic for salary statistics.

pub mod app;
pub mod app_state;
pub mod breakdown;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod models;
pub mod refresh;
pub mod report;
pub mod reports;
pub mod resource_manager;
pub mod server;
pub mod statistics;
pub mod store;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod validated_query;
