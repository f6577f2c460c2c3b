//! fairshare-api: REST API server for fairshare
//!
//! This crate provides a read-only REST API over the scheduler state:
//! - Cached historical usage, including staleness
//! - The queue tree with per-queue usage
//! - System status

pub mod rest;

pub use rest::{create_router, AppState};
