//! Backend API
//!
//! Auth and stats queries against the hosted backend.

pub mod client;

pub use client::{get_settings, load_user_stats, BackendSettings};
