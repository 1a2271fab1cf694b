//! adminctl - client library for the admin API
//!
//! Logs in against the backend, keeps the token pair fresh, and manages items
//! and users. The `adminctl` binary is a thin CLI over these modules.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
