//! DevWrite auth service
//!
//! Multi-device session and token-rotation engine backing the DevWrite
//! platform: short-lived access tokens, per-device rotating refresh
//! tokens, reuse detection, and selective revocation.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
