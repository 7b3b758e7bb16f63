//! Gatekeeper - Per-key Fixed-Window Rate Limiting Service
//!
//! This crate implements isolated per-key counters with serialized
//! fixed-window accounting, and an axum middleware that consults them,
//! translates decisions into `X-RateLimit-*` headers and 429 responses,
//! and fails open when the counters cannot be reached.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
