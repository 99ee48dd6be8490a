//! Turnstile - Token-keyed Rate Limiting Service
//!
//! This crate implements an admission-control service: callers identified by
//! an opaque token are allowed a configurable number of requests per fixed
//! window. Counters live either in process memory or in Redis, so several
//! service instances can share one view of every token's usage.

pub mod config;
pub mod error;
pub mod http;
pub mod persist;
pub mod ratelimit;
