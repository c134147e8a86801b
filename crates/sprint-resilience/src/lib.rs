//! Rate limiting and circuit breaking for calls to upstream providers (§4.B).
//!
//! [`rate_limiter`] and [`circuit_breaker`] are provider-agnostic primitives;
//! [`registry`] wires one instance of each per upstream provider name from
//! [`sprint_core::config::AggregationConfig`].

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod registry;
