//! Shared types, configuration, and error taxonomy for the sprint report
//! aggregation engine.
//!
//! This crate has no upstream-calling or caching logic of its own; it is the
//! common dependency every other crate in the workspace builds on:
//! - The sprint/issue/commit/PR/report data model (§3)
//! - The configuration contract (§6)
//! - The error taxonomy surfaced through tool responses (§7)
//! - Issue-key extraction and tier classification, used by both the client
//!   and aggregation layers

pub mod config;
pub mod error;
pub mod issue_keys;
pub mod tier;
pub mod types;
