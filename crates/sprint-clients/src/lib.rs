//! Upstream client layer (§4.C): a common cache/rate-limit/circuit-breaker
//! pipeline shared by the issue-tracker REST client and the dual
//! REST+GraphQL SCM client.

pub mod error;
pub mod pipeline;
pub mod scm;
pub mod tracker;

pub use pipeline::RequestPipeline;
pub use scm::{ScmClient, ScmConfig};
pub use tracker::{normalize_issue_key, TrackerClient, TrackerConfig};
