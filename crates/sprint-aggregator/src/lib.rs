//! Sprint report orchestration (§4.D): fan-out over the tracker and SCM
//! clients, issue↔commit↔PR correlation, deterministic metrics, and the
//! forward-looking forecast, assembled into a single [`sprint_core::types::SprintReport`].

pub mod burndown;
pub mod correlation;
pub mod forward_looking;
pub mod metrics;
pub mod request;
pub mod service;
pub mod velocity;

pub use request::ReportRequest;
pub use service::AggregationService;
