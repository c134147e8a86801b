//! The tool registry (§4.E): validated, quota-enforced, uniform
//! request/response dispatch over the aggregation service and upstream
//! clients. Exposes `ToolRegistry::invoke` as a plain async function rather
//! than a JSON-RPC method handler — the (out-of-scope) MCP/HTTP adapters
//! are expected to graft their own transport on top of this.

pub mod context;
pub mod envelope;
pub mod handlers;
pub mod registry;
pub mod schema;
mod validate;

pub use context::ToolContext;
pub use envelope::{ToolError, ToolResponse};
pub use registry::ToolRegistry;
pub use schema::{tool_definitions, ToolDefinition};
