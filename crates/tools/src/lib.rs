//! Flight-search tool for the SkyVoice orchestrator
//!
//! - MCP-style tool schema and error codes for the language model
//! - `FlightSearch` collaborator trait and search parameters
//! - Circuit breaker plus retrying, caching `ResilientFlightSearch`

pub mod circuit;
pub mod flight;
pub mod mcp;

pub use circuit::{CircuitBreaker, CircuitState, ResilientFlightSearch};
pub use flight::{
    FlightOption, FlightSearch, FlightSearchTool, SearchArguments, SearchOutcome, SearchParams,
    StubFlightSearch,
};
pub use mcp::{InputSchema, PropertySchema, Tool, ToolError, ToolSchema};

impl From<ToolError> for skyvoice_core::Error {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Timeout { timeout_ms, .. } => skyvoice_core::Error::ToolTimeout(timeout_ms),
            other => skyvoice_core::Error::Tool(other.to_string()),
        }
    }
}
