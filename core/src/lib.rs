// Core inference functionality shared by the orchestrator and the CLI:
// - Chat-completion client with bounded retry
// - Request/response data structures
// - Configuration loading
// - Shared error types

// Export client module - Chat-completion client and backend trait
pub mod client;
pub use client::*;

// Export types module - Request/response data structures
pub mod types;
pub use types::*;

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;
