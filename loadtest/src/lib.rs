//! Venue Load-Test Library
//!
//! Synthetic fixture generation plus virtual-user load orchestration against
//! the Venue API. The binary wires these together; integration tests use them
//! directly.

pub mod config;
pub mod fixture;
pub mod orchestrator;
pub mod profile;
pub mod transport;
pub mod users;
pub mod workflow;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use config::{Config, ProfileMode};
pub use fixture::{FixtureBatch, GenerationError, LiteralDialect, generate, write_artifact};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunResult, RunSummary, StopSignal};
pub use profile::{LoadProfile, LoadStage, ProfileError, Threshold};
pub use transport::{HttpTransport, Transport};
pub use users::{Credential, EmptyPoolError, UserSource};
pub use workflow::{SessionWorkflow, Workflow, basic_session};
