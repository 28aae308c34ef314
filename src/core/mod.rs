// Public modules
pub mod context;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod lock;
pub mod manifest;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod template;
pub mod tools;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use executor::{ExecutionResult, RunStatus};
pub use pipeline::Pipeline;
