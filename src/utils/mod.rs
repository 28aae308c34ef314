//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Process execution with captured output
//! - `files` - Glob expansion relative to a base directory
//! - `io` - File I/O with consistent error handling
//! - `logging` - Tracing subscriber setup
//! - `shell` - Shell quoting for command previews
//! - `suggest` - Nearest-name suggestions for typos

pub mod command;
pub mod files;
pub mod io;
pub mod logging;
pub mod shell;
pub mod suggest;
