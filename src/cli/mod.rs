//! Command-line interface for arcus.

mod commands;

pub use commands::{is_verbose, run};
