//! CLI layer for RLG-RS.
//!
//! Provides the command-line interface using clap, with commands for
//! ingesting documents, querying with grounding, and inspecting the
//! corpus.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
