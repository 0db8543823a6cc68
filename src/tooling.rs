//! Tooling & Integration Layer
//!
//! Command-line front end over the driver, stores and scheduler.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
