//! Command-line interface for virtufit.
//!
//! Provides commands for bucket provisioning, model generation, preview
//! rendering, garment try-on, and deployment health checks.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
