//! CLI module for nexus - command-line interface and subcommands.
//!
//! Provides the subcommands and the terminal rendering of framed events.

pub mod commands;
pub mod render;

pub use commands::Cli;
