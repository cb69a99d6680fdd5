//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - chat: send a message and stream the reply
//! - roadmap: generate a learning roadmap
//! - history: list conversations or show one
//! - models: list configured models

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Nexus - streaming tutor chat and roadmap generation
#[derive(Parser, Debug)]
#[command(name = "nexus")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Keep everything in memory instead of the data directory
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Print events in their `event:`/`data:` wire form
    #[arg(long, global = true)]
    pub raw: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a chat message and stream the reply
    Chat {
        /// Message text
        message: String,

        /// Continue an existing conversation
        #[arg(short = 's', long)]
        conversation: Option<String>,

        /// Model id (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,

        /// Show the model's reasoning when it supports it
        #[arg(short, long)]
        thinking: bool,
    },

    /// Generate a learning roadmap for a goal
    Roadmap {
        /// What to learn
        goal: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Current level (beginner, intermediate, advanced)
        #[arg(short, long)]
        level: Option<String>,

        #[arg(short, long)]
        difficulty: Option<String>,

        /// Hours available per week
        #[arg(long, default_value_t = 5)]
        hours: u32,

        /// Preferred learning style
        #[arg(long)]
        style: Option<String>,

        /// Model id (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List conversations, or show the turns of one
    History {
        /// Conversation to show
        conversation: Option<String>,
    },

    /// List configured models
    Models,
}
