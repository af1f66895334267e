use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(version, about = "The Megaladon scripting language")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a source file with optional arguments
    Run {
        /// Path to the source file
        file: PathBuf,

        /// Arguments exposed to the program as the global `args` list
        args: Vec<String>,
    },

    /// Check a source file for lexical and syntax errors without running it
    Check {
        /// Path to the source file to check
        file: PathBuf,
    },

    /// Start an interactive REPL session
    Repl,
}
