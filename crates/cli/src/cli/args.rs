pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(about = "Identity, signing and key sharing tools for Hearth shared ledgers")]
pub struct Args {
    /// Path to the hearth config directory (defaults to ~/.hearth)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
