use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::InjectionStrategy;

#[derive(Parser)]
#[command(name = "slux", about = "Inspect configs the way the mobile runtime sees them", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: TopCommand,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum TopCommand {
    /// Print the document after the tun descriptor splice
    Transform {
        /// Path to the JSON config
        path: PathBuf,

        /// Tunnel descriptor to splice into tun inbounds
        #[arg(long)]
        tun_fd: Option<i32>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Run the full typed decode and summarize the result
    Check {
        /// Path to the JSON config
        path: PathBuf,

        /// Tunnel descriptor supplied by the host
        #[arg(long)]
        tun_fd: Option<i32>,

        /// raw-splice or platform-delegate (defaults to the build's strategy)
        #[arg(long)]
        strategy: Option<InjectionStrategy>,
    },

    /// Print the library build version
    Version,
}
