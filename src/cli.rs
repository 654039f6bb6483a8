use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Device configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of simulated devices attached
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub synthetic_devices: u32,

    /// Number of bodies the simulated tracker reports
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub synthetic_bodies: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lists attached devices and their serial numbers
    Devices,
    /// Streams from the configured device and reports frame counts
    Run {
        /// Stop after this many seconds
        #[arg(long, value_name = "N", default_value_t = 5)]
        seconds: u64,

        /// Write the last frame of every stream as PNG into this directory
        #[arg(long, value_name = "DIR")]
        dump: Option<PathBuf>,
    },
}
