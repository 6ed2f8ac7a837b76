//! CLI for the FinSight gateway

pub mod serve;

use clap::{Parser, Subcommand};

/// FinSight API Gateway - key management and usage metering
#[derive(Parser)]
#[command(name = "finsight-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the API server
    Serve,
}
