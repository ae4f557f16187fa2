use clap::Parser;
use std::path::PathBuf;

use pave_ingest::config;

#[derive(Parser, Debug)]
#[command(name = "pave-ingest")]
#[command(version)]
#[command(about = "Ingest PaVE-encapsulated drone video over TCP", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/pave-ingest.toml")]
    pub config: PathBuf,

    /// Drone name used with --drone-ip / --drone-port
    #[arg(short, long, default_value = "drone")]
    pub name: String,

    /// Drone IP address (overrides the configured one)
    #[arg(long)]
    pub drone_ip: Option<String>,

    /// Drone video port
    #[arg(long)]
    pub drone_port: Option<u16>,

    /// Working buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Connect/receive timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory for raw stream recordings
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Write a JSON-lines frame index next to each recording
    #[arg(long, action)]
    pub metadata: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }
}
