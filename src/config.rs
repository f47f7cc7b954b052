use crate::storage::SourceOptions;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "htsfetch")]
#[command(about = "Indexed range queries over remote BAM and 2bit files")]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Per-attempt timeout for range fetches, in milliseconds
    #[arg(long, global = true, env = "HTSFETCH_TIMEOUT_MS", default_value = "30000")]
    pub timeout_ms: u64,

    /// Attempts before a range fetch is reported as unavailable
    #[arg(long, global = true, env = "HTSFETCH_MAX_ATTEMPTS", default_value = "3")]
    pub max_attempts: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print alignment records overlapping a region as JSON lines
    Reads {
        /// BAM file: local path, http(s):// or s3:// URL
        #[arg(long)]
        data: String,

        /// BAI index; defaults to the data location with `.bai` appended
        #[arg(long)]
        index: Option<String>,

        /// JSON manifest of per-reference index sections, loaded lazily
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Region as chr, chr:start-end or chr:start- (0-based, inclusive)
        #[arg(long)]
        region: String,

        /// Decode only position, flags, mapping quality and length
        #[arg(long)]
        light: bool,

        /// Keep read names in light mode
        #[arg(long)]
        include_name: bool,
    },

    /// Print reference bases of a 2bit file
    Sequence {
        /// 2bit file: local path, http(s):// or s3:// URL
        #[arg(long)]
        data: String,

        /// Region as chr:start-end (1-based, inclusive)
        #[arg(long)]
        region: String,
    },
}

impl Config {
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            max_attempts: self.max_attempts.max(1),
        }
    }
}
