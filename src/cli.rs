//! Command-line interface for AcousticGuard
//!
//! Handles argument parsing and logging configuration.

use clap::{Parser, Subcommand};
use log::LevelFilter;

/// AcousticGuard - acoustic anomaly monitor and session player
#[derive(Parser, Debug)]
#[command(name = "acousticguard")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// default = info, -v = debug, -vv = trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Monitor the microphone, flag loud events, and save the session
    Monitor {
        /// Stop after this many seconds instead of waiting for Enter
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Override the configured anomaly threshold in dB
        #[arg(long)]
        threshold_db: Option<i32>,
    },
    /// List saved sessions, newest first
    List,
    /// Print a session's anomaly markers
    Show {
        /// Session base name, e.g. REC_1700000000000
        base_name: String,
    },
    /// Play a session with a live waveform cursor
    Play {
        /// Session base name, e.g. REC_1700000000000
        base_name: String,

        /// Start from this normalized position (clamped to 0.0 - 1.0)
        #[arg(long)]
        seek: Option<f32>,
    },
    /// Show the persisted monitor settings, or change them
    Config {
        /// Persist a new anomaly threshold in dB
        #[arg(long)]
        threshold_db: Option<i32>,
    },
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Info,
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    // Set our modules to the requested verbosity level
    builder.filter_module("acousticguard", args.log_level());

    builder.format_timestamp_millis().init();
}
