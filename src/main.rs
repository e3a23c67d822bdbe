//! AcousticGuard - an acoustic anomaly monitor for Linux
//!
//! This is the main entry point for the acousticguard binary.

mod app;
mod audio;
mod cli;
mod models;
mod session;
mod settings;
mod waveform;

use clap::Parser;
use cli::Command;
use log::{error, info};
use session::SessionStore;
use settings::MonitorConfig;

fn main() {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    let store = SessionStore::new();

    let result = match args.command {
        Command::Monitor {
            duration_secs,
            threshold_db,
        } => {
            let mut config = MonitorConfig::load();
            if let Some(threshold) = threshold_db {
                config.db_threshold = threshold;
            }
            info!(
                "starting monitor: {} Hz, threshold {} dB, window {}",
                config.sample_rate, config.db_threshold, config.live_window
            );
            app::run_monitor(&store, config, duration_secs)
        }
        Command::List => app::run_list(&store),
        Command::Show { base_name } => app::run_show(&store, &base_name),
        Command::Play { base_name, seek } => app::run_play(&store, &base_name, seek),
        Command::Config { threshold_db } => app::run_config(threshold_db),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
