//! VidSync CLI: align a distorted encode to its reference and score it.
//!
//! Usage:
//!   vidsync align <REFERENCE> <DISTORTED>   Sync, trim, locate, and run VMAF
//!   vidsync sync <VIDEO>                    Find the sync point only
//!   vidsync locate <VIDEO> <MARKER>         Find a marker in a video
//!   vidsync report <VMAF_JSON>              Summarise a VMAF report
//!   vidsync check                           Check external tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vidsync_common::clock::RunClock;
use vidsync_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "vidsync",
    about = "Frame-accurate video sync detection and VMAF scoring",
    version,
    author
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, alias = "debug")]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/vidsync/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align a distorted video to its reference and run VMAF
    Align {
        /// Reference video file (source)
        reference: PathBuf,

        /// Distorted video file (test)
        distorted: PathBuf,

        /// Seconds kept after the sync point before trimming
        #[arg(long)]
        buffer: Option<f64>,

        /// Skip this many seconds of the distorted video before the sync search
        #[arg(long, default_value = "0.0")]
        seek_distorted: f64,

        /// Directory the results directory is created in
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Consecutive readings required to accept a marker transition
        #[arg(long)]
        confirm_frames: Option<usize>,

        /// Stop after locating the reference offset
        #[arg(long)]
        skip_vmaf: bool,
    },

    /// Find where a video starts showing new frame markers
    Sync {
        /// Video file to scan
        video: PathBuf,

        /// Seconds skipped before scanning
        #[arg(long, default_value = "0.0")]
        seek: f64,

        /// Print the sync point as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the first frame showing a marker value
    Locate {
        /// Video file to scan
        video: PathBuf,

        /// Marker value to look for
        marker: u64,

        /// Seconds scanned from the start of the video
        #[arg(long)]
        window: Option<f64>,
    },

    /// Summarise a VMAF JSON report into quality buckets
    Report {
        /// Path to the VMAF JSON report
        path: PathBuf,

        /// CSV output path (defaults to <report>_summary.csv)
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Check that external tools are installed
    Check,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    // An alignment run logs into its own results directory.
    let clock = RunClock::start();
    let layout = match &cli.command {
        Commands::Align {
            distorted,
            output_dir,
            ..
        } => {
            let layout = commands::align::ResultsLayout::new(output_dir, distorted, clock.stamp());
            layout.create()?;
            config.logging.file = Some(layout.log.clone());
            Some(layout)
        }
        _ => None,
    };
    vidsync_common::logging::init_logging(&config.logging);
    config.sync.validate()?;

    match cli.command {
        Commands::Align {
            reference,
            distorted,
            buffer,
            seek_distorted,
            output_dir: _,
            confirm_frames,
            skip_vmaf,
        } => {
            if let Some(buffer) = buffer {
                config.sync.buffer_secs = buffer;
            }
            if let Some(confirm_frames) = confirm_frames {
                config.sync.confirm_frames = confirm_frames;
            }
            config.sync.validate()?;
            let layout = layout.ok_or_else(|| anyhow::anyhow!("results directory missing"))?;
            commands::align::run(
                &config,
                commands::align::AlignArgs {
                    reference,
                    distorted,
                    seek_distorted_secs: seek_distorted,
                    skip_vmaf,
                },
                &layout,
                &clock,
            )
        }
        Commands::Sync { video, seek, json } => commands::sync::run(&config, video, seek, json),
        Commands::Locate {
            video,
            marker,
            window,
        } => commands::locate::run(&config, video, marker, window),
        Commands::Report { path, csv } => commands::report::run(path, csv),
        Commands::Check => commands::check::run(&config),
    }
}
