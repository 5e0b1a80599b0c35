use crate::console::VerbosityLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Increase verbosity (-v verbose, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode - only show errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to the router config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Route a task description through the layer cascade
    Route {
        description: String,

        /// Caller-supplied task id (generated if absent)
        #[arg(long)]
        task_id: Option<String>,

        /// Task metadata as key=value pairs
        #[arg(long = "meta")]
        meta: Vec<String>,
    },
    /// Attach an execution outcome to a finalized routing event
    Outcome {
        event_id: String,

        /// completed | failed | in_progress
        #[arg(long)]
        status: String,

        /// The routed target handled the task correctly
        #[arg(long, conflicts_with = "incorrect")]
        correct: bool,

        /// The routed target was wrong
        #[arg(long)]
        incorrect: bool,

        /// Target that should have been chosen instead
        #[arg(long)]
        corrected_to: Option<String>,

        /// Quality score in [0, 1]
        #[arg(long)]
        quality: Option<f64>,

        /// Completion time in minutes
        #[arg(long)]
        minutes: Option<f64>,
    },
    /// Recalibrate a layer's confidence threshold from recorded outcomes
    Tune {
        layer: String,

        #[arg(long, default_value_t = 168)]
        window_hours: i64,

        #[arg(long, default_value_t = 100)]
        min_samples: usize,

        #[arg(long, default_value_t = 0.05)]
        step: f64,

        /// Double the adjustment step
        #[arg(long)]
        aggressive: bool,
    },
    /// Summarize the routing event log
    Stats {
        #[arg(long)]
        window_hours: Option<i64>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Write a default config file
    Init,
}

impl Cli {
    pub fn get_verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else {
            match self.verbose {
                0 => VerbosityLevel::Normal,
                1 => VerbosityLevel::Verbose,
                _ => VerbosityLevel::Debug,
            }
        }
    }
}
