//! Thin command-line front end: argument parsing, logging setup, and the
//! URL-list file reader that feeds the orchestrator's input channel.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "webwitness")]
#[command(about = "Headless-browser web reconnaissance engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Number of concurrent workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Per-target navigation timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Enable verbose (debug) logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome/Chromium executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Connect to an already-running browser over this websocket URL")]
    pub wss_url: Option<String>,

    #[arg(long, help = "Directory screenshots are written to")]
    pub screenshot_path: Option<PathBuf>,

    #[arg(long, help = "Screenshot format (jpeg, png)")]
    pub screenshot_format: Option<String>,

    #[arg(long, help = "Append one JSON object per result to this file")]
    pub jsonl_output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a single URL.
    Single {
        #[arg(help = "URL to probe")]
        url: String,
    },

    /// Probe every URL in a file, one per line.
    Batch {
        #[arg(short, long, help = "Input file containing URLs (one per line)")]
        input: PathBuf,
    },

    /// Validate a configuration file without probing anything.
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

pub fn setup_logging(options: &crate::config::LoggingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let level = if options.silence {
        tracing::Level::ERROR
    } else if options.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}

/// Read non-empty, non-comment lines from a URL list file.
pub async fn read_urls_from_file(path: &PathBuf) -> Result<Vec<String>, std::io::Error> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect())
}
