//! `streamfall` CLI - inspect and probe adaptive video sources

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use streamfall::headless::{probe, PlaybackReport, ProbeOptions};
use streamfall::{FailureMemory, ResolvedTarget, ResolverConfig, TargetResolver};

#[derive(Parser)]
#[command(name = "streamfall")]
#[command(about = "Resolve video sources to HLS or progressive playback")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/streamfall/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which target a source resolves to, without fetching anything
    Resolve {
        /// Source URL
        url: String,

        /// Treat the source as having failed HLS before
        #[arg(long)]
        failed: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a source and run playback against the network
    Probe {
        /// Source URL
        url: String,

        /// Pretend the element plays HLS natively
        #[arg(long)]
        native_hls: bool,

        /// Pretend autoplay is blocked
        #[arg(long)]
        block_autoplay: bool,

        /// Give up after this many seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = ResolverConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve { url, failed, json } => cmd_resolve(&config, &url, failed, json)?,
        Commands::Probe {
            url,
            native_hls,
            block_autoplay,
            timeout,
            json,
        } => {
            let options = ProbeOptions {
                native_hls,
                autoplay: !block_autoplay,
                timeout: Duration::from_secs(timeout),
            };
            cmd_probe(&config, &url, &options, json).await?;
        }
        Commands::Config => print!("{}", config.to_toml_string()?),
    }

    Ok(())
}

fn cmd_resolve(config: &ResolverConfig, url: &str, failed: bool, json: bool) -> Result<()> {
    let resolver = TargetResolver::new(config)?;
    let mut failures = FailureMemory::default();
    if failed {
        failures.mark(url);
    }
    let target = resolver.resolve(url, &failures);

    if json {
        println!("{}", serde_json::to_string_pretty(&target)?);
        return Ok(());
    }

    println!("Source: {url}");
    match &target {
        ResolvedTarget::Manifest { url, fallback } => {
            println!("Target: manifest");
            println!("Manifest: {url}");
            match fallback {
                Some(fallback) => println!("Fallback: {fallback}"),
                None => println!("Fallback: none"),
            }
        }
        ResolvedTarget::Progressive { url } => {
            println!("Target: progressive");
            println!("Progressive: {url}");
        }
    }
    Ok(())
}

async fn cmd_probe(
    config: &ResolverConfig,
    url: &str,
    options: &ProbeOptions,
    json: bool,
) -> Result<()> {
    let report = probe(url, config, options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.error.is_some() {
        std::process::exit(2);
    }
    Ok(())
}

fn print_report(report: &PlaybackReport) {
    println!("Source: {}", report.source);
    if let Some(target) = &report.initial_target {
        println!("Initial: {:?} {}", target.kind(), target.url());
    }
    if let Some(target) = &report.final_target {
        println!("Final: {:?} {}", target.kind(), target.url());
    }
    println!("State: {:?}", report.state);
    println!("Fell back: {}", report.fell_back);
    println!("Fragments buffered: {}", report.fragments_buffered);
    println!(
        "Playback: {} ({} attempt(s))",
        if report.playing { "started" } else { "not started" },
        report.play_attempts
    );
    for (i, src) in report.element_sources.iter().enumerate() {
        println!("  src[{i}] = {src}");
    }
    if report.timed_out {
        println!("Timed out");
    }
    if let Some(err) = &report.error {
        println!("Error: {err}");
    }
    println!("Time: {}ms", report.elapsed_ms);
}
