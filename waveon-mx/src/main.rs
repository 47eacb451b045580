//! Waveon mixer (waveon-mx) - Main entry point
//!
//! Mixes a primary (center channel) WAV file with auxiliary mono WAV files
//! into a new output file, one segment at a time, through a single
//! exclusive memory mapping.
//!
//! Exit codes:
//! - 0: success
//! - 2: usage or configuration error
//! - 3: file I/O error
//! - 4: unsupported or non-mono file
//! - 5: auxiliary channel not found
//! - 6: sample range out of bounds
//! - 7: auxiliary length differs from primary
//! - 70: internal error

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waveon_common::config::{ConfigOverrides, ConfigResolver};
use waveon_common::{CombineMode, MixConfig};
use waveon_mx::{ChannelMapper, ChannelSelector, MixError, MixSettings, MixingDriver};

/// Command-line arguments for waveon-mx
#[derive(Parser, Debug)]
#[command(name = "waveon-mx")]
#[command(about = "Mix auxiliary mono channels into a primary WAV file, segment by segment")]
#[command(version)]
struct Args {
    /// Primary (center channel) WAV file
    primary: PathBuf,

    /// Auxiliary channel WAV files, mixed in the order given
    auxiliaries: Vec<PathBuf>,

    /// Directory whose files are appended as auxiliary channels (sorted by name)
    #[arg(short = 'd', long)]
    aux_dir: Option<PathBuf>,

    /// Output WAV file
    #[arg(short, long, default_value = "tmp.wav")]
    output: PathBuf,

    /// Samples per segment
    #[arg(short, long, env = "WAVEON_SEGMENT_SIZE")]
    segment_size: Option<usize>,

    /// Fixed header length in bytes
    #[arg(long)]
    header_size: Option<usize>,

    /// Gain for the next auxiliary channel (repeat once per channel)
    #[arg(short, long = "gain", allow_negative_numbers = true)]
    gains: Vec<f64>,

    /// Gain for auxiliary channels without an explicit --gain
    #[arg(long, allow_negative_numbers = true)]
    default_gain: Option<f64>,

    /// How auxiliary channels are combined: subtract or add
    #[arg(long)]
    combine: Option<CombineMode>,

    /// Config file (overrides WAVEON_CONFIG and the platform config file)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,

    /// Re-read the output header after mixing and compare it to the primary's
    #[arg(long)]
    verify_header: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Config is resolved before tracing so the configured level applies;
    // errors are reported once logging is up
    let config = load_config(&args);
    let level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("waveon_mx={level},waveon_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting waveon-mx v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let result = config.and_then(|config| run(&args, &config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            exit_code(&e)
        }
    }
}

fn load_config(args: &Args) -> Result<MixConfig> {
    let overrides = ConfigOverrides {
        segment_size: args.segment_size,
        header_size: args.header_size,
        default_gain: args.default_gain,
        combine: args.combine,
        log_level: args.log_level.clone(),
    };
    let config = ConfigResolver::new(args.config.clone())
        .resolve()
        .context("Failed to load configuration")?;
    config
        .with_overrides(overrides)
        .context("Invalid configuration")
}

fn run(args: &Args, config: &MixConfig) -> Result<()> {
    let auxiliaries = collect_auxiliaries(args)?;
    if auxiliaries.is_empty() {
        warn!("No auxiliary channels given; output will be a copy of the primary");
    }
    for (index, path) in auxiliaries.iter().enumerate() {
        info!("Auxiliary #{}: {}", index, path.display());
    }

    let settings = MixSettings::from_config(config, args.gains.clone());
    let mapper = ChannelMapper::new(&args.primary, auxiliaries, settings.header_size)
        .with_context(|| format!("Failed to open primary {}", args.primary.display()))?;

    let mut driver = MixingDriver::new(mapper, settings).context("Channel validation failed")?;
    driver
        .set_output(&args.output)
        .with_context(|| format!("Failed to create output {}", args.output.display()))?;
    let report = driver.run().context("Mixing pass failed")?;

    info!(
        "Wrote {} ({} samples, {} segments, {} auxiliary channels)",
        args.output.display(),
        report.samples,
        report.segments,
        report.auxiliary_channels
    );

    if args.verify_header {
        verify_header(driver.into_mapper())?;
    }
    Ok(())
}

/// Positional auxiliaries followed by the sorted contents of `--aux-dir`
fn collect_auxiliaries(args: &Args) -> Result<Vec<PathBuf>> {
    let mut auxiliaries = args.auxiliaries.clone();

    if let Some(dir) = &args.aux_dir {
        let excluded = [canonical(&args.primary), canonical(&args.output)];
        let mut listed = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to list auxiliary directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && !excluded.contains(&canonical(&path)) {
                listed.push(path);
            }
        }
        listed.sort();
        auxiliaries.extend(listed);
    }

    Ok(auxiliaries)
}

fn canonical(path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).ok()
}

fn verify_header(mut mapper: ChannelMapper) -> Result<()> {
    let header_size = mapper.header_size();
    let primary = mapper
        .open_raw(ChannelSelector::Primary)?
        .read_raw(0..header_size)?;
    let output = mapper
        .open_raw(ChannelSelector::Output)?
        .read_raw(0..header_size)?;
    mapper.close();

    if primary != output {
        bail!("Output header differs from primary header");
    }
    info!("Output header matches primary ({} bytes)", header_size);
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    if let Some(mix) = err.downcast_ref::<MixError>() {
        let code = match mix {
            MixError::Config(_) => 2,
            MixError::Io { .. } => 3,
            MixError::Format { .. } | MixError::NotMono { .. } => 4,
            MixError::ChannelNotFound { .. } => 5,
            MixError::OutOfRange { .. } => 6,
            MixError::LengthMismatch { .. } => 7,
            MixError::NotMapped { .. } | MixError::OutputNotSet => 70,
        };
        return ExitCode::from(code);
    }
    if err.downcast_ref::<waveon_common::Error>().is_some() {
        return ExitCode::from(2);
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return ExitCode::from(3);
    }
    ExitCode::from(70)
}
