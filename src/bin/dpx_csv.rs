use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::ArgAction;
use clap::Parser;
use log::LevelFilter;

use rsa_capture::dpx;
use rsa_capture::dpx::DpxConfig;
use rsa_capture::Args;
use rsa_capture::Device;

/// Export DPX spectrum frames of a Tektronix RSA to CSV
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Device ID, as reported by the device search
    #[arg(long, default_value_t = 0)]
    device: i32,
    /// Center frequency in Hz
    #[arg(long, default_value_t = 1e9)]
    center: f64,
    /// Span in Hz
    #[arg(long, default_value_t = 40e6)]
    bandwidth: f64,
    /// Resolution bandwidth in Hz
    #[arg(long, default_value_t = 300e3)]
    rbw: f64,
    /// Points per CSV row
    #[arg(long, default_value_t = 801)]
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    tracelength: u32,
    /// Number of frames to export
    #[arg(long, default_value_t = 10)]
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    frames: u32,
    /// Reference level in dBm
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    reflevel: f64,
    /// DPX spectrum trace to export
    #[arg(long, default_value_t = 0)]
    #[arg(value_parser = clap::value_parser!(u8).range(0..3))]
    traceindex: u8,
    /// Driver to use (rsa, dummy)
    #[arg(long)]
    driver: Option<String>,
    /// Timeout of a single wait for a frame in ms
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u32,
    /// Consecutive timeouts before giving up
    #[arg(long, default_value_t = 5)]
    max_timeouts: u32,
    /// Directory of the CSV file
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// More output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Less output
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,
}

fn level(verbose: u8, quiet: u8) -> LevelFilter {
    match (verbose, quiet) {
        (_, 1) => LevelFilter::Warn,
        (_, q) if q > 1 => LevelFilter::Error,
        (0, _) => LevelFilter::Info,
        (1, _) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(level(cli.verbose, cli.quiet))
        .parse_default_env()
        .init();

    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    ctrlc::set_handler(move || c.store(true, Ordering::Relaxed))?;

    let mut args = Args::new();
    args.set("id", cli.device.to_string());
    if let Some(d) = &cli.driver {
        args.set("driver", d.as_str());
    }
    let dev = Device::from_args(args)?;
    log::info!("device: {}", dev.info()?);

    let config = DpxConfig {
        device: cli.device,
        center: cli.center,
        bandwidth: cli.bandwidth,
        rbw: cli.rbw,
        trace_length: cli.tracelength as usize,
        frames: cli.frames,
        reference_level: cli.reflevel,
        trace_index: cli.traceindex as usize,
        timeout_ms: cli.timeout_ms,
        max_timeouts: cli.max_timeouts,
    };
    let report = dpx::export(&dev, &config, &cli.output_dir, &cancel)?;

    if report.timed_out {
        log::warn!(
            "only {} of {} frames acquired ({} timeouts)",
            report.frames,
            config.frames,
            report.timeouts
        );
    }
    println!("{} frames written to {}", report.frames, report.path.display());
    Ok(())
}
