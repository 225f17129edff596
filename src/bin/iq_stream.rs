use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use rsa_capture::iqstream;
use rsa_capture::iqstream::IqStreamConfig;
use rsa_capture::Args;
use rsa_capture::Device;

const USAGE: &str = "\
Stream IQ samples of a Tektronix RSA to a TIQ file

Usage: iq_stream [key=value]...

  dev=<id>       device ID (0)
  cf=<Hz>        center frequency (1e9)
  rl=<dBm>       reference level (0)
  bw=<Hz>        acquisition bandwidth (40e6)
  msec=<ms>      file length (1000)
  fn=<name>      file name without extension (iqstream)
  driver=<name>  driver to use (rsa, dummy)
  stall_ms=<ms>  restart the stream once after this long without progress (3000)

Set RUST_LOG to change the log level.";

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let tokens: Vec<String> = std::env::args().skip(1).collect();
    if tokens.iter().any(|t| t == "-h" || t == "--help") {
        println!("{USAGE}");
        return Ok(());
    }
    let config = match Args::from_tokens(&tokens).and_then(|a| IqStreamConfig::from_args(&a)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid arguments ({e})\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    ctrlc::set_handler(move || c.store(true, Ordering::Relaxed))?;

    let dev = Device::from_args(config.device_args())?;
    log::info!("device: {}", dev.info()?);

    let report = iqstream::stream(&dev, &config, &cancel, |samples, expected| {
        let percent = if expected > 0 {
            100.0 * samples as f64 / expected as f64
        } else {
            0.0
        };
        println!("{samples} / {expected} samples ({percent:.0}%)");
    })?;
    println!(
        "{}.tiq: {} samples at {} S/s{}",
        config.filename,
        report.samples,
        report.sample_rate,
        if report.restarted {
            " (restarted once)"
        } else {
            ""
        }
    );
    if report.acq_status != 0 {
        log::warn!(
            "acquisition status 0x{:08x}, data may be incomplete",
            report.acq_status
        );
    }
    Ok(())
}
