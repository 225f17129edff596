//! Stream IQ samples to a TIQ file, polling the device until the file is complete.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde_with::serde_as;
use serde_with::DisplayFromStr;

use crate::poll::StagnationTimer;
use crate::Args;
use crate::Device;
use crate::DeviceTrait;
use crate::Error;
use crate::IqStreamSettings;
use crate::IqStreamer;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

fn default_center() -> f64 {
    1e9
}
fn default_bandwidth() -> f64 {
    40e6
}
fn default_length() -> u32 {
    1000
}
fn default_filename() -> String {
    "iqstream".to_string()
}
fn default_stall() -> u64 {
    3000
}

/// Stream configuration, deserialized from `key=value` [`Args`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IqStreamConfig {
    /// Device id (`dev`).
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "dev", default)]
    pub device: i32,
    /// Center frequency in Hz (`cf`).
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "cf", default = "default_center")]
    pub center: f64,
    /// Reference level in dBm (`rl`).
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "rl", default)]
    pub reference_level: f64,
    /// Acquisition bandwidth in Hz (`bw`).
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "bw", default = "default_bandwidth")]
    pub bandwidth: f64,
    /// Length of the file in milliseconds (`msec`).
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "msec", default = "default_length")]
    pub length_ms: u32,
    /// File name without extension (`fn`).
    #[serde(rename = "fn", default = "default_filename")]
    pub filename: String,
    /// Driver to open, all compiled-in drivers are tried if unset.
    #[serde(default)]
    pub driver: Option<String>,
    /// Restart the stream once if the sample count does not change for this long.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_stall")]
    pub stall_ms: u64,
}

impl Default for IqStreamConfig {
    fn default() -> Self {
        Self {
            device: 0,
            center: default_center(),
            reference_level: 0.0,
            bandwidth: default_bandwidth(),
            length_ms: default_length(),
            filename: default_filename(),
            driver: None,
            stall_ms: default_stall(),
        }
    }
}

impl IqStreamConfig {
    /// Parse and validate the configuration.
    pub fn from_args(args: &Args) -> Result<Self, Error> {
        let config: Self = args.deserialize()?;
        if config.length_ms == 0 || config.bandwidth <= 0.0 || config.filename.is_empty() {
            return Err(Error::ValueError);
        }
        // a zero limit would count every poll as a stall
        if config.stall_ms == 0 {
            return Err(Error::ValueError);
        }
        Ok(config)
    }

    /// [`Args`] selecting the device to open.
    pub fn device_args(&self) -> Args {
        let mut a = Args::new();
        a.set("id", self.device.to_string());
        if let Some(d) = &self.driver {
            a.set("driver", d.clone());
        }
        a
    }
}

/// Outcome of a completed stream.
#[derive(Debug, Clone, PartialEq)]
pub struct IqReport {
    /// Samples in the file.
    pub samples: u64,
    /// Actual acquisition bandwidth in Hz.
    pub bandwidth: f64,
    /// Sample rate in samples/s.
    pub sample_rate: f64,
    /// The stream stalled once and was restarted.
    pub restarted: bool,
    /// Last non-zero acquisition status, zero if the data is clean.
    pub acq_status: u32,
}

/// Configure IQ streaming on `dev` and write one TIQ file.
///
/// If the sample count stagnates for `config.stall_ms`, the stream is restarted once. A
/// second stall gives up with [`Error::Stalled`]. The stream is stopped on every exit path.
///
/// `progress` is called with `(samples, expected)` on the first poll, every 500 ms after
/// that, and once more when the file is complete.
pub fn stream<T, F>(
    dev: &Device<T>,
    config: &IqStreamConfig,
    cancel: &AtomicBool,
    mut progress: F,
) -> Result<IqReport, Error>
where
    T: DeviceTrait,
    F: FnMut(u64, u64),
{
    dev.preset()?;
    dev.set_frequency(config.center)?;
    dev.set_reference_level(config.reference_level)?;

    let settings = IqStreamSettings::tiq(config.bandwidth, config.filename.clone(), config.length_ms);
    let mut iq = dev.iq_streamer(&settings)?;
    let (bandwidth, sample_rate) = iq.acq_parameters()?;
    let expected = (sample_rate * config.length_ms as f64 / 1000.0) as u64;
    log::info!(
        "IQ stream: bandwidth {bandwidth} Hz, sample rate {sample_rate} S/s, {expected} samples to {}",
        config.filename
    );

    iq.activate()?;
    let res = poll(&mut iq, config, expected, cancel, &mut progress);
    let stopped = iq.deactivate();
    let (samples, restarted, acq_status) = res?;
    stopped?;

    Ok(IqReport {
        samples,
        bandwidth,
        sample_rate,
        restarted,
        acq_status,
    })
}

fn poll<S: IqStreamer, F: FnMut(u64, u64)>(
    iq: &mut S,
    config: &IqStreamConfig,
    expected: u64,
    cancel: &AtomicBool,
    progress: &mut F,
) -> Result<(u64, bool, u32), Error> {
    let mut stagnation = StagnationTimer::new(Duration::from_millis(config.stall_ms));
    let mut restarted = false;
    let mut acq_status = 0;
    let mut last_report: Option<Instant> = None;

    loop {
        if cancel.load(Ordering::Relaxed) {
            log::warn!("IQ stream cancelled");
            return Err(Error::Cancelled);
        }

        let status = iq.write_status()?;
        let info = iq.file_info()?;
        if info.acq_status != 0 && info.acq_status != acq_status {
            log::warn!("acquisition status 0x{:08x}", info.acq_status);
            acq_status = info.acq_status;
        }
        if status.complete {
            progress(info.samples, expected);
            log::info!("IQ stream complete, {} samples", info.samples);
            return Ok((info.samples, restarted, acq_status));
        }

        let now = Instant::now();
        stagnation.observe(info.samples, now);
        if stagnation.is_stalled(now) {
            if restarted {
                log::error!(
                    "IQ stream stalled again at {} samples, giving up",
                    info.samples
                );
                return Err(Error::Stalled);
            }
            log::warn!(
                "IQ stream stalled at {} samples for {:?}, restarting",
                info.samples,
                stagnation.idle(now)
            );
            iq.deactivate()?;
            iq.activate()?;
            restarted = true;
            stagnation.restart(Instant::now());
            continue;
        }

        if last_report.map_or(true, |t| now.duration_since(t) >= PROGRESS_INTERVAL) {
            progress(info.samples, expected);
            log::debug!(
                "{} / {expected} samples{}",
                info.samples,
                if status.writing { "" } else { ", waiting" }
            );
            last_report = Some(now);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::impls::Dummy;

    fn base(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("iq-{}-{}", std::process::id(), name))
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn config_defaults() {
        let c = IqStreamConfig::from_args(&Args::new()).unwrap();
        assert_eq!(c, IqStreamConfig::default());
    }

    #[test]
    fn config_from_tokens() {
        let a = Args::from_tokens(["dev=1", "cf=2.4e9", "rl=-10", "bw=20e6", "msec=250", "fn=cap"])
            .unwrap();
        let c = IqStreamConfig::from_args(&a).unwrap();
        assert_eq!(c.device, 1);
        assert_eq!(c.center, 2.4e9);
        assert_eq!(c.reference_level, -10.0);
        assert_eq!(c.bandwidth, 20e6);
        assert_eq!(c.length_ms, 250);
        assert_eq!(c.filename, "cap");
        assert_eq!(c.device_args().get::<i32>("id").unwrap(), 1);
        assert!(matches!(c.device_args().get::<String>("driver"), Err(Error::NotFound)));
    }

    #[test]
    fn config_rejects() {
        for t in ["foo=1", "cf=abc", "msec=0", "msec=-5", "bw=0", "stall_ms=0"] {
            let a = Args::from_tokens([t]).unwrap();
            assert!(IqStreamConfig::from_args(&a).is_err(), "{t}");
        }
    }

    #[test]
    fn file_name_with_separators() {
        let a = Args::from_tokens(["fn=my capture", "stall_ms=500"]).unwrap();
        let c = IqStreamConfig::from_args(&a).unwrap();
        assert_eq!(c.filename, "my capture");
        assert_eq!(c.stall_ms, 500);
    }

    #[test]
    fn stream_completes() {
        let b = base("complete");
        let dev = Device::from_device(Dummy::open("").unwrap());
        let c = IqStreamConfig {
            bandwidth: 1e6,
            length_ms: 100,
            filename: b.clone(),
            ..Default::default()
        };
        let mut updates = Vec::new();
        let r = stream(&dev, &c, &AtomicBool::new(false), |s, e| updates.push((s, e))).unwrap();
        assert_eq!(r.samples, 140_000);
        assert_eq!(r.bandwidth, 1e6);
        assert!(updates.len() >= 2);
        assert_eq!(updates.last(), Some(&(140_000, 140_000)));
        assert!(updates.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(!r.restarted);
        assert_eq!(r.acq_status, 0);
        std::fs::remove_file(format!("{b}.tiq")).unwrap();
    }

    #[test]
    fn stream_restarts_once() {
        let b = base("restart");
        let dev = Device::from_device(Dummy::open("iq_stall_at=1000").unwrap());
        let c = IqStreamConfig {
            bandwidth: 1e6,
            length_ms: 100,
            filename: b.clone(),
            stall_ms: 50,
            ..Default::default()
        };
        let r = stream(&dev, &c, &AtomicBool::new(false), |_, _| {}).unwrap();
        assert!(r.restarted);
        assert_eq!(r.samples, 140_000);
        std::fs::remove_file(format!("{b}.tiq")).unwrap();
    }

    #[test]
    fn stream_gives_up_after_second_stall() {
        let dev = Device::from_device(Dummy::open("iq_stall_at=1000,iq_stall_runs=2").unwrap());
        let c = IqStreamConfig {
            bandwidth: 1e6,
            length_ms: 100,
            filename: base("stalled"),
            stall_ms: 30,
            ..Default::default()
        };
        assert!(matches!(
            stream(&dev, &c, &AtomicBool::new(false), |_, _| {}),
            Err(Error::Stalled)
        ));
    }

    #[test]
    fn stream_cancelled() {
        let dev = Device::from_device(Dummy::open("").unwrap());
        let c = IqStreamConfig {
            filename: base("cancel"),
            ..Default::default()
        };
        assert!(matches!(
            stream(&dev, &c, &AtomicBool::new(true), |_, _| {}),
            Err(Error::Cancelled)
        ));
    }
}
