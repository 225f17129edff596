//! Export DPX spectrum frames to CSV.
//!
//! Each acquired frame becomes one row: the host timestamp followed by the selected trace in
//! dBm, resampled to the requested number of points. The header row holds the bin frequencies.
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use chrono::SecondsFormat;
use chrono::Utc;

use crate::convert::frequency_axis;
use crate::convert::resample;
use crate::convert::watts_to_dbm;
use crate::poll::TimeoutCounter;
use crate::Device;
use crate::DeviceTrait;
use crate::DpxSettings;
use crate::DpxStreamer;
use crate::Error;

/// What to acquire.
#[derive(Debug, Clone, PartialEq)]
pub struct DpxConfig {
    /// Device id used to connect, part of the file name.
    pub device: i32,
    /// Center frequency in Hz.
    pub center: f64,
    /// Span in Hz.
    pub bandwidth: f64,
    /// Resolution bandwidth in Hz.
    pub rbw: f64,
    /// Points per CSV row.
    pub trace_length: usize,
    /// Number of frames to write.
    pub frames: u32,
    /// Reference level in dBm.
    pub reference_level: f64,
    /// DPX spectrum trace to export.
    pub trace_index: usize,
    /// Timeout of a single wait for a frame.
    pub timeout_ms: u32,
    /// Consecutive timeouts tolerated before giving up.
    pub max_timeouts: u32,
}

impl Default for DpxConfig {
    fn default() -> Self {
        Self {
            device: 0,
            center: 1e9,
            bandwidth: 40e6,
            rbw: 300e3,
            trace_length: 801,
            frames: 10,
            reference_level: 0.0,
            trace_index: 0,
            timeout_ms: 1000,
            max_timeouts: 5,
        }
    }
}

/// Outcome of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct DpxReport {
    pub path: PathBuf,
    /// Rows written.
    pub frames: u32,
    /// Total number of wait timeouts.
    pub timeouts: u32,
    /// Stopped early, too many consecutive timeouts.
    pub timed_out: bool,
    /// Stopped early on request.
    pub cancelled: bool,
}

/// `dpx_<device>_<center>Hz_<bandwidth>Hz_<frames>frames.csv`
pub fn csv_file_name(config: &DpxConfig) -> String {
    format!(
        "dpx_{}_{:.0}Hz_{:.0}Hz_{}frames.csv",
        config.device, config.center, config.bandwidth, config.frames
    )
}

/// Header row: `timestamp` followed by the bin frequencies in Hz.
pub fn header(config: &DpxConfig) -> Vec<String> {
    std::iter::once("timestamp".to_string())
        .chain(
            frequency_axis(config.center, config.bandwidth, config.trace_length)
                .into_iter()
                .map(|f| format!("{f}")),
        )
        .collect()
}

/// Convert a trace in watts to dBm and resample it to `len` points.
pub fn trace_levels(watts: &[f32], len: usize) -> Vec<f32> {
    let dbm: Vec<f32> = watts
        .iter()
        .map(|w| watts_to_dbm(*w as f64) as f32)
        .collect();
    resample(&dbm, len)
}

/// Configure DPX on `dev`, then write `config.frames` frames to a CSV file in `dir`.
///
/// The loop ends early once more than `config.max_timeouts` waits in a row time out, or when
/// `cancel` is set. The file is complete up to that point in both cases.
pub fn export<T: DeviceTrait>(
    dev: &Device<T>,
    config: &DpxConfig,
    dir: &Path,
    cancel: &AtomicBool,
) -> Result<DpxReport, Error> {
    dev.preset()?;
    dev.set_frequency(config.center)?;
    dev.set_reference_level(config.reference_level)?;

    let mut settings = DpxSettings::new(config.bandwidth, config.rbw, config.reference_level);
    settings.trace_index = config.trace_index;
    let mut dpx = dev.dpx_streamer(&settings)?;
    let status = dpx.status()?;
    log::info!(
        "DPX configured: rbw {} Hz, trace length {}",
        status.rbw,
        status.trace_length
    );

    let path = dir.join(csv_file_name(config));
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(header(config))?;
    log::info!("writing {}", path.display());

    dpx.activate()?;
    let res = acquire(&mut dpx, &mut writer, config, cancel);
    let stopped = dpx.deactivate();
    writer.flush()?;
    let (frames, timeouts, timed_out, cancelled) = res?;
    stopped?;

    Ok(DpxReport {
        path,
        frames,
        timeouts,
        timed_out,
        cancelled,
    })
}

fn acquire<S: DpxStreamer, W: std::io::Write>(
    dpx: &mut S,
    writer: &mut csv::Writer<W>,
    config: &DpxConfig,
    cancel: &AtomicBool,
) -> Result<(u32, u32, bool, bool), Error> {
    let mut timeouts = TimeoutCounter::new(config.max_timeouts);
    let mut total_timeouts = 0;
    let mut frames = 0;

    while frames < config.frames {
        if cancel.load(Ordering::Relaxed) {
            log::warn!("cancelled after {frames} frames");
            return Ok((frames, total_timeouts, false, true));
        }

        if !dpx.wait_for_frame(config.timeout_ms)? {
            total_timeouts += 1;
            if timeouts.timeout() {
                log::warn!(
                    "no DPX frame after {} consecutive timeouts, stopping at {frames} frames",
                    timeouts.count()
                );
                return Ok((frames, total_timeouts, true, false));
            }
            log::debug!("DPX frame timeout ({} in a row)", timeouts.count());
            continue;
        }
        timeouts.reset();

        let trace = dpx.read_trace(config.trace_index)?;
        let levels = trace_levels(&trace.points, config.trace_length);
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        writer.write_record(
            std::iter::once(timestamp).chain(levels.iter().map(|l| format!("{l:.2}"))),
        )?;
        frames += 1;
        log::trace!(
            "frame {} (device frame {} at {:.6} s)",
            frames,
            trace.frame_count,
            trace.timestamp
        );
    }
    Ok((frames, total_timeouts, false, false))
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::impls::Dummy;

    fn temp_dir(name: &str) -> PathBuf {
        let d = std::env::temp_dir().join(format!("dpx-{}-{}", std::process::id(), name));
        std::fs::create_dir_all(&d).unwrap();
        d
    }

    fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut r = csv::Reader::from_path(path).unwrap();
        let header = r.headers().unwrap().iter().map(String::from).collect();
        let rows = r
            .records()
            .map(|rec| rec.unwrap().iter().map(String::from).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn file_name() {
        let c = DpxConfig {
            device: 1,
            center: 2.4e9,
            bandwidth: 40e6,
            frames: 100,
            ..Default::default()
        };
        assert_eq!(csv_file_name(&c), "dpx_1_2400000000Hz_40000000Hz_100frames.csv");
    }

    #[test]
    fn header_frequencies() {
        let c = DpxConfig {
            center: 1e9,
            bandwidth: 40e6,
            trace_length: 3,
            ..Default::default()
        };
        assert_eq!(header(&c), vec!["timestamp", "980000000", "1000000000", "1020000000"]);
    }

    #[test]
    fn levels_resampled() {
        let l = trace_levels(&[0.001, 0.0, 0.001], 5);
        assert_eq!(l.len(), 5);
        assert!(l[0].abs() < 1e-4);
        assert_eq!(l[2], -300.0);
        assert!(l[4].abs() < 1e-4);
    }

    #[test]
    fn export_frames() {
        let dir = temp_dir("export");
        let dev = Device::from_device(Dummy::open("").unwrap());
        let c = DpxConfig {
            frames: 4,
            trace_length: 101,
            reference_level: -20.0,
            ..Default::default()
        };
        let report = export(&dev, &c, &dir, &AtomicBool::new(false)).unwrap();
        assert_eq!(report.frames, 4);
        assert!(!report.timed_out);
        assert!(!report.cancelled);
        assert_eq!(report.path, dir.join(csv_file_name(&c)));
        assert_eq!(dev.frequency().unwrap(), 1e9);

        let (header, rows) = read_rows(&report.path);
        assert_eq!(header.len(), 102);
        assert_eq!(header[0], "timestamp");
        assert_eq!(rows.len(), 4);
        for row in rows {
            assert_eq!(row.len(), 102);
            assert!(chrono::DateTime::parse_from_rfc3339(&row[0]).is_ok());
            let levels: Vec<f64> = row[1..].iter().map(|v| v.parse().unwrap()).collect();
            // tone 10 dB below the reference level at the center bin
            assert_eq!(levels[50], -30.0);
            assert!(levels[0] < -80.0);
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn export_stops_after_timeouts() {
        let dir = temp_dir("timeouts");
        let dev = Device::from_device(Dummy::open("dpx_frames=2").unwrap());
        let c = DpxConfig {
            frames: 10,
            trace_length: 11,
            max_timeouts: 3,
            ..Default::default()
        };
        let report = export(&dev, &c, &dir, &AtomicBool::new(false)).unwrap();
        assert_eq!(report.frames, 2);
        assert_eq!(report.timeouts, 4);
        assert!(report.timed_out);

        let (_, rows) = read_rows(&report.path);
        assert_eq!(rows.len(), 2);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn export_cancelled() {
        let dir = temp_dir("cancel");
        let dev = Device::from_device(Dummy::open("").unwrap());
        let report = export(&dev, &DpxConfig::default(), &dir, &AtomicBool::new(true)).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.frames, 0);

        let (header, rows) = read_rows(&report.path);
        assert_eq!(header.len(), 802);
        assert!(rows.is_empty());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn export_rejects_bad_center() {
        let dir = temp_dir("center");
        let dev = Device::from_device(Dummy::open("").unwrap());
        let c = DpxConfig {
            center: 20e9,
            ..Default::default()
        };
        assert!(matches!(
            export(&dev, &c, &dir, &AtomicBool::new(false)),
            Err(Error::ValueError)
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
