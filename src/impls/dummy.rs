//! Simulated analyzer for CI
//!
//! Understands a few `Args` to provoke the failure paths of the acquisition loops:
//! * `dpx_frames=<n>`: only `n` DPX frames become ready, later waits time out.
//! * `iq_stall_at=<samples>`: IQ progress freezes at this sample count ...
//! * `iq_stall_runs=<n>`: ... during the first `n` stream activations (default 1).
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use crate::convert::dbm_to_watts;
use crate::Args;
use crate::DeviceTrait;
use crate::DpxSettings;
use crate::DpxStatus;
use crate::DpxTrace;
use crate::Driver;
use crate::Error;
use crate::FileInfo;
use crate::IqDestination;
use crate::IqStreamSettings;
use crate::Range;
use crate::VerticalUnit;
use crate::WriteStatus;

#[derive(Debug)]
struct State {
    frequency: f64,
    reference_level: f64,
    running: bool,
}

/// Dummy Device
#[derive(Clone)]
pub struct Dummy {
    id: i32,
    dpx_frames: Option<i64>,
    iq_stall_at: Option<u64>,
    iq_stall_runs: u32,
    state: Arc<Mutex<State>>,
}

/// Dummy DPX Streamer
pub struct DpxStreamer {
    state: Arc<Mutex<State>>,
    settings: DpxSettings,
    max_frames: Option<i64>,
    frame_count: i64,
    ready: bool,
}

/// Dummy IQ Streamer
pub struct IqStreamer {
    state: Arc<Mutex<State>>,
    settings: IqStreamSettings,
    sample_rate: f64,
    stall_at: Option<u64>,
    stall_runs: u32,
    runs: u32,
    samples: u64,
    complete: bool,
}

impl Dummy {
    pub const MIN_IQ_BANDWIDTH: f64 = 5e3;
    pub const MAX_IQ_BANDWIDTH: f64 = 40e6;

    /// Get a list of Devices
    ///
    /// Will only return exactly one device, if `dummy` is set as driver.
    pub fn probe(args: &Args) -> Result<Vec<Args>, Error> {
        match args.get::<String>("driver").as_deref() {
            Ok("dummy") => {
                let mut a = Args::new();
                a.set("driver", "dummy");
                a.set("id", "0");
                a.set("serial", "DUMMY0");
                a.set("type", "RSA306B");
                Ok(vec![a])
            }
            _ => Ok(Vec::new()),
        }
    }
    /// Create a Dummy Device
    pub fn open<A: TryInto<Args>>(args: A) -> Result<Self, Error> {
        let args: Args = args.try_into().or(Err(Error::ValueError))?;
        let optional = |key: &str| match args.get::<u64>(key) {
            Ok(v) => Ok(Some(v)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        };
        Ok(Self {
            id: args.get("id").unwrap_or(0),
            dpx_frames: optional("dpx_frames")?.map(|v| v as i64),
            iq_stall_at: optional("iq_stall_at")?,
            iq_stall_runs: optional("iq_stall_runs")?.unwrap_or(1) as u32,
            state: Arc::new(Mutex::new(State {
                frequency: 1.5e9,
                reference_level: 0.0,
                running: false,
            })),
        })
    }
}

impl DeviceTrait for Dummy {
    type DpxStreamer = DpxStreamer;
    type IqStreamer = IqStreamer;

    fn driver(&self) -> Driver {
        Driver::Dummy
    }

    fn id(&self) -> Result<String, Error> {
        Ok(self.id.to_string())
    }

    fn info(&self) -> Result<Args, Error> {
        let mut a = Args::new();
        a.set("driver", "dummy");
        a.set("id", self.id.to_string());
        a.set("serial", format!("DUMMY{}", self.id));
        a.set("nomenclature", "RSA306B");
        Ok(a)
    }

    fn preset(&self) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.frequency = 1.5e9;
        s.reference_level = 0.0;
        s.running = false;
        Ok(())
    }

    fn frequency_range(&self) -> Result<Range, Error> {
        Ok(Range::interval(9e3, 6.2e9))
    }

    fn frequency(&self) -> Result<f64, Error> {
        Ok(self.state.lock().unwrap().frequency)
    }

    fn set_frequency(&self, frequency: f64) -> Result<(), Error> {
        self.state.lock().unwrap().frequency = frequency;
        Ok(())
    }

    fn reference_level_range(&self) -> Result<Range, Error> {
        Ok(Range::interval(-130.0, 30.0))
    }

    fn reference_level(&self) -> Result<f64, Error> {
        Ok(self.state.lock().unwrap().reference_level)
    }

    fn set_reference_level(&self, level: f64) -> Result<(), Error> {
        self.state.lock().unwrap().reference_level = level;
        Ok(())
    }

    fn dpx_streamer(&self, settings: &DpxSettings) -> Result<Self::DpxStreamer, Error> {
        if settings.span <= 0.0 || settings.rbw <= 0.0 || settings.bitmap_width <= 0 {
            return Err(Error::ValueError);
        }
        Ok(DpxStreamer {
            state: self.state.clone(),
            settings: settings.clone(),
            max_frames: self.dpx_frames,
            frame_count: 0,
            ready: false,
        })
    }

    fn iq_bandwidth_range(&self) -> Result<Range, Error> {
        Ok(Range::interval(Self::MIN_IQ_BANDWIDTH, Self::MAX_IQ_BANDWIDTH))
    }

    fn iq_streamer(&self, settings: &IqStreamSettings) -> Result<Self::IqStreamer, Error> {
        if settings.destination != IqDestination::Tiq {
            return Err(Error::ValueError);
        }
        Ok(IqStreamer {
            state: self.state.clone(),
            settings: settings.clone(),
            sample_rate: settings.bandwidth * 1.4,
            stall_at: self.iq_stall_at,
            stall_runs: self.iq_stall_runs,
            runs: 0,
            samples: 0,
            complete: false,
        })
    }
}

impl DpxStreamer {
    fn trace_length(&self) -> usize {
        (self.settings.bitmap_width * self.settings.trace_points_per_pixel) as usize
    }
}

impl crate::DpxStreamer for DpxStreamer {
    fn status(&self) -> Result<DpxStatus, Error> {
        Ok(DpxStatus {
            rbw: self.settings.rbw,
            trace_length: self.trace_length(),
            bitmap_width: self.settings.bitmap_width as usize,
            bitmap_height: 201,
        })
    }

    fn activate(&mut self) -> Result<(), Error> {
        self.state.lock().unwrap().running = true;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), Error> {
        self.state.lock().unwrap().running = false;
        self.ready = false;
        Ok(())
    }

    fn wait_for_frame(&mut self, _timeout_ms: u32) -> Result<bool, Error> {
        if !self.state.lock().unwrap().running {
            return Ok(false);
        }
        if let Some(max) = self.max_frames {
            if self.frame_count >= max {
                return Ok(false);
            }
        }
        self.ready = true;
        Ok(true)
    }

    fn read_trace(&mut self, index: usize) -> Result<DpxTrace, Error> {
        if !self.ready || index >= DpxSettings::NUM_TRACES {
            return Err(Error::ValueError);
        }
        self.ready = false;
        self.frame_count += 1;

        let reference_level = self.state.lock().unwrap().reference_level;
        let len = self.trace_length();
        let tone = len / 2;
        // noise floor with a slow ripple, single tone at the center bin
        let points = (0..len)
            .map(|i| {
                let dbm = if i == tone {
                    reference_level - 10.0
                } else {
                    -90.0 + 3.0 * ((i as f64 + self.frame_count as f64) * 0.05).sin()
                };
                match self.settings.y_unit {
                    VerticalUnit::Dbm => dbm as f32,
                    _ => dbm_to_watts(dbm) as f32,
                }
            })
            .collect();

        Ok(DpxTrace {
            frame_count: self.frame_count,
            timestamp: self.frame_count as f64 * 0.1,
            points,
        })
    }
}

impl IqStreamer {
    fn expected(&self) -> u64 {
        (self.sample_rate * self.settings.length_ms as f64 / 1000.0) as u64
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.complete = true;
        let frequency = self.state.lock().unwrap().frequency;
        let mut f = File::create(format!("{}.tiq", self.settings.filename_base))?;
        writeln!(f, "dummy tiq")?;
        writeln!(f, "samples={}", self.samples)?;
        writeln!(f, "sample_rate={}", self.sample_rate)?;
        writeln!(f, "center={frequency}")?;
        Ok(())
    }
}

impl crate::IqStreamer for IqStreamer {
    fn acq_parameters(&self) -> Result<(f64, f64), Error> {
        Ok((self.settings.bandwidth, self.sample_rate))
    }

    fn activate(&mut self) -> Result<(), Error> {
        self.state.lock().unwrap().running = true;
        self.runs += 1;
        self.samples = 0;
        self.complete = false;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), Error> {
        self.state.lock().unwrap().running = false;
        Ok(())
    }

    fn write_status(&mut self) -> Result<WriteStatus, Error> {
        let running = self.state.lock().unwrap().running;
        Ok(WriteStatus {
            complete: self.complete,
            writing: running && !self.complete,
        })
    }

    fn file_info(&mut self) -> Result<FileInfo, Error> {
        let running = self.state.lock().unwrap().running;
        if running && !self.complete {
            let expected = self.expected();
            let chunk = (expected / 20).max(1);
            let mut next = (self.samples + chunk).min(expected);
            if let Some(stall) = self.stall_at {
                if self.runs <= self.stall_runs {
                    next = next.min(stall);
                }
            }
            self.samples = next;
            if self.samples >= expected {
                self.finish()?;
            }
        }
        Ok(FileInfo {
            samples: self.samples,
            acq_status: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DpxStreamer as _;
    use crate::IqStreamer as _;

    #[test]
    fn probe_only_when_asked() {
        assert!(Dummy::probe(&Args::new()).unwrap().is_empty());
        let devs = Dummy::probe(&"driver=dummy".parse().unwrap()).unwrap();
        assert_eq!(devs[0].get::<i32>("id").unwrap(), 0);
    }

    #[test]
    fn open_rejects_bad_args() {
        assert!(matches!(
            Dummy::open("dpx_frames=many"),
            Err(Error::ValueError)
        ));
        let d = Dummy::open("id=4").unwrap();
        assert_eq!(d.id().unwrap(), "4");
    }

    #[test]
    fn dpx_frames() {
        let d = Dummy::open("dpx_frames=2").unwrap();
        d.set_reference_level(-10.0).unwrap();
        let mut s = d
            .dpx_streamer(&DpxSettings::new(40e6, 300e3, -10.0))
            .unwrap();
        assert!(!s.wait_for_frame(10).unwrap());
        s.activate().unwrap();

        assert!(s.wait_for_frame(10).unwrap());
        let t = s.read_trace(0).unwrap();
        assert_eq!(t.frame_count, 1);
        assert_eq!(t.points.len(), 801);
        let peak = t.points.iter().cloned().fold(f32::MIN, f32::max);
        assert_eq!(peak, t.points[400]);
        assert!(s.read_trace(0).is_err());

        assert!(s.wait_for_frame(10).unwrap());
        let t2 = s.read_trace(2).unwrap();
        assert!(t2.timestamp > t.timestamp);
        assert!(!s.wait_for_frame(10).unwrap());
    }

    #[test]
    fn iq_stream_completes() {
        let base = std::env::temp_dir().join(format!("dummy-iq-{}", std::process::id()));
        let base = base.to_str().unwrap().to_string();
        let d = Dummy::open("").unwrap();
        let mut s = d
            .iq_streamer(&IqStreamSettings::tiq(1e6, base.clone(), 100))
            .unwrap();
        s.activate().unwrap();
        let mut polls = 0;
        while !s.write_status().unwrap().complete {
            s.file_info().unwrap();
            polls += 1;
            assert!(polls <= 20);
        }
        assert_eq!(s.file_info().unwrap().samples, 140_000);
        let path = format!("{base}.tiq");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("samples=140000"));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn iq_stream_stalls_first_run() {
        let d = Dummy::open("iq_stall_at=10").unwrap();
        let mut s = d
            .iq_streamer(&IqStreamSettings::tiq(1e6, "never-written", 100))
            .unwrap();
        s.activate().unwrap();
        for _ in 0..50 {
            s.file_info().unwrap();
        }
        assert_eq!(s.file_info().unwrap().samples, 10);
        assert!(!s.write_status().unwrap().complete);
    }
}
