use crate::impls;
use crate::Args;
use crate::Driver;
use crate::DpxStreamer;
use crate::Error;
use crate::IqStreamer;
use crate::Range;

/// Central trait, implemented by hardware drivers.
///
/// The methods follow the RSA API call sequence: configure the analyzer, create a DPX or IQ
/// streamer, activate it, poll it, deactivate it. Dropping the driver disconnects the device.
pub trait DeviceTrait: Send {
    /// Associated DPX streamer
    type DpxStreamer: DpxStreamer;
    /// Associated IQ streamer
    type IqStreamer: IqStreamer;

    /// Hardware [driver](Driver)
    fn driver(&self) -> Driver;
    /// Identifier for the device, e.g., its serial.
    fn id(&self) -> Result<String, Error>;
    /// Device info that can be displayed to the user.
    fn info(&self) -> Result<Args, Error>;
    /// Reset the analyzer to its default configuration.
    fn preset(&self) -> Result<(), Error>;

    //================================ FREQUENCY ============================================
    /// Range of tunable center frequencies in Hz.
    fn frequency_range(&self) -> Result<Range, Error>;
    /// Center frequency in Hz.
    fn frequency(&self) -> Result<f64, Error>;
    /// Set the center frequency in Hz.
    fn set_frequency(&self, frequency: f64) -> Result<(), Error>;

    //================================ REFERENCE LEVEL ======================================
    /// Range of reference levels in dBm.
    fn reference_level_range(&self) -> Result<Range, Error>;
    /// Reference level in dBm.
    fn reference_level(&self) -> Result<f64, Error>;
    /// Set the reference level in dBm.
    fn set_reference_level(&self, level: f64) -> Result<(), Error>;

    //================================ STREAMER ============================================
    /// Configure DPX acquisition and create a streamer for its frames.
    fn dpx_streamer(&self, settings: &DpxSettings) -> Result<Self::DpxStreamer, Error>;
    /// Range of IQ streaming acquisition bandwidths in Hz.
    fn iq_bandwidth_range(&self) -> Result<Range, Error>;
    /// Configure IQ streaming and create a streamer for it.
    fn iq_streamer(&self, settings: &IqStreamSettings) -> Result<Self::IqStreamer, Error>;
}

/// Vertical unit of DPX traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalUnit {
    Dbm,
    Watt,
    Volt,
    Amp,
    DbmV,
}

/// Detector of a DPX spectrum trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceType {
    Average,
    Max,
    MaxHold,
    Min,
    MinHold,
}

/// DPX spectrum configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DpxSettings {
    /// Frequency span in Hz.
    pub span: f64,
    /// Requested resolution bandwidth in Hz.
    pub rbw: f64,
    pub bitmap_width: i32,
    pub trace_points_per_pixel: i32,
    pub y_unit: VerticalUnit,
    pub y_top: f64,
    pub y_bottom: f64,
    pub infinite_persistence: bool,
    /// Persistence in seconds.
    pub persistence: f64,
    pub show_only_trigger_frame: bool,
    /// Spectrum trace (0..=2) that gets `trace_type`.
    pub trace_index: usize,
    pub trace_type: TraceType,
}

impl DpxSettings {
    /// Number of spectrum traces a DPX frame carries.
    pub const NUM_TRACES: usize = 3;

    /// Spectrum-only settings with traces in watts, displaying 100 dB below `reference_level`.
    pub fn new(span: f64, rbw: f64, reference_level: f64) -> Self {
        Self {
            span,
            rbw,
            bitmap_width: 801,
            trace_points_per_pixel: 1,
            y_unit: VerticalUnit::Watt,
            y_top: crate::convert::dbm_to_watts(reference_level),
            y_bottom: crate::convert::dbm_to_watts(reference_level - 100.0),
            infinite_persistence: false,
            persistence: 1.0,
            show_only_trigger_frame: false,
            trace_index: 0,
            trace_type: TraceType::Max,
        }
    }
}

/// Effective DPX configuration as reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct DpxStatus {
    /// Actual resolution bandwidth in Hz.
    pub rbw: f64,
    pub trace_length: usize,
    pub bitmap_width: usize,
    pub bitmap_height: usize,
}

/// One spectrum trace, copied out of a DPX frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DpxTrace {
    pub frame_count: i64,
    /// Device timestamp in seconds.
    pub timestamp: f64,
    /// Trace points, in the configured [`VerticalUnit`].
    pub points: Vec<f32>,
}

/// Where streamed IQ samples go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqDestination {
    Client,
    Tiq,
    Siq,
    SiqSplit,
}

/// Sample format of streamed IQ data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqDataType {
    Single,
    Int32,
    Int16,
    SingleScaleInt32,
}

/// File name suffix of IQ stream files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSuffix {
    None,
    Timestamp,
    Index(u32),
}

/// IQ streaming configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IqStreamSettings {
    /// Requested acquisition bandwidth in Hz.
    pub bandwidth: f64,
    pub destination: IqDestination,
    pub data_type: IqDataType,
    /// Output file name without extension.
    pub filename_base: String,
    pub suffix: FileSuffix,
    /// Amount of data to write, in milliseconds.
    pub length_ms: u32,
}

impl IqStreamSettings {
    /// 16-bit TIQ file without suffix.
    pub fn tiq(bandwidth: f64, filename_base: impl Into<String>, length_ms: u32) -> Self {
        Self {
            bandwidth,
            destination: IqDestination::Tiq,
            data_type: IqDataType::Int16,
            filename_base: filename_base.into(),
            suffix: FileSuffix::None,
            length_ms,
        }
    }
}

/// Progress of the file writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteStatus {
    pub complete: bool,
    pub writing: bool,
}

/// Stream file statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileInfo {
    /// Samples written so far.
    pub samples: u64,
    /// Acquisition status flags, non-zero on overflow or data loss.
    pub acq_status: u32,
}

/// Wraps a driver, implementing the [DeviceTrait].
///
/// Adds range checks to tuning, so an invalid setting is reported before it reaches the
/// hardware.
pub struct Device<T: DeviceTrait> {
    dev: T,
}

impl Device<GenericDevice> {
    /// Creates a [`GenericDevice`] opening the first device with a given `driver`, specified in
    /// the `args` or the first device discovered through [`enumerate`](crate::enumerate) that
    /// matches the args.
    #[allow(unused_variables)]
    pub fn from_args<A: TryInto<Args>>(args: A) -> Result<Self, Error> {
        let args = args.try_into().or(Err(Error::ValueError))?;
        let driver = match args.get::<Driver>("driver") {
            Ok(d) => Some(d),
            Err(Error::NotFound) => None,
            Err(e) => return Err(e),
        };
        #[cfg(feature = "rsa_api")]
        {
            if driver.is_none() || matches!(driver, Some(Driver::Rsa)) {
                match impls::Rsa::open(&args) {
                    Ok(d) => {
                        return Ok(Device {
                            dev: Box::new(DeviceWrapper { dev: d }),
                        })
                    }
                    Err(Error::NotFound) => {
                        if driver.is_some() {
                            return Err(Error::NotFound);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        #[cfg(feature = "dummy")]
        {
            if matches!(driver, Some(Driver::Dummy)) {
                return Ok(Device {
                    dev: Box::new(DeviceWrapper {
                        dev: impls::Dummy::open(&args)?,
                    }),
                });
            }
        }
        log::error!("{}", not_found_hint(driver));
        Err(Error::NotFound)
    }
}

fn not_found_hint(driver: Option<Driver>) -> String {
    match driver {
        Some(d) => format!("no {d:?} device found"),
        None if cfg!(feature = "rsa_api") => {
            "no RSA device found, pass driver=dummy for the simulated analyzer".to_string()
        }
        None => "no hardware driver compiled in, pass driver=dummy or enable the rsa_api feature"
            .to_string(),
    }
}

/// Type for a generic/wrapped hardware driver, implementing the [`DeviceTrait`].
///
/// This is usually used to create a hardware-independent `Device<GenericDevice>`, for example,
/// through [`Device::from_args`], which doesn't know a priori which implementation will be used.
pub type GenericDevice =
    Box<dyn DeviceTrait<DpxStreamer = Box<dyn DpxStreamer>, IqStreamer = Box<dyn IqStreamer>>>;

impl<T: DeviceTrait> Device<T> {
    /// Create a device from the device implementation.
    pub fn from_device(dev: T) -> Self {
        Self { dev }
    }

    pub fn driver(&self) -> Driver {
        self.dev.driver()
    }
    pub fn id(&self) -> Result<String, Error> {
        self.dev.id()
    }
    pub fn info(&self) -> Result<Args, Error> {
        self.dev.info()
    }
    pub fn preset(&self) -> Result<(), Error> {
        self.dev.preset()
    }

    pub fn frequency_range(&self) -> Result<Range, Error> {
        self.dev.frequency_range()
    }
    pub fn frequency(&self) -> Result<f64, Error> {
        self.dev.frequency()
    }
    /// Set the center frequency, failing with [`Error::ValueError`] if the device cannot tune
    /// there.
    pub fn set_frequency(&self, frequency: f64) -> Result<(), Error> {
        let range = self.dev.frequency_range()?;
        if !range.contains(frequency) {
            log::error!("center frequency {frequency} Hz outside of {range}");
            return Err(Error::ValueError);
        }
        self.dev.set_frequency(frequency)
    }

    pub fn reference_level_range(&self) -> Result<Range, Error> {
        self.dev.reference_level_range()
    }
    pub fn reference_level(&self) -> Result<f64, Error> {
        self.dev.reference_level()
    }
    /// Set the reference level, failing with [`Error::ValueError`] if it is out of range.
    pub fn set_reference_level(&self, level: f64) -> Result<(), Error> {
        let range = self.dev.reference_level_range()?;
        if !range.contains(level) {
            log::error!("reference level {level} dBm outside of {range}");
            return Err(Error::ValueError);
        }
        self.dev.set_reference_level(level)
    }

    pub fn dpx_streamer(&self, settings: &DpxSettings) -> Result<T::DpxStreamer, Error> {
        if settings.trace_index >= DpxSettings::NUM_TRACES {
            log::error!("trace index {} out of range", settings.trace_index);
            return Err(Error::ValueError);
        }
        self.dev.dpx_streamer(settings)
    }

    pub fn iq_bandwidth_range(&self) -> Result<Range, Error> {
        self.dev.iq_bandwidth_range()
    }
    /// Create an IQ streamer. A bandwidth the device does not support is replaced by the
    /// closest supported one.
    pub fn iq_streamer(&self, settings: &IqStreamSettings) -> Result<T::IqStreamer, Error> {
        let range = self.dev.iq_bandwidth_range()?;
        let bw = range.closest(settings.bandwidth).ok_or(Error::ValueError)?;
        if bw != settings.bandwidth {
            log::warn!(
                "bandwidth {} Hz not supported, using {} Hz",
                settings.bandwidth,
                bw
            );
        }
        let settings = IqStreamSettings {
            bandwidth: bw,
            ..settings.clone()
        };
        self.dev.iq_streamer(&settings)
    }
}

struct DeviceWrapper<D: DeviceTrait> {
    dev: D,
}

impl<D> DeviceTrait for DeviceWrapper<D>
where
    D: DeviceTrait,
    D::DpxStreamer: 'static,
    D::IqStreamer: 'static,
{
    type DpxStreamer = Box<dyn DpxStreamer>;
    type IqStreamer = Box<dyn IqStreamer>;

    fn driver(&self) -> Driver {
        self.dev.driver()
    }
    fn id(&self) -> Result<String, Error> {
        self.dev.id()
    }
    fn info(&self) -> Result<Args, Error> {
        self.dev.info()
    }
    fn preset(&self) -> Result<(), Error> {
        self.dev.preset()
    }
    fn frequency_range(&self) -> Result<Range, Error> {
        self.dev.frequency_range()
    }
    fn frequency(&self) -> Result<f64, Error> {
        self.dev.frequency()
    }
    fn set_frequency(&self, frequency: f64) -> Result<(), Error> {
        self.dev.set_frequency(frequency)
    }
    fn reference_level_range(&self) -> Result<Range, Error> {
        self.dev.reference_level_range()
    }
    fn reference_level(&self) -> Result<f64, Error> {
        self.dev.reference_level()
    }
    fn set_reference_level(&self, level: f64) -> Result<(), Error> {
        self.dev.set_reference_level(level)
    }
    fn dpx_streamer(&self, settings: &DpxSettings) -> Result<Self::DpxStreamer, Error> {
        Ok(Box::new(self.dev.dpx_streamer(settings)?))
    }
    fn iq_bandwidth_range(&self) -> Result<Range, Error> {
        self.dev.iq_bandwidth_range()
    }
    fn iq_streamer(&self, settings: &IqStreamSettings) -> Result<Self::IqStreamer, Error> {
        Ok(Box::new(self.dev.iq_streamer(settings)?))
    }
}

#[doc(hidden)]
impl DeviceTrait for GenericDevice {
    type DpxStreamer = Box<dyn DpxStreamer>;
    type IqStreamer = Box<dyn IqStreamer>;

    fn driver(&self) -> Driver {
        self.as_ref().driver()
    }
    fn id(&self) -> Result<String, Error> {
        self.as_ref().id()
    }
    fn info(&self) -> Result<Args, Error> {
        self.as_ref().info()
    }
    fn preset(&self) -> Result<(), Error> {
        self.as_ref().preset()
    }
    fn frequency_range(&self) -> Result<Range, Error> {
        self.as_ref().frequency_range()
    }
    fn frequency(&self) -> Result<f64, Error> {
        self.as_ref().frequency()
    }
    fn set_frequency(&self, frequency: f64) -> Result<(), Error> {
        self.as_ref().set_frequency(frequency)
    }
    fn reference_level_range(&self) -> Result<Range, Error> {
        self.as_ref().reference_level_range()
    }
    fn reference_level(&self) -> Result<f64, Error> {
        self.as_ref().reference_level()
    }
    fn set_reference_level(&self, level: f64) -> Result<(), Error> {
        self.as_ref().set_reference_level(level)
    }
    fn dpx_streamer(&self, settings: &DpxSettings) -> Result<Self::DpxStreamer, Error> {
        self.as_ref().dpx_streamer(settings)
    }
    fn iq_bandwidth_range(&self) -> Result<Range, Error> {
        self.as_ref().iq_bandwidth_range()
    }
    fn iq_streamer(&self, settings: &IqStreamSettings) -> Result<Self::IqStreamer, Error> {
        self.as_ref().iq_streamer(settings)
    }
}
