//! Tektronix RSA driver, linking against the vendor's `libRSA_API`.
//!
//! The API keeps a single global connection, so at most one [`Rsa`] should exist at a time.
use std::ffi::CStr;
use std::os::raw::c_char;
use std::os::raw::c_int;

use crate::device::FileSuffix;
use crate::Args;
use crate::DeviceTrait;
use crate::DpxSettings;
use crate::DpxStatus;
use crate::DpxTrace;
use crate::Driver;
use crate::Error;
use crate::FileInfo;
use crate::IqDataType;
use crate::IqDestination;
use crate::IqStreamSettings;
use crate::Range;
use crate::TraceType;
use crate::VerticalUnit;
use crate::WriteStatus;

#[allow(non_snake_case, non_camel_case_types, dead_code)]
mod ffi {
    use std::os::raw::c_char;
    use std::os::raw::c_int;
    use std::os::raw::c_void;

    pub type ReturnStatus = c_int;
    pub const NO_ERROR: ReturnStatus = 0;

    pub const DEVSRCH_MAX_NUM_DEVICES: usize = 20;
    pub const DEVSRCH_SERIAL_MAX_STRLEN: usize = 100;
    pub const DEVSRCH_TYPE_MAX_STRLEN: usize = 20;
    pub const DEVINFO_MAX_STRLEN: usize = 100;

    pub const IQSSDFN_SUFFIX_TIMESTAMP: c_int = -1;
    pub const IQSSDFN_SUFFIX_NONE: c_int = -2;

    #[repr(C)]
    pub struct DPX_FrameBuffer {
        pub fftPerFrame: i32,
        pub fftCount: i64,
        pub frameCount: i64,
        pub timestamp: f64,
        pub acqDataStatus: u32,
        pub minSigDuration: f64,
        pub minSigDurOutOfRange: bool,
        pub spectrumBitmapWidth: i32,
        pub spectrumBitmapHeight: i32,
        pub spectrumBitmapSize: i32,
        pub spectrumTraceLength: i32,
        pub numSpectrumTraces: i32,
        pub spectrumEnabled: bool,
        pub spectrogramEnabled: bool,
        pub spectrumBitmap: *mut f32,
        pub spectrumTraces: *mut *mut f32,
        pub sogramBitmapWidth: i32,
        pub sogramBitmapHeight: i32,
        pub sogramBitmapSize: i32,
        pub sogramBitmapNumValidLines: i32,
        pub sogramBitmap: *mut u8,
        pub sogramBitmapTimestampArray: *mut f64,
        pub sogramBitmapContainTriggerArray: *mut i16,
    }

    #[repr(C)]
    pub struct DPX_SettingStruct {
        pub enableSpectrum: bool,
        pub enableSpectrogram: bool,
        pub bitmapWidth: i32,
        pub bitmapHeight: i32,
        pub traceLength: i32,
        pub decayFactor: f32,
        pub actualRBW: f64,
    }

    #[repr(C)]
    pub struct IQSTRMFILEINFO {
        pub numberSamples: u64,
        pub sample0Timestamp: u64,
        pub triggerSampleIndex: u64,
        pub triggerTimestamp: u64,
        pub acqStatus: u32,
        pub filenames: *mut *mut c_void,
    }

    #[link(name = "RSA_API")]
    extern "C" {
        pub fn DEVICE_Search(
            numDevicesFound: *mut c_int,
            deviceIDs: *mut c_int,
            deviceSerial: *mut [c_char; DEVSRCH_SERIAL_MAX_STRLEN],
            deviceType: *mut [c_char; DEVSRCH_TYPE_MAX_STRLEN],
        ) -> ReturnStatus;
        pub fn DEVICE_Connect(deviceID: c_int) -> ReturnStatus;
        pub fn DEVICE_Disconnect() -> ReturnStatus;
        pub fn DEVICE_Run() -> ReturnStatus;
        pub fn DEVICE_Stop() -> ReturnStatus;
        pub fn DEVICE_GetErrorString(status: ReturnStatus) -> *const c_char;
        pub fn DEVICE_GetSerialNumber(serialNum: *mut c_char) -> ReturnStatus;
        pub fn DEVICE_GetNomenclature(nomenclature: *mut c_char) -> ReturnStatus;
        pub fn DEVICE_GetAPIVersion(apiVersion: *mut c_char) -> ReturnStatus;

        pub fn CONFIG_Preset() -> ReturnStatus;
        pub fn CONFIG_SetCenterFreq(cf: f64) -> ReturnStatus;
        pub fn CONFIG_GetCenterFreq(cf: *mut f64) -> ReturnStatus;
        pub fn CONFIG_GetMinCenterFreq(minCF: *mut f64) -> ReturnStatus;
        pub fn CONFIG_GetMaxCenterFreq(maxCF: *mut f64) -> ReturnStatus;
        pub fn CONFIG_SetReferenceLevel(refLevel: f64) -> ReturnStatus;
        pub fn CONFIG_GetReferenceLevel(refLevel: *mut f64) -> ReturnStatus;

        pub fn DPX_SetEnable(enable: bool) -> ReturnStatus;
        pub fn DPX_SetParameters(
            fspan: f64,
            rbw: f64,
            bitmapWidth: i32,
            tracePtsPerPixel: i32,
            yUnit: c_int,
            yTop: f64,
            yBottom: f64,
            infinitePersistence: bool,
            persistenceTimeSec: f64,
            showOnlyTrigFrame: bool,
        ) -> ReturnStatus;
        pub fn DPX_Configure(enableSpectrum: bool, enableSpectrogram: bool) -> ReturnStatus;
        pub fn DPX_SetSpectrumTraceType(traceIndex: i32, traceType: c_int) -> ReturnStatus;
        pub fn DPX_GetSettings(pSettings: *mut DPX_SettingStruct) -> ReturnStatus;
        pub fn DPX_WaitForDataReady(timeoutMsec: c_int, dataReady: *mut bool) -> ReturnStatus;
        pub fn DPX_GetFrameBuffer(frameBuffer: *mut DPX_FrameBuffer) -> ReturnStatus;
        pub fn DPX_FinishFrameBuffer() -> ReturnStatus;

        pub fn IQSTREAM_GetMinAcqBandwidth(minBandwidthHz: *mut f64) -> ReturnStatus;
        pub fn IQSTREAM_GetMaxAcqBandwidth(maxBandwidthHz: *mut f64) -> ReturnStatus;
        pub fn IQSTREAM_SetAcqBandwidth(bwHz_req: f64) -> ReturnStatus;
        pub fn IQSTREAM_GetAcqParameters(bwHz_act: *mut f64, srSps: *mut f64) -> ReturnStatus;
        pub fn IQSTREAM_SetOutputConfiguration(dest: c_int, dtype: c_int) -> ReturnStatus;
        pub fn IQSTREAM_SetDiskFilenameBase(filenameBase: *const c_char) -> ReturnStatus;
        pub fn IQSTREAM_SetDiskFilenameSuffix(suffixCtl: c_int) -> ReturnStatus;
        pub fn IQSTREAM_SetDiskFileLength(msec: c_int) -> ReturnStatus;
        pub fn IQSTREAM_Start() -> ReturnStatus;
        pub fn IQSTREAM_Stop() -> ReturnStatus;
        pub fn IQSTREAM_ClearAcqStatus() -> ReturnStatus;
        pub fn IQSTREAM_GetDiskFileWriteStatus(
            isComplete: *mut bool,
            isWriting: *mut bool,
        ) -> ReturnStatus;
        pub fn IQSTREAM_GetDiskFileInfo(fileinfo: *mut IQSTRMFILEINFO) -> ReturnStatus;
    }
}

/// Turn a `ReturnStatus` into a `Result`, resolving the message through the API.
fn check(status: ffi::ReturnStatus) -> Result<(), Error> {
    if status == ffi::NO_ERROR {
        return Ok(());
    }
    // SAFETY: the API returns a pointer to a static, NUL-terminated string or null.
    let message = unsafe {
        let p = ffi::DEVICE_GetErrorString(status);
        if p.is_null() {
            String::from("unknown error")
        } else {
            CStr::from_ptr(p).to_string_lossy().into_owned()
        }
    };
    Err(Error::Api {
        code: status,
        message,
    })
}

fn c_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Read one of the `DEVICE_Get*` info strings.
fn info_string(f: unsafe extern "C" fn(*mut c_char) -> ffi::ReturnStatus) -> Result<String, Error> {
    let mut buf = [0 as c_char; ffi::DEVINFO_MAX_STRLEN];
    // SAFETY: the buffer has the size the API documents for info strings.
    check(unsafe { f(buf.as_mut_ptr()) })?;
    Ok(c_string(&buf))
}

fn get_f64(f: unsafe extern "C" fn(*mut f64) -> ffi::ReturnStatus) -> Result<f64, Error> {
    let mut v = 0.0;
    // SAFETY: `v` outlives the call.
    check(unsafe { f(&mut v) })?;
    Ok(v)
}

/// Tektronix RSA analyzer.
pub struct Rsa {
    id: i32,
    serial: String,
}

/// DPX streamer of an [`Rsa`].
pub struct DpxStreamer {
    _p: (),
}

/// IQ streamer of an [`Rsa`].
pub struct IqStreamer {
    running: bool,
}

impl Rsa {
    /// Search for connected analyzers.
    pub fn probe(_args: &Args) -> Result<Vec<Args>, Error> {
        let mut num: c_int = 0;
        let mut ids = [0 as c_int; ffi::DEVSRCH_MAX_NUM_DEVICES];
        let mut serials = [[0 as c_char; ffi::DEVSRCH_SERIAL_MAX_STRLEN]; ffi::DEVSRCH_MAX_NUM_DEVICES];
        let mut types = [[0 as c_char; ffi::DEVSRCH_TYPE_MAX_STRLEN]; ffi::DEVSRCH_MAX_NUM_DEVICES];
        // SAFETY: all arrays hold DEVSRCH_MAX_NUM_DEVICES entries of the documented size.
        check(unsafe {
            ffi::DEVICE_Search(
                &mut num,
                ids.as_mut_ptr(),
                serials.as_mut_ptr(),
                types.as_mut_ptr(),
            )
        })?;

        let num = (num.max(0) as usize).min(ffi::DEVSRCH_MAX_NUM_DEVICES);
        let mut devs = Vec::with_capacity(num);
        for i in 0..num {
            let mut a = Args::new();
            a.set("driver", "rsa");
            a.set("id", ids[i].to_string());
            a.set("serial", c_string(&serials[i]));
            a.set("type", c_string(&types[i]));
            devs.push(a);
        }
        log::debug!("found {} RSA devices", devs.len());
        Ok(devs)
    }

    /// Connect to the analyzer with the given `id`, or the first one found.
    pub fn open<A: TryInto<Args>>(args: A) -> Result<Self, Error> {
        let args: Args = args.try_into().or(Err(Error::ValueError))?;
        let devs = Self::probe(&args)?;
        let dev = match args.get::<i32>("id") {
            Ok(id) => devs
                .into_iter()
                .find(|d| d.get::<i32>("id").ok() == Some(id)),
            Err(Error::NotFound) => devs.into_iter().next(),
            Err(e) => return Err(e),
        }
        .ok_or(Error::NotFound)?;

        let id: i32 = dev.get("id")?;
        // SAFETY: plain value argument.
        check(unsafe { ffi::DEVICE_Connect(id) })?;
        let serial = dev.get::<String>("serial").unwrap_or_default();
        log::info!("connected to RSA {} ({serial})", id);

        match info_string(ffi::DEVICE_GetAPIVersion) {
            Ok(v) => log::info!("RSA API version {v}"),
            Err(e) => log::warn!("cannot read API version: {e}"),
        }
        Ok(Self { id, serial })
    }
}

impl Drop for Rsa {
    fn drop(&mut self) {
        // SAFETY: no arguments, valid in any connection state.
        unsafe {
            if let Err(e) = check(ffi::DEVICE_Stop()) {
                log::warn!("stopping RSA {} failed: {e}", self.id);
            }
            if let Err(e) = check(ffi::DEVICE_Disconnect()) {
                log::warn!("disconnecting RSA {} failed: {e}", self.id);
            }
        }
        log::info!("disconnected RSA {}", self.id);
    }
}

fn vertical_unit(u: VerticalUnit) -> c_int {
    match u {
        VerticalUnit::Dbm => 0,
        VerticalUnit::Watt => 1,
        VerticalUnit::Volt => 2,
        VerticalUnit::Amp => 3,
        VerticalUnit::DbmV => 4,
    }
}

fn trace_type(t: TraceType) -> c_int {
    match t {
        TraceType::Average => 0,
        TraceType::Max => 1,
        TraceType::MaxHold => 2,
        TraceType::Min => 3,
        TraceType::MinHold => 4,
    }
}

fn destination(d: IqDestination) -> c_int {
    match d {
        IqDestination::Client => 0,
        IqDestination::Tiq => 1,
        IqDestination::Siq => 2,
        IqDestination::SiqSplit => 3,
    }
}

fn data_type(d: IqDataType) -> c_int {
    match d {
        IqDataType::Single => 0,
        IqDataType::Int32 => 1,
        IqDataType::Int16 => 2,
        IqDataType::SingleScaleInt32 => 3,
    }
}

fn suffix(s: FileSuffix) -> c_int {
    match s {
        FileSuffix::None => ffi::IQSSDFN_SUFFIX_NONE,
        FileSuffix::Timestamp => ffi::IQSSDFN_SUFFIX_TIMESTAMP,
        FileSuffix::Index(i) => i.min(c_int::MAX as u32) as c_int,
    }
}

impl DeviceTrait for Rsa {
    type DpxStreamer = DpxStreamer;
    type IqStreamer = IqStreamer;

    fn driver(&self) -> Driver {
        Driver::Rsa
    }

    fn id(&self) -> Result<String, Error> {
        Ok(self.id.to_string())
    }

    fn info(&self) -> Result<Args, Error> {
        let mut a = Args::new();
        a.set("driver", "rsa");
        a.set("id", self.id.to_string());
        a.set("serial", self.serial.clone());
        match info_string(ffi::DEVICE_GetNomenclature) {
            Ok(n) => {
                a.set("nomenclature", n);
            }
            Err(e) => log::warn!("cannot read nomenclature: {e}"),
        }
        Ok(a)
    }

    fn preset(&self) -> Result<(), Error> {
        // SAFETY: no arguments.
        check(unsafe { ffi::CONFIG_Preset() })
    }

    fn frequency_range(&self) -> Result<Range, Error> {
        Ok(Range::interval(
            get_f64(ffi::CONFIG_GetMinCenterFreq)?,
            get_f64(ffi::CONFIG_GetMaxCenterFreq)?,
        ))
    }

    fn frequency(&self) -> Result<f64, Error> {
        get_f64(ffi::CONFIG_GetCenterFreq)
    }

    fn set_frequency(&self, frequency: f64) -> Result<(), Error> {
        // SAFETY: plain value argument.
        check(unsafe { ffi::CONFIG_SetCenterFreq(frequency) })
    }

    fn reference_level_range(&self) -> Result<Range, Error> {
        Ok(Range::interval(-130.0, 30.0))
    }

    fn reference_level(&self) -> Result<f64, Error> {
        get_f64(ffi::CONFIG_GetReferenceLevel)
    }

    fn set_reference_level(&self, level: f64) -> Result<(), Error> {
        // SAFETY: plain value argument.
        check(unsafe { ffi::CONFIG_SetReferenceLevel(level) })
    }

    fn dpx_streamer(&self, s: &DpxSettings) -> Result<Self::DpxStreamer, Error> {
        // SAFETY: plain value arguments.
        unsafe {
            check(ffi::DPX_SetEnable(true))?;
            check(ffi::DPX_SetParameters(
                s.span,
                s.rbw,
                s.bitmap_width,
                s.trace_points_per_pixel,
                vertical_unit(s.y_unit),
                s.y_top,
                s.y_bottom,
                s.infinite_persistence,
                s.persistence,
                s.show_only_trigger_frame,
            ))?;
            check(ffi::DPX_Configure(true, false))?;
            check(ffi::DPX_SetSpectrumTraceType(
                s.trace_index as i32,
                trace_type(s.trace_type),
            ))?;
        }
        Ok(DpxStreamer { _p: () })
    }

    fn iq_bandwidth_range(&self) -> Result<Range, Error> {
        Ok(Range::interval(
            get_f64(ffi::IQSTREAM_GetMinAcqBandwidth)?,
            get_f64(ffi::IQSTREAM_GetMaxAcqBandwidth)?,
        ))
    }

    fn iq_streamer(&self, s: &IqStreamSettings) -> Result<Self::IqStreamer, Error> {
        let base = std::ffi::CString::new(s.filename_base.as_str()).or(Err(Error::ValueError))?;
        // SAFETY: `base` is NUL-terminated and outlives the call; other arguments are values.
        unsafe {
            check(ffi::IQSTREAM_SetAcqBandwidth(s.bandwidth))?;
            check(ffi::IQSTREAM_SetOutputConfiguration(
                destination(s.destination),
                data_type(s.data_type),
            ))?;
            check(ffi::IQSTREAM_SetDiskFilenameBase(base.as_ptr()))?;
            check(ffi::IQSTREAM_SetDiskFilenameSuffix(suffix(s.suffix)))?;
            check(ffi::IQSTREAM_SetDiskFileLength(
                s.length_ms.min(c_int::MAX as u32) as c_int,
            ))?;
        }
        Ok(IqStreamer { running: false })
    }
}

impl crate::DpxStreamer for DpxStreamer {
    fn status(&self) -> Result<DpxStatus, Error> {
        let mut s = ffi::DPX_SettingStruct {
            enableSpectrum: false,
            enableSpectrogram: false,
            bitmapWidth: 0,
            bitmapHeight: 0,
            traceLength: 0,
            decayFactor: 0.0,
            actualRBW: 0.0,
        };
        // SAFETY: `s` outlives the call.
        check(unsafe { ffi::DPX_GetSettings(&mut s) })?;
        Ok(DpxStatus {
            rbw: s.actualRBW,
            trace_length: s.traceLength.max(0) as usize,
            bitmap_width: s.bitmapWidth.max(0) as usize,
            bitmap_height: s.bitmapHeight.max(0) as usize,
        })
    }

    fn activate(&mut self) -> Result<(), Error> {
        // SAFETY: no arguments.
        check(unsafe { ffi::DEVICE_Run() })
    }

    fn deactivate(&mut self) -> Result<(), Error> {
        // SAFETY: no arguments.
        unsafe {
            check(ffi::DEVICE_Stop())?;
            check(ffi::DPX_SetEnable(false))
        }
    }

    fn wait_for_frame(&mut self, timeout_ms: u32) -> Result<bool, Error> {
        let mut ready = false;
        // SAFETY: `ready` outlives the call.
        check(unsafe {
            ffi::DPX_WaitForDataReady(timeout_ms.min(c_int::MAX as u32) as c_int, &mut ready)
        })?;
        Ok(ready)
    }

    fn read_trace(&mut self, index: usize) -> Result<DpxTrace, Error> {
        // SAFETY: the API fills the buffer. Its trace pointers stay valid until
        // DPX_FinishFrameBuffer, and the trace is copied out before that call.
        unsafe {
            let mut fb: ffi::DPX_FrameBuffer = std::mem::zeroed();
            check(ffi::DPX_GetFrameBuffer(&mut fb))?;

            let num_traces = fb.numSpectrumTraces.max(0) as usize;
            let len = fb.spectrumTraceLength.max(0) as usize;
            let trace = if index < num_traces && !fb.spectrumTraces.is_null() {
                let p = *fb.spectrumTraces.add(index);
                if p.is_null() {
                    None
                } else {
                    Some(std::slice::from_raw_parts(p, len).to_vec())
                }
            } else {
                None
            };
            let frame_count = fb.frameCount;
            let timestamp = fb.timestamp;

            check(ffi::DPX_FinishFrameBuffer())?;
            let points = trace.ok_or(Error::ValueError)?;
            Ok(DpxTrace {
                frame_count,
                timestamp,
                points,
            })
        }
    }
}

impl crate::IqStreamer for IqStreamer {
    fn acq_parameters(&self) -> Result<(f64, f64), Error> {
        let mut bw = 0.0;
        let mut sr = 0.0;
        // SAFETY: both outputs outlive the call.
        check(unsafe { ffi::IQSTREAM_GetAcqParameters(&mut bw, &mut sr) })?;
        Ok((bw, sr))
    }

    fn activate(&mut self) -> Result<(), Error> {
        // SAFETY: no arguments.
        unsafe {
            check(ffi::IQSTREAM_ClearAcqStatus())?;
            check(ffi::DEVICE_Run())?;
            check(ffi::IQSTREAM_Start())?;
        }
        self.running = true;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), Error> {
        self.running = false;
        // SAFETY: no arguments.
        unsafe {
            check(ffi::IQSTREAM_Stop())?;
            check(ffi::DEVICE_Stop())
        }
    }

    fn write_status(&mut self) -> Result<WriteStatus, Error> {
        let mut complete = false;
        let mut writing = false;
        // SAFETY: both outputs outlive the call.
        check(unsafe { ffi::IQSTREAM_GetDiskFileWriteStatus(&mut complete, &mut writing) })?;
        Ok(WriteStatus { complete, writing })
    }

    fn file_info(&mut self) -> Result<FileInfo, Error> {
        // SAFETY: the API fills the struct. The file name pointers are not read.
        unsafe {
            let mut info: ffi::IQSTRMFILEINFO = std::mem::zeroed();
            check(ffi::IQSTREAM_GetDiskFileInfo(&mut info))?;
            Ok(FileInfo {
                samples: info.numberSamples,
                acq_status: info.acqStatus,
            })
        }
    }
}

impl Drop for IqStreamer {
    fn drop(&mut self) {
        if self.running {
            // SAFETY: no arguments.
            if let Err(e) = check(unsafe { ffi::IQSTREAM_Stop() }) {
                log::warn!("stopping IQ stream failed: {e}");
            }
        }
    }
}
