use crate::DpxStatus;
use crate::DpxTrace;
use crate::Error;
use crate::FileInfo;
use crate::WriteStatus;

/// Receive DPX spectrum frames from a [Device](crate::Device).
pub trait DpxStreamer: Send {
    /// Effective DPX settings (actual RBW, trace length).
    fn status(&self) -> Result<DpxStatus, Error>;

    /// Start acquiring frames.
    fn activate(&mut self) -> Result<(), Error>;

    /// Stop acquiring frames.
    fn deactivate(&mut self) -> Result<(), Error>;

    /// Wait up to `timeout_ms` for the next frame.
    ///
    /// Returns `false` if no frame became ready in time.
    fn wait_for_frame(&mut self, timeout_ms: u32) -> Result<bool, Error>;

    /// Copy spectrum trace `index` out of the ready frame and release the frame.
    ///
    /// Must only be called after [`wait_for_frame`](Self::wait_for_frame) returned `true`.
    fn read_trace(&mut self, index: usize) -> Result<DpxTrace, Error>;
}

#[doc(hidden)]
impl DpxStreamer for Box<dyn DpxStreamer> {
    fn status(&self) -> Result<DpxStatus, Error> {
        self.as_ref().status()
    }
    fn activate(&mut self) -> Result<(), Error> {
        self.as_mut().activate()
    }
    fn deactivate(&mut self) -> Result<(), Error> {
        self.as_mut().deactivate()
    }
    fn wait_for_frame(&mut self, timeout_ms: u32) -> Result<bool, Error> {
        self.as_mut().wait_for_frame(timeout_ms)
    }
    fn read_trace(&mut self, index: usize) -> Result<DpxTrace, Error> {
        self.as_mut().read_trace(index)
    }
}

/// Stream IQ samples from a [Device](crate::Device) to a file written by the driver.
pub trait IqStreamer: Send {
    /// Actual acquisition bandwidth (Hz) and sample rate (samples/s).
    fn acq_parameters(&self) -> Result<(f64, f64), Error>;

    /// Start the analyzer and the stream.
    fn activate(&mut self) -> Result<(), Error>;

    /// Stop the stream and the analyzer.
    fn deactivate(&mut self) -> Result<(), Error>;

    /// Poll the file writer.
    fn write_status(&mut self) -> Result<WriteStatus, Error>;

    /// Poll the sample count of the current file.
    fn file_info(&mut self) -> Result<FileInfo, Error>;
}

#[doc(hidden)]
impl IqStreamer for Box<dyn IqStreamer> {
    fn acq_parameters(&self) -> Result<(f64, f64), Error> {
        self.as_ref().acq_parameters()
    }
    fn activate(&mut self) -> Result<(), Error> {
        self.as_mut().activate()
    }
    fn deactivate(&mut self) -> Result<(), Error> {
        self.as_mut().deactivate()
    }
    fn write_status(&mut self) -> Result<WriteStatus, Error> {
        self.as_mut().write_status()
    }
    fn file_info(&mut self) -> Result<FileInfo, Error> {
        self.as_mut().file_info()
    }
}
