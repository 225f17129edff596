#![allow(clippy::new_without_default)]
//! DPX spectrum export and IQ streaming for Tektronix RSA spectrum analyzers.
//!
//! Hardware access goes through the vendor's `libRSA_API` (feature `rsa_api`). The
//! `dummy` feature provides a simulated analyzer, so the acquisition loops can run
//! without an instrument.
mod args;
pub use args::Args;

pub mod convert;

mod device;
pub use device::Device;
pub use device::DeviceTrait;
pub use device::DpxSettings;
pub use device::DpxStatus;
pub use device::DpxTrace;
pub use device::FileInfo;
pub use device::FileSuffix;
pub use device::GenericDevice;
pub use device::IqDataType;
pub use device::IqDestination;
pub use device::IqStreamSettings;
pub use device::TraceType;
pub use device::VerticalUnit;
pub use device::WriteStatus;

pub mod dpx;
pub mod impls;
pub mod iqstream;
pub mod poll;

mod range;
pub use range::Range;
pub use range::RangeItem;

mod streamer;
pub use streamer::DpxStreamer;
pub use streamer::IqStreamer;

use std::str::FromStr;
use thiserror::Error;

/// Error
#[derive(Debug, Error)]
pub enum Error {
    #[error("Value Error")]
    ValueError,
    #[error("Not Found")]
    NotFound,
    #[error("RSA API error {code}: {message}")]
    Api { code: i32, message: String },
    #[error("IQ stream stalled")]
    Stalled,
    #[error("Cancelled")]
    Cancelled,
    #[error("Io")]
    Io(#[from] std::io::Error),
    #[error("Csv")]
    Csv(#[from] csv::Error),
}

/// Hardware driver, implementing the [`DeviceTrait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    #[cfg(feature = "dummy")]
    Dummy,
    #[cfg(feature = "rsa_api")]
    Rsa,
}

impl FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        #[cfg(feature = "rsa_api")]
        if s == "rsa" || s == "tektronix" || s == "tek" {
            return Ok(Driver::Rsa);
        }
        #[cfg(feature = "dummy")]
        if s == "dummy" {
            return Ok(Driver::Dummy);
        }
        Err(Error::ValueError)
    }
}

/// Enumerate devices.
///
/// ## Returns
///
/// A vector of [`Args`] that provide information about the device and can be used to identify it
/// uniquely, i.e., passing the [`Args`] to [`Device::from_args`](crate::Device::from_args) will
/// open this particular device.
pub fn enumerate() -> Result<Vec<Args>, Error> {
    enumerate_with_args(Args::new())
}

/// Enumerate devices with given [`Args`].
#[allow(unused_mut, unused_variables)]
pub fn enumerate_with_args<A: TryInto<Args>>(a: A) -> Result<Vec<Args>, Error> {
    let args: Args = a.try_into().or(Err(Error::ValueError))?;
    let mut devs = Vec::new();
    let driver = match args.get::<String>("driver") {
        Ok(s) => Some(s.parse::<Driver>()?),
        _ => None,
    };

    #[cfg(feature = "rsa_api")]
    {
        if driver.is_none() || matches!(driver, Some(Driver::Rsa)) {
            devs.append(&mut impls::Rsa::probe(&args)?)
        }
    }
    #[cfg(feature = "dummy")]
    {
        if driver.is_none() || matches!(driver, Some(Driver::Dummy)) {
            devs.append(&mut impls::Dummy::probe(&args)?)
        }
    }

    Ok(devs)
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;

    #[test]
    fn driver_from_str() {
        assert_eq!("dummy".parse::<Driver>().unwrap(), Driver::Dummy);
        assert_eq!("DUMMY".parse::<Driver>().unwrap(), Driver::Dummy);
        assert!("hackrf".parse::<Driver>().is_err());
    }

    #[test]
    fn enumerate_dummy() {
        let devs = enumerate_with_args("driver=dummy").unwrap();
        assert_eq!(devs.len(), 1);
        assert_eq!(devs[0].get::<String>("driver").unwrap(), "dummy");
    }

    #[test]
    fn enumerate_unknown_driver() {
        assert!(matches!(
            enumerate_with_args("driver=foo"),
            Err(Error::ValueError)
        ));
    }
}
