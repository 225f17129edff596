#[cfg(feature = "dummy")]
pub mod dummy;
#[cfg(feature = "dummy")]
pub use dummy::Dummy;

#[cfg(feature = "rsa_api")]
pub mod rsa;
#[cfg(feature = "rsa_api")]
pub use rsa::Rsa;
