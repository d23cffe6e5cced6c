//! Umbrella crate for hosts that want the offline course core through a
//! single dependency. The `desktop-shims` feature re-exports `core-service`
//! built with the desktop bridges.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;
