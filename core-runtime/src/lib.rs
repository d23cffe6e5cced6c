//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the offline course core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that every other core crate
//! depends on. It establishes the logging conventions, the tunables of the
//! offline subsystem, and the event broadcasting used to surface sync and
//! download progress to the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
