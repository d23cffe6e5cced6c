//! # Offline Media
//!
//! HLS playlist helpers and integrity validation, URL normalization, and the
//! resolver that decides whether a media reference is served from the
//! network or from the offline store.

pub mod error;
pub mod handles;
pub mod hls;
pub mod normalize;
pub mod resolver;

pub use error::{MediaError, Result};
pub use handles::{HandleEntry, HandleRegistry, MediaHandle};
pub use hls::{validate, SegmentInventory, ValidationReport, Variant};
pub use normalize::KeyNormalizer;
pub use resolver::{
    DisplayRef, MediaKind, MediaResolver, MediaSlot, ServedMedia, VirtualPath, VirtualResource,
};
