//! # cip-device
//!
//! A device-side EtherNet/IP (ENIP) Common Industrial Protocol (CIP)
//! object runtime: parse and produce the CIP wire format, resolve tag
//! paths and EPATHs against a registry of objects, and dispatch the
//! handful of generic and class-specific services (Get/Set Attribute
//! Single, Get Attributes All, Multiple Service Packet, Forward
//! Open/Close, Unconnected Send) a conforming device must answer.
//!
//! The UCMM (`ucmm::Ucmm`) is the top-level entry point: it owns the
//! session table and the [`registry::Registry`] of objects, and turns an
//! encapsulation-layer [`ucmm::Envelope`] into a reply envelope. Callers
//! supply the transport (this crate has no socket loop of its own — see
//! the non-goals in `SPEC_FULL.md`).

pub mod attribute;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod object;
pub mod objects;
pub mod path;
pub mod registry;
pub mod ucmm;

pub use error::{CipError, CipStatus, Result};
pub use object::Object;
pub use path::Path;
pub use registry::Registry;
pub use ucmm::{Envelope, Ucmm};

/// The version of this crate, as set in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
