//! # Error and Status Types
//!
//! CIP replies carry a one-byte general status on the wire (spec.md §7);
//! this module gives that byte a real type (`CipStatus`) instead of
//! passing a bare `u8` around, and defines the Rust-level error enum
//! (`CipError`) used internally while a request is being processed.
//!
//! Every `Object::request` converts a `CipError` into the pessimistic
//! status code that was set before the risky step ran (see
//! `Object::request` in `crate::object`), matching the propagation policy
//! in spec.md §7: the reply is always produced, even on failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The one-byte CIP general status code carried on every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CipStatus(pub u8);

impl CipStatus {
    /// 0x00 — Success.
    pub const SUCCESS: CipStatus = CipStatus(0x00);
    /// 0x08 — Service not supported.
    pub const SERVICE_NOT_SUPPORTED: CipStatus = CipStatus(0x08);
    /// 0x16 — Object does not exist.
    pub const OBJECT_DOES_NOT_EXIST: CipStatus = CipStatus(0x16);

    pub fn is_success(self) -> bool {
        self.0 == 0x00
    }
}

impl From<u8> for CipStatus {
    fn from(v: u8) -> Self {
        CipStatus(v)
    }
}

impl fmt::Display for CipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Errors raised while parsing, resolving, or dispatching a CIP request.
///
/// Each variant carries the pessimistic status that should be reported to
/// the client, so callers can do `status = err.status()` at the single
/// joiner point instead of duplicating the mapping.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum CipError {
    #[error("unrecognized service code 0x{0:02x}")]
    UnsupportedService(u8),

    #[error("object class 0x{class:04x} instance {instance} does not exist")]
    NoSuchObject { class: u16, instance: u16 },

    #[error("attribute {0} does not exist on this object")]
    NoSuchAttribute(u16),

    #[error("attribute {0} is hidden from this request by its mask")]
    AttributeMasked(u16),

    #[error("attribute {attribute} reports configured error 0x{status:02x}")]
    AttributeConfiguredError { attribute: u16, status: u8 },

    #[error("path did not resolve to attribute {0} as required")]
    RequiresAttribute(&'static str),

    #[error("Get Attributes All produced zero bytes: no attribute was eligible")]
    NoAttributesAvailable,

    #[error("Set Attribute Single payload was {got} bytes, expected {expected}")]
    SetAttributeSizeMismatch { got: usize, expected: usize },

    #[error("unrecognized symbolic name {0:?}")]
    UnresolvedSymbol(String),

    #[error("path segment {field} was already set when resolving")]
    PathSegmentConflict { field: &'static str },

    #[error("path resolution incomplete: {0}")]
    PathIncomplete(&'static str),

    #[error("index {key} is out of range for attribute of length {len}")]
    IndexOutOfRange { key: String, len: usize },

    #[error("malformed path component {0:?}: {1}")]
    InvalidPathComponent(String, String),

    #[error("only the final path component may specify more than one element")]
    MultiElementNotTrailing,

    #[error("wire data truncated: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unconnected Send route path did not match the configured route")]
    RouteMismatch,

    #[error("SendRRData requires a NULL address item (CPF item 0 of length 0)")]
    NonNullAddress,

    #[error("no session is registered for peer {0}")]
    NoSuchSession(String),

    #[error("configuration key {section}/{key} is missing")]
    MissingConfig { section: String, key: String },

    #[error("configuration value {section}/{key} could not be parsed: {value:?}")]
    InvalidConfig {
        section: String,
        key: String,
        value: String,
    },

    #[error("{0}")]
    Other(String),
}

impl CipError {
    /// The CIP general status this error should surface as, per spec.md §7.
    pub fn status(&self) -> CipStatus {
        match self {
            CipError::UnsupportedService(_) => CipStatus::SERVICE_NOT_SUPPORTED,
            CipError::NoSuchObject { .. } => CipStatus::OBJECT_DOES_NOT_EXIST,
            CipError::AttributeConfiguredError { status, .. } => CipStatus(*status),
            CipError::NoSuchAttribute(_)
            | CipError::AttributeMasked(_)
            | CipError::RequiresAttribute(_)
            | CipError::NoAttributesAvailable
            | CipError::SetAttributeSizeMismatch { .. } => CipStatus::SERVICE_NOT_SUPPORTED,
            _ => CipStatus::SERVICE_NOT_SUPPORTED,
        }
    }
}

pub type Result<T> = std::result::Result<T, CipError>;
