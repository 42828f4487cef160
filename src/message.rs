//! # Message
//!
//! The generic CIP message request/reply envelope (spec.md §4.6, §6):
//! service code, request path, request data in; reply service, general
//! status, reply data out. Every encapsulated CIP exchange (a bare
//! `SendRRData`, each sub-request inside a Multiple Service Packet, a
//! Forward Open/Close) is one of these at the innermost layer.
//!
//! This is the typed replacement for the `dotdict`-shaped request/reply
//! object device.py builds ad hoc per call (spec.md §9's "dynamic
//! dict-everywhere IR" redesign flag) — one sum-free struct pair instead
//! of an untyped bag of whatever keys a given service happened to set.

use crate::error::{CipError, Result};
use crate::path::Path;

/// A parsed CIP message request: service code, target path, and the
/// service-specific request data that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub service: u8,
    pub path: Path,
    pub data: Vec<u8>,
}

impl Request {
    pub fn new(service: u8, path: Path, data: Vec<u8>) -> Self {
        Request { service, path, data }
    }

    /// Encode as `service | EPATH (no pad) | data` (spec.md §6 — request
    /// paths in this crate are unpadded EPATH; only Forward Close's
    /// connection path is word-aligned, see `crate::objects::connection_manager`).
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.service);
        out.extend(self.path.to_wire(false));
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_wire(buf: &[u8]) -> Result<(Request, usize)> {
        if buf.is_empty() {
            return Err(CipError::Truncated {
                needed: 1,
                available: 0,
            });
        }
        let service = buf[0];
        let (path, used) = Path::from_wire(&buf[1..], false)?;
        let consumed = 1 + used;
        Ok((
            Request {
                service,
                path,
                data: buf[consumed..].to_vec(),
            },
            buf.len(),
        ))
    }
}

/// A CIP message reply. `service` is always the *request's* service code
/// (the `| 0x80` reply bit is added in `to_wire`, not stored).
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub service: u8,
    pub status: u8,
    pub data: Vec<u8>,
}

impl Reply {
    pub fn success(service: u8, data: Vec<u8>) -> Self {
        Reply {
            service,
            status: 0,
            data,
        }
    }

    pub fn error(service: u8, status: u8) -> Self {
        Reply {
            service,
            status,
            data: Vec::new(),
        }
    }

    /// Build a reply from a dispatch `Result`, per spec.md §7: the reply
    /// is always produced, carrying the pessimistic status on failure
    /// and an empty data field (any data collected before the failing
    /// step is discarded, not partially returned).
    pub fn from_result(service: u8, result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(data) => Reply::success(service, data),
            Err(err) => Reply::error(service, err.status().0),
        }
    }

    /// Encode as `service|0x80 | reserved(0) | status | data` (spec.md
    /// §4.4, §6 — confirmed against the S1 scenario bytes `8E 00 00 01
    /// 00`, which carry no additional-status-size byte).
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.data.len());
        out.push(self.service | 0x80);
        out.push(0);
        out.push(self.status);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_wire(buf: &[u8]) -> Result<(Reply, usize)> {
        if buf.len() < 3 {
            return Err(CipError::Truncated {
                needed: 3,
                available: buf.len(),
            });
        }
        let service = buf[0] & 0x7F;
        let status = buf[2];
        Ok((
            Reply {
                service,
                status,
                data: buf[3..].to_vec(),
            },
            buf.len(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;

    #[test]
    fn request_round_trips() {
        let req = Request::new(0x0E, Path::class_instance(1, 1), vec![0x01, 0x00]);
        let wire = req.to_wire();
        let (decoded, used) = Request::from_wire(&wire).unwrap();
        assert_eq!(used, wire.len());
        assert_eq!(decoded.service, 0x0E);
        assert_eq!(decoded.data, vec![0x01, 0x00]);
    }

    #[test]
    fn reply_sets_high_bit_and_carries_status() {
        let reply = Reply::error(0x0E, 0x08);
        let wire = reply.to_wire();
        assert_eq!(wire[0], 0x8E);
        assert_eq!(wire[2], 0x08);
        let (decoded, _) = Reply::from_wire(&wire).unwrap();
        assert_eq!(decoded.service, 0x0E);
        assert_eq!(decoded.status, 0x08);
    }
}
