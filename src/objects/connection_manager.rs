//! # Connection Manager Object (class 0x06)
//!
//! Forward Open/Close (connected-messaging session bookkeeping) and
//! Unconnected Send (the "run this embedded request, but only after
//! checking the route path" wrapper used to reach objects behind a
//! router). Mirrors `Connection_Manager.forward_open`/`forward_close`/
//! `request` (device.py ~L1917-2166).
//!
//! Scope note: this object tracks no persistent connection table —
//! Forward Open allocates a fresh pair of connection ids and echoes the
//! requested parameters back; Forward Close always succeeds. Real
//! connected (class 1/2) I/O data transfer over the opened connection is
//! out of scope (spec.md's non-goals exclude implicit/cyclic I/O), so
//! there is nothing further to track once the handshake completes.

use crate::attribute::Attribute;
use crate::error::{CipError, Result};
use crate::message::Request;
use crate::object::Object;
use crate::objects::{message_router, CLASS_CONNECTION_MANAGER};
use crate::path::Path;
use crate::registry::Registry;
use rand::Rng;
use tracing::{debug, warn};

pub const SERVICE_FORWARD_OPEN: u8 = 0x54;
pub const SERVICE_FORWARD_CLOSE: u8 = 0x4E;
pub const SERVICE_UNCONNECTED_SEND: u8 = 0x52;

pub fn new(registry: &Registry, instance_id: u16) -> Object {
    Object::new(registry, CLASS_CONNECTION_MANAGER, instance_id, "Connection Manager")
        .with_attribute(1, Attribute::scalar("Revision", crate::attribute::Elem::Uint(1)))
}

/// Class-specific dispatch: Forward Open/Close are matched here, ahead of
/// the three generic services every `Object` answers (spec.md §4.4's
/// "derived classes define class-level constants: service, transit, and
/// parser" — this is this class's sub-automaton). Called by
/// `message_router::route` once a request resolves to a Connection
/// Manager instance, so Forward Open/Close reach this handler regardless
/// of whether they arrive as a bare `SendRRData` or nested in a Multiple
/// Service Packet.
pub fn request(
    registry: &Registry,
    obj: &mut Object,
    service: u8,
    attribute: Option<u16>,
    data: &[u8],
    route_path: Option<&Path>,
) -> Result<Vec<u8>> {
    match service {
        SERVICE_FORWARD_OPEN => {
            debug!("Connection Manager instance {}: Forward Open", obj.instance_id);
            forward_open(data)
        }
        SERVICE_FORWARD_CLOSE => {
            debug!("Connection Manager instance {}: Forward Close", obj.instance_id);
            forward_close(data)
        }
        SERVICE_UNCONNECTED_SEND => {
            debug!("Connection Manager instance {}: Unconnected Send", obj.instance_id);
            unconnected_send(registry, route_path, data)
        }
        other => obj.request(registry, other, attribute, data),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOpenRequest {
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    pub o_t_connection_id: u32,
    pub t_o_connection_id: u32,
    pub connection_serial_number: u16,
    pub originator_vendor_id: u16,
    pub originator_serial_number: u32,
    pub connection_timeout_multiplier: u8,
    pub o_t_rpi: u32,
    pub o_t_params: u16,
    pub t_o_rpi: u32,
    pub t_o_params: u16,
    pub transport_type_trigger: u8,
    pub connection_path: Path,
}

impl ForwardOpenRequest {
    pub fn from_wire(buf: &[u8]) -> Result<(Self, usize)> {
        const HEADER_LEN: usize = 35;
        if buf.len() < HEADER_LEN {
            return Err(CipError::Truncated {
                needed: HEADER_LEN,
                available: buf.len(),
            });
        }
        let u16_at = |o: usize| u16::from_le_bytes([buf[o], buf[o + 1]]);
        let u32_at = |o: usize| u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        let req = ForwardOpenRequest {
            priority_time_tick: buf[0],
            timeout_ticks: buf[1],
            o_t_connection_id: u32_at(2),
            t_o_connection_id: u32_at(6),
            connection_serial_number: u16_at(10),
            originator_vendor_id: u16_at(12),
            originator_serial_number: u32_at(14),
            connection_timeout_multiplier: buf[18],
            // buf[19..22] reserved
            o_t_rpi: u32_at(22),
            o_t_params: u16_at(26),
            t_o_rpi: u32_at(28),
            t_o_params: u16_at(32),
            transport_type_trigger: buf[34],
            connection_path: Path::default(),
        };
        // Forward Open's connection path is NOT word-aligned (no pad byte
        // between the size and the segments) — Forward Close is the one
        // with the pad, per spec.md §4.7.
        let (path, used) = Path::from_wire(&buf[HEADER_LEN..], false)?;
        Ok((
            ForwardOpenRequest {
                connection_path: path,
                ..req
            },
            HEADER_LEN + used,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOpenReply {
    pub o_t_connection_id: u32,
    pub t_o_connection_id: u32,
    pub connection_serial_number: u16,
    pub originator_vendor_id: u16,
    pub originator_serial_number: u32,
    pub o_t_api: u32,
    pub t_o_api: u32,
}

impl ForwardOpenReply {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(26);
        out.extend_from_slice(&self.o_t_connection_id.to_le_bytes());
        out.extend_from_slice(&self.t_o_connection_id.to_le_bytes());
        out.extend_from_slice(&self.connection_serial_number.to_le_bytes());
        out.extend_from_slice(&self.originator_vendor_id.to_le_bytes());
        out.extend_from_slice(&self.originator_serial_number.to_le_bytes());
        out.extend_from_slice(&self.o_t_api.to_le_bytes());
        out.extend_from_slice(&self.t_o_api.to_le_bytes());
        out.push(0); // application reply size (words)
        out.push(0); // reserved
        out
    }
}

pub fn forward_open(data: &[u8]) -> Result<Vec<u8>> {
    let (req, _) = ForwardOpenRequest::from_wire(data)?;
    let mut rng = rand::thread_rng();
    let reply = ForwardOpenReply {
        o_t_connection_id: rng.gen(),
        t_o_connection_id: rng.gen(),
        connection_serial_number: req.connection_serial_number,
        originator_vendor_id: req.originator_vendor_id,
        originator_serial_number: req.originator_serial_number,
        o_t_api: req.o_t_rpi,
        t_o_api: req.t_o_rpi,
    };
    Ok(reply.to_wire())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardCloseRequest {
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    pub connection_serial_number: u16,
    pub originator_vendor_id: u16,
    pub originator_serial_number: u32,
    pub connection_path: Path,
}

impl ForwardCloseRequest {
    pub fn from_wire(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 10 {
            return Err(CipError::Truncated {
                needed: 10,
                available: buf.len(),
            });
        }
        let connection_serial_number = u16::from_le_bytes([buf[2], buf[3]]);
        let originator_vendor_id = u16::from_le_bytes([buf[4], buf[5]]);
        let originator_serial_number = u32::from_le_bytes(buf[6..10].try_into().unwrap());
        // buf[10] path size, buf[11] reserved, path starts at 12
        let (path, used) = Path::from_wire(&buf[10..], true)?;
        Ok((
            ForwardCloseRequest {
                priority_time_tick: buf[0],
                timeout_ticks: buf[1],
                connection_serial_number,
                originator_vendor_id,
                originator_serial_number,
                connection_path: path,
            },
            10 + used,
        ))
    }
}

pub fn forward_close(data: &[u8]) -> Result<Vec<u8>> {
    let (req, _) = ForwardCloseRequest::from_wire(data)?;
    let mut out = Vec::new();
    out.extend_from_slice(&req.connection_serial_number.to_le_bytes());
    out.extend_from_slice(&req.originator_vendor_id.to_le_bytes());
    out.extend_from_slice(&req.originator_serial_number.to_le_bytes());
    out.push(0); // application reply size
    out.push(0); // reserved
    Ok(out)
}

/// Unconnected Send: `Priority/Time_tick | Timeout_ticks | message
/// request size (UINT) | embedded message request [+ pad byte] | route
/// path size (USINT) | reserved | route path`. The embedded request's
/// service and path are peeked just enough to know what to dispatch —
/// the full target object only sees its own service/path/data, never
/// the Unconnected Send wrapper (device.py ~L1997-2090).
///
/// `configured_route` is UCMM's route path, if any was configured
/// (device.py ~L1170-1360: `self.route_path is None` skips the check
/// outright). Three states: unset (`None`) skips validation entirely;
/// an empty configured path requires the wire path to also be empty;
/// otherwise the wire path must match it exactly.
pub fn unconnected_send(registry: &Registry, configured_route: Option<&Path>, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 4 {
        return Err(CipError::Truncated {
            needed: 4,
            available: data.len(),
        });
    }
    let message_request_size = u16::from_le_bytes([data[2], data[3]]) as usize;
    let embedded_start = 4;
    let embedded_end = embedded_start + message_request_size;
    if data.len() < embedded_end {
        return Err(CipError::Truncated {
            needed: embedded_end,
            available: data.len(),
        });
    }
    let pad = message_request_size % 2;
    let route_start = embedded_end + pad;
    if data.len() < route_start + 1 {
        return Err(CipError::Truncated {
            needed: route_start + 1,
            available: data.len(),
        });
    }
    let (route_path, _) = Path::from_wire(&data[route_start..], true)?;
    if let Some(configured_route) = configured_route {
        if route_path != *configured_route {
            warn!("Unconnected Send route path did not match the configured route; aborting");
            return Err(CipError::RouteMismatch);
        }
    }

    let (embedded_request, _) = Request::from_wire(&data[embedded_start..embedded_end])?;
    message_router::route(registry, &embedded_request, configured_route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Segment;

    fn sample_forward_open_bytes(serial: u16) -> Vec<u8> {
        let mut out = vec![0x0A, 0x0E]; // priority/time_tick, timeout_ticks
        out.extend_from_slice(&0u32.to_le_bytes()); // o_t id
        out.extend_from_slice(&0u32.to_le_bytes()); // t_o id
        out.extend_from_slice(&serial.to_le_bytes()); // connection serial
        out.extend_from_slice(&0x1234u16.to_le_bytes()); // vendor id
        out.extend_from_slice(&0xAAAAu32.to_le_bytes()); // originator serial
        out.push(0x07); // timeout multiplier
        out.extend_from_slice(&[0, 0, 0]); // reserved
        out.extend_from_slice(&2_000_000u32.to_le_bytes()); // o_t rpi
        out.extend_from_slice(&0x4302u16.to_le_bytes()); // o_t params
        out.extend_from_slice(&2_000_000u32.to_le_bytes()); // t_o rpi
        out.extend_from_slice(&0x4302u16.to_le_bytes()); // t_o params
        out.push(0xA3); // transport type/trigger
        out.extend(Path::class_instance(0x02, 1).to_wire(false));
        out
    }

    #[test]
    fn forward_open_echoes_serial_and_vendor() {
        let bytes = sample_forward_open_bytes(0x0102);
        let reply = forward_open(&bytes).unwrap();
        let serial = u16::from_le_bytes([reply[8], reply[9]]);
        assert_eq!(serial, 0x0102);
    }

    #[test]
    fn forward_open_connection_path_is_unpadded() {
        // sample_forward_open_bytes appends an unpadded path; reparsing
        // should consume exactly HEADER_LEN + path bytes with nothing
        // left over, and recover the same logical path.
        let bytes = sample_forward_open_bytes(0x0102);
        let unpadded_path = Path::class_instance(0x02, 1).to_wire(false);
        let (req, used) = ForwardOpenRequest::from_wire(&bytes).unwrap();
        assert_eq!(req.connection_path, Path::class_instance(0x02, 1));
        assert_eq!(used, bytes.len());
        assert_eq!(&bytes[bytes.len() - unpadded_path.len()..], &unpadded_path[..]);
    }

    #[test]
    fn unconnected_send_checks_route_before_dispatch() {
        let registry = Registry::new();
        let identity = crate::objects::identity::new(&registry, 1, 1, 1, 1, (1, 1), 0, 1, "x");
        registry.register(identity);

        let configured_route = Path::new(vec![Segment::Port { port: 1, link: crate::path::PortLink::Number(0) }]);
        let embedded = Request::new(
            0x0E,
            Path::new(vec![Segment::Class(0x01), Segment::Instance(1), Segment::Attribute(1)]),
            Vec::new(),
        )
        .to_wire();
        let mut data = vec![0x0A, 0x0E];
        data.extend_from_slice(&(embedded.len() as u16).to_le_bytes());
        data.extend_from_slice(&embedded);
        if embedded.len() % 2 == 1 {
            data.push(0);
        }
        data.extend(configured_route.to_wire(true));

        let out = unconnected_send(&registry, Some(&configured_route), &data).unwrap();
        assert_eq!(out, vec![1, 0]);

        let wrong_route = Path::new(vec![Segment::Port { port: 2, link: crate::path::PortLink::Number(9) }]);
        let err = unconnected_send(&registry, Some(&wrong_route), &data).unwrap_err();
        assert!(matches!(err, CipError::RouteMismatch));

        // An unset configured route (None) skips validation entirely —
        // any wire route path, including a mismatched one, is accepted.
        let out = unconnected_send(&registry, None, &data).unwrap();
        assert_eq!(out, vec![1, 0]);
    }
}
