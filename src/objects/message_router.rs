//! # Message Router Object (class 0x02)
//!
//! Routes a parsed [`Request`] to the object its path resolves to
//! (spec.md §4.6), and implements the Multiple Service Packet service
//! (`0x0A`): an offset table of sub-requests, each routed independently
//! and reassembled into a matching offset table of sub-replies. Mirrors
//! `Message_Router.route`/`request`/`produce` (device.py ~L1516-1745).

use crate::attribute::{Attribute, Elem};
use crate::error::{CipError, Result};
use crate::message::{Reply, Request};
use crate::object::Object;
use crate::objects::{connection_manager, CLASS_CONNECTION_MANAGER, CLASS_MESSAGE_ROUTER};
use crate::path::Path;
use crate::registry::Registry;
use tracing::trace;

pub const SERVICE_MULTIPLE_SERVICE_PACKET: u8 = 0x0A;

pub fn new(registry: &Registry, instance_id: u16) -> Object {
    Object::new(registry, CLASS_MESSAGE_ROUTER, instance_id, "Message Router")
        .with_attribute(1, Attribute::vector("ObjectList", vec![Elem::Uint(0)]))
}

/// Route one request to its target object and return the raw response
/// data (not yet wrapped in a [`Reply`] envelope — callers that need the
/// envelope call [`Reply::from_result`] themselves, since a MSP
/// sub-request and a bare `SendRRData` both need the envelope built at
/// different points). `route_path` is the UCMM's configured route, if
/// any — threaded through so a Connection Manager instance reached via
/// this path (bare `SendRRData` or nested in a Multiple Service Packet)
/// can validate an embedded Unconnected Send the same way a top-level
/// one does.
pub fn route(registry: &Registry, request: &Request, route_path: Option<&Path>) -> Result<Vec<u8>> {
    if request.service == SERVICE_MULTIPLE_SERVICE_PACKET {
        return dispatch_multiple(registry, &request.data, route_path);
    }
    dispatch_single(registry, request, route_path)
}

fn dispatch_single(registry: &Registry, request: &Request, route_path: Option<&Path>) -> Result<Vec<u8>> {
    let resolved = registry.resolve(&request.path)?;
    trace!(
        service = format!("0x{:02x}", request.service),
        class = resolved.class,
        instance = resolved.instance,
        "routing request"
    );
    let object = registry
        .lookup(resolved.class, resolved.instance)
        .ok_or(CipError::NoSuchObject {
            class: resolved.class,
            instance: resolved.instance,
        })?;
    let mut object = object.lock();
    // Every concrete class's extra services are matched here, ahead of the
    // three generic ones `Object::request` answers — Identity and TCP/IP
    // add none of their own (spec.md §4.5), so they fall straight through.
    match object.class_id {
        CLASS_CONNECTION_MANAGER => connection_manager::request(
            registry,
            &mut object,
            request.service,
            resolved.attribute,
            &request.data,
            route_path,
        ),
        _ => object.request(registry, request.service, resolved.attribute, &request.data),
    }
}

/// Each sub-request in a Multiple Service Packet is independently routed
/// to whatever object it targets, so two sub-requests against two
/// different objects run back-to-back without either holding the
/// other's lock — there's no MSP-specific lock-ordering concern here
/// because `route` never locks the Message Router itself, only the
/// leaf object each sub-path resolves to.
fn dispatch_multiple(registry: &Registry, data: &[u8], route_path: Option<&Path>) -> Result<Vec<u8>> {
    if data.len() < 2 {
        return Err(CipError::Truncated {
            needed: 2,
            available: data.len(),
        });
    }
    let count = u16::from_le_bytes([data[0], data[1]]) as usize;
    let header_len = 2 + count * 2;
    if data.len() < header_len {
        return Err(CipError::Truncated {
            needed: header_len,
            available: data.len(),
        });
    }
    let offsets: Vec<usize> = (0..count)
        .map(|i| {
            let pos = 2 + i * 2;
            u16::from_le_bytes([data[pos], data[pos + 1]]) as usize
        })
        .collect();

    let mut replies = Vec::with_capacity(count);
    for i in 0..count {
        let start = offsets[i];
        let end = if i + 1 < count { offsets[i + 1] } else { data.len() };
        if start > data.len() || end > data.len() || start > end {
            return Err(CipError::Truncated {
                needed: end,
                available: data.len(),
            });
        }
        let (sub_request, _) = Request::from_wire(&data[start..end])?;
        let result = route(registry, &sub_request, route_path);
        replies.push(Reply::from_result(sub_request.service, result));
    }

    let bodies: Vec<Vec<u8>> = replies.iter().map(Reply::to_wire).collect();
    let reply_header_len = 2 + bodies.len() * 2;
    let mut out = Vec::new();
    out.extend_from_slice(&(bodies.len() as u16).to_le_bytes());
    let mut running = reply_header_len;
    for body in &bodies {
        out.extend_from_slice(&(running as u16).to_le_bytes());
        running += body.len();
    }
    for body in bodies {
        out.extend_from_slice(&body);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::identity;
    use crate::path::Path;

    fn setup() -> Registry {
        let registry = Registry::new();
        let identity = identity::new(&registry, 1, 0x1234, 0x0C, 1, (1, 2), 0, 42, "Widget");
        registry.register(identity);
        registry
    }

    #[test]
    fn forward_open_routes_through_connection_manager_class_dispatch() {
        let registry = setup();
        registry.register(connection_manager::new(&registry, 1));

        let mut data = vec![0x0A, 0x0E]; // priority/time_tick, timeout_ticks
        data.extend_from_slice(&0u32.to_le_bytes()); // o_t id
        data.extend_from_slice(&0u32.to_le_bytes()); // t_o id
        data.extend_from_slice(&0x0102u16.to_le_bytes()); // connection serial
        data.extend_from_slice(&0x1234u16.to_le_bytes()); // vendor id
        data.extend_from_slice(&0xAAAAu32.to_le_bytes()); // originator serial
        data.push(0x07); // timeout multiplier
        data.extend_from_slice(&[0, 0, 0]); // reserved
        data.extend_from_slice(&2_000_000u32.to_le_bytes()); // o_t rpi
        data.extend_from_slice(&0x4302u16.to_le_bytes()); // o_t params
        data.extend_from_slice(&2_000_000u32.to_le_bytes()); // t_o rpi
        data.extend_from_slice(&0x4302u16.to_le_bytes()); // t_o params
        data.push(0xA3); // transport type/trigger
        data.extend(Path::class_instance(0x06, 1).to_wire(false));

        let request = Request::new(
            connection_manager::SERVICE_FORWARD_OPEN,
            Path::class_instance(0x06, 1),
            data,
        );
        let out = route(&registry, &request, None).unwrap();
        // O->T connection id is echoed at the head of the reply.
        assert!(out.len() >= 10);
        let serial = u16::from_le_bytes([out[8], out[9]]);
        assert_eq!(serial, 0x0102);
    }

    #[test]
    fn routes_single_request_to_identity() {
        let registry = setup();
        let request = Request::new(0x0E, Path::new(vec![
            crate::path::Segment::Class(0x01),
            crate::path::Segment::Instance(1),
            crate::path::Segment::Attribute(1),
        ]), Vec::new());
        let data = route(&registry, &request, None).unwrap();
        assert_eq!(data, vec![0x34, 0x12]);
    }

    #[test]
    fn multiple_service_packet_reassembles_offsets() {
        let registry = setup();
        let sub_a = Request::new(
            0x0E,
            Path::new(vec![
                crate::path::Segment::Class(0x01),
                crate::path::Segment::Instance(1),
                crate::path::Segment::Attribute(1),
            ]),
            Vec::new(),
        )
        .to_wire();
        let sub_b = Request::new(
            0x0E,
            Path::new(vec![
                crate::path::Segment::Class(0x01),
                crate::path::Segment::Instance(1),
                crate::path::Segment::Attribute(3),
            ]),
            Vec::new(),
        )
        .to_wire();
        let header_len = 2 + 2 * 2;
        let mut data = Vec::new();
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&(header_len as u16).to_le_bytes());
        data.extend_from_slice(&((header_len + sub_a.len()) as u16).to_le_bytes());
        data.extend_from_slice(&sub_a);
        data.extend_from_slice(&sub_b);

        let request = Request::new(SERVICE_MULTIPLE_SERVICE_PACKET, Path::class_instance(0x02, 1), data);
        let out = route(&registry, &request, None).unwrap();
        let count = u16::from_le_bytes([out[0], out[1]]);
        assert_eq!(count, 2);
        let off0 = u16::from_le_bytes([out[2], out[3]]) as usize;
        let off1 = u16::from_le_bytes([out[4], out[5]]) as usize;
        let (reply_a, _) = Reply::from_wire(&out[off0..off1]).unwrap();
        let (reply_b, _) = Reply::from_wire(&out[off1..]).unwrap();
        assert_eq!(reply_a.data, vec![0x34, 0x12]);
        assert_eq!(reply_b.data, vec![1, 0]);
    }
}
