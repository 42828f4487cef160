//! # UCMM — Unconnected Message Manager
//!
//! The encapsulation-layer command dispatcher (spec.md §4.8): Register
//! Session, Unregister Session, List Identity, List Interfaces, List
//! Services, the legacy (pre-encapsulation) 0x0001 command, and
//! `SendRRData` (which unwraps a CPF-framed message request and routes
//! it through the Message Router / Connection Manager). Mirrors `UCMM`
//! (device.py ~L1172-1421).
//!
//! A session is nothing more than a `u32` handle a registered peer must
//! echo back on every subsequent command; there is no authentication
//! (spec.md's non-goals exclude it) and no per-session state beyond the
//! handle itself.

use crate::codec::Primitive;
use crate::error::{CipError, Result};
use crate::message::{Reply, Request};
use crate::object::Object;
use crate::objects::{connection_manager, identity, message_router, tcpip};
use crate::path::Path;
use crate::registry::Registry;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashSet;
use tracing::{debug, warn};

pub const COMMAND_NOP: u16 = 0x0000;
pub const COMMAND_LIST_SERVICES: u16 = 0x0004;
pub const COMMAND_LIST_IDENTITY: u16 = 0x0063;
pub const COMMAND_LIST_INTERFACES: u16 = 0x0064;
pub const COMMAND_REGISTER_SESSION: u16 = 0x0065;
pub const COMMAND_UNREGISTER_SESSION: u16 = 0x0066;
pub const COMMAND_SEND_RR_DATA: u16 = 0x006F;
/// Legacy pre-encapsulation identity query (spec.md §4.8).
pub const COMMAND_LEGACY_IDENTITY: u16 = 0x0001;

const CPF_ITEM_NULL_ADDRESS: u16 = 0x0000;
const CPF_ITEM_UNCONNECTED_DATA: u16 = 0x00B2;
const ENCAPSULATION_PROTOCOL_VERSION: u16 = 1;
const TCP_PORT: u16 = 44818;

/// One encapsulation header + command-specific payload, as received from
/// or sent to a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub command: u16,
    pub session_handle: u32,
    pub status: u32,
    pub sender_context: [u8; 8],
    pub options: u32,
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.data.len());
        out.extend_from_slice(&self.command.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.session_handle.to_le_bytes());
        out.extend_from_slice(&self.status.to_le_bytes());
        out.extend_from_slice(&self.sender_context);
        out.extend_from_slice(&self.options.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_wire(buf: &[u8]) -> Result<(Envelope, usize)> {
        if buf.len() < 24 {
            return Err(CipError::Truncated {
                needed: 24,
                available: buf.len(),
            });
        }
        let command = u16::from_le_bytes([buf[0], buf[1]]);
        let length = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let session_handle = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let status = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let mut sender_context = [0u8; 8];
        sender_context.copy_from_slice(&buf[12..20]);
        let options = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        if buf.len() < 24 + length {
            return Err(CipError::Truncated {
                needed: 24 + length,
                available: buf.len(),
            });
        }
        Ok((
            Envelope {
                command,
                session_handle,
                status,
                sender_context,
                options,
                data: buf[24..24 + length].to_vec(),
            },
            24 + length,
        ))
    }

    fn reply(&self, status: u32, data: Vec<u8>) -> Envelope {
        Envelope {
            command: self.command,
            session_handle: self.session_handle,
            status,
            sender_context: self.sender_context,
            options: 0,
            data,
        }
    }
}

/// Live session table plus the objects a request may be routed to.
pub struct Ucmm {
    registry: Registry,
    sessions: RwLock<HashSet<u32>>,
    /// UCMM's configured route path, if any (spec.md line 168). `None`
    /// means unset — an Unconnected Send's wire route path is accepted
    /// unconditionally, matching device.py's `self.route_path is None`
    /// check (~L1170-1360).
    route_path: Option<Path>,
    identity_instance: u16,
    tcpip_instance: u16,
}

impl Ucmm {
    /// Build a UCMM over a fresh [`Registry`], populating it with one
    /// Identity instance, one TCP/IP Interface instance, one Message
    /// Router instance, and one Connection Manager instance (spec.md
    /// §4.8's minimum object set for a conforming device).
    pub fn new(identity_obj: Object, tcpip_obj: Object, route_path: Option<Path>) -> Ucmm {
        let registry = Registry::new();
        let identity_instance = identity_obj.instance_id;
        let tcpip_instance = tcpip_obj.instance_id;
        registry.register(identity_obj);
        registry.register(tcpip_obj);
        registry.register(message_router::new(&registry, 1));
        registry.register(connection_manager::new(&registry, 1));
        Ucmm {
            registry,
            sessions: RwLock::new(HashSet::new()),
            route_path,
            identity_instance,
            tcpip_instance,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatch one encapsulation command, returning the reply envelope.
    pub fn request(&self, envelope: &Envelope) -> Envelope {
        match self.dispatch(envelope) {
            Ok(reply) => reply,
            Err(err) => envelope.reply(err.status().0 as u32, Vec::new()),
        }
    }

    fn dispatch(&self, envelope: &Envelope) -> Result<Envelope> {
        match envelope.command {
            COMMAND_NOP => Ok(envelope.reply(0, Vec::new())),
            COMMAND_REGISTER_SESSION => self.register_session(envelope),
            COMMAND_UNREGISTER_SESSION => self.unregister_session(envelope),
            COMMAND_LIST_IDENTITY => self.list_identity(envelope),
            COMMAND_LIST_INTERFACES => self.list_interfaces(envelope),
            COMMAND_LIST_SERVICES => self.list_services(envelope),
            COMMAND_LEGACY_IDENTITY => self.legacy_identity(envelope),
            COMMAND_SEND_RR_DATA => self.send_rr_data(envelope),
            other => {
                warn!("unrecognized CIP command 0x{other:04x}");
                Err(CipError::UnsupportedService(other as u8))
            }
        }
    }

    fn register_session(&self, envelope: &Envelope) -> Result<Envelope> {
        let session = loop {
            let candidate: u32 = rand::thread_rng().gen_range(1..=u32::MAX);
            let mut sessions = self.sessions.write();
            if sessions.insert(candidate) {
                break candidate;
            }
        };
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&ENCAPSULATION_PROTOCOL_VERSION.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes()); // options flags
        let mut reply = envelope.reply(0, data);
        reply.session_handle = session;
        debug!("registered session 0x{session:08x}");
        Ok(reply)
    }

    fn unregister_session(&self, envelope: &Envelope) -> Result<Envelope> {
        self.require_session(envelope.session_handle)?;
        self.sessions.write().remove(&envelope.session_handle);
        Ok(envelope.reply(0, Vec::new()))
    }

    fn require_session(&self, handle: u32) -> Result<()> {
        if self.sessions.read().contains(&handle) {
            Ok(())
        } else {
            Err(CipError::NoSuchSession(handle.to_string()))
        }
    }

    /// List Identity: reads the Identity object's attributes plus the
    /// TCP/IP Interface's configured address back through their own Get
    /// Attribute Single parsers — the round trip spec.md §9 flags as
    /// suspicious (see `crate::objects::tcpip::get_interface_config`).
    fn list_identity(&self, envelope: &Envelope) -> Result<Envelope> {
        let identity_obj = self
            .registry
            .lookup(crate::objects::CLASS_IDENTITY, self.identity_instance)
            .ok_or(CipError::NoSuchObject {
                class: crate::objects::CLASS_IDENTITY,
                instance: self.identity_instance,
            })?;
        let identity_obj = identity_obj.lock();
        let tcpip_obj = self
            .registry
            .lookup(crate::objects::CLASS_TCPIP_INTERFACE, self.tcpip_instance)
            .ok_or(CipError::NoSuchObject {
                class: crate::objects::CLASS_TCPIP_INTERFACE,
                instance: self.tcpip_instance,
            })?;
        let tcpip_obj = tcpip_obj.lock();
        let iface = tcpip::get_interface_config(&tcpip_obj, &self.registry)?;

        let vendor_id = identity_obj.get_attribute_single(&self.registry, identity::ATTR_VENDOR_ID)?;
        let device_type = identity_obj.get_attribute_single(&self.registry, identity::ATTR_DEVICE_TYPE)?;
        let product_code = identity_obj.get_attribute_single(&self.registry, identity::ATTR_PRODUCT_CODE)?;
        let revision = identity_obj.get_attribute_single(&self.registry, identity::ATTR_REVISION)?;
        let status = identity_obj.get_attribute_single(&self.registry, identity::ATTR_STATUS)?;
        let serial_number = identity_obj.get_attribute_single(&self.registry, identity::ATTR_SERIAL_NUMBER)?;
        let product_name = identity_obj.get_attribute_single(&self.registry, identity::ATTR_PRODUCT_NAME)?;
        let state = identity_obj.get_attribute_single(&self.registry, identity::ATTR_STATE)?;

        let mut item = Vec::new();
        item.extend_from_slice(&1u16.to_le_bytes()); // socket family: AF_INET
        item.extend_from_slice(&TCP_PORT.to_be_bytes());
        item.extend_from_slice(&iface.ip_address.to_le_bytes());
        item.extend_from_slice(&[0u8; 8]); // sin_zero
        item.extend_from_slice(&ENCAPSULATION_PROTOCOL_VERSION.to_le_bytes());
        item.extend_from_slice(&vendor_id);
        item.extend_from_slice(&device_type);
        item.extend_from_slice(&product_code);
        item.extend_from_slice(&revision);
        item.extend_from_slice(&status);
        item.extend_from_slice(&serial_number);
        item.extend_from_slice(&product_name); // already an SSTRING: length byte + bytes
        item.extend_from_slice(&state);

        let mut cpf = Vec::new();
        cpf.extend_from_slice(&1u16.to_le_bytes()); // item count
        cpf.extend_from_slice(&0x000Cu16.to_le_bytes()); // List Identity response item type
        cpf.extend_from_slice(&(item.len() as u16).to_le_bytes());
        cpf.extend_from_slice(&item);

        Ok(envelope.reply(0, cpf))
    }

    fn list_interfaces(&self, envelope: &Envelope) -> Result<Envelope> {
        let mut cpf = Vec::new();
        cpf.extend_from_slice(&0u16.to_le_bytes()); // no optional interface items
        Ok(envelope.reply(0, cpf))
    }

    fn list_services(&self, envelope: &Envelope) -> Result<Envelope> {
        let mut name = [0u8; 16];
        let label = b"Communications";
        name[..label.len()].copy_from_slice(label);

        let mut item = Vec::new();
        item.extend_from_slice(&1u16.to_le_bytes()); // protocol version
        item.extend_from_slice(&0x0020u16.to_le_bytes()); // capability flags: supports CIP encapsulation
        item.extend_from_slice(&name);

        let mut cpf = Vec::new();
        cpf.extend_from_slice(&1u16.to_le_bytes());
        cpf.extend_from_slice(&0x0100u16.to_le_bytes()); // List Services response item type
        cpf.extend_from_slice(&(item.len() as u16).to_le_bytes());
        cpf.extend_from_slice(&item);
        Ok(envelope.reply(0, cpf))
    }

    /// The legacy pre-encapsulation identity command echoes the same
    /// socket address fields List Identity does, at a fixed port.
    fn legacy_identity(&self, envelope: &Envelope) -> Result<Envelope> {
        let tcpip_obj = self
            .registry
            .lookup(crate::objects::CLASS_TCPIP_INTERFACE, self.tcpip_instance)
            .ok_or(CipError::NoSuchObject {
                class: crate::objects::CLASS_TCPIP_INTERFACE,
                instance: self.tcpip_instance,
            })?;
        let tcpip_obj = tcpip_obj.lock();
        let iface = tcpip::get_interface_config(&tcpip_obj, &self.registry)?;
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_le_bytes()); // sin_family: AF_INET
        data.extend_from_slice(&TCP_PORT.to_be_bytes());
        data.extend_from_slice(&iface.ip_address.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]);
        Ok(envelope.reply(0, data))
    }

    /// SendRRData: one NULL address item, one Unconnected Data item
    /// carrying the message request (spec.md §4.8/§6's CPF framing).
    fn send_rr_data(&self, envelope: &Envelope) -> Result<Envelope> {
        self.require_session(envelope.session_handle)?;
        let data = &envelope.data;
        if data.len() < 6 {
            return Err(CipError::Truncated {
                needed: 6,
                available: data.len(),
            });
        }
        // Interface handle (UDINT) + timeout (UINT) precede the CPF item count.
        let item_count = u16::from_le_bytes([data[6], data[7]]);
        let mut pos = 8;
        let mut null_seen = false;
        let mut message_request: Option<&[u8]> = None;
        for _ in 0..item_count {
            if data.len() < pos + 4 {
                return Err(CipError::Truncated {
                    needed: pos + 4,
                    available: data.len(),
                });
            }
            let item_type = u16::from_le_bytes([data[pos], data[pos + 1]]);
            let item_len = u16::from_le_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 4;
            if data.len() < pos + item_len {
                return Err(CipError::Truncated {
                    needed: pos + item_len,
                    available: data.len(),
                });
            }
            match item_type {
                CPF_ITEM_NULL_ADDRESS => {
                    if item_len != 0 {
                        return Err(CipError::NonNullAddress);
                    }
                    null_seen = true;
                }
                CPF_ITEM_UNCONNECTED_DATA => {
                    message_request = Some(&data[pos..pos + item_len]);
                }
                _ => {}
            }
            pos += item_len;
        }
        if !null_seen {
            return Err(CipError::NonNullAddress);
        }
        let message_request = message_request.ok_or(CipError::Truncated {
            needed: pos,
            available: data.len(),
        })?;

        let (request, _) = Request::from_wire(message_request)?;
        // spec.md §4.8: an Unconnected Send's own path normally targets the
        // Connection Manager (0x06/1); anything else still gets dispatched
        // there via the registry (it's the only object implementing
        // Unconnected Send) but is surprising enough to warn about.
        if request.service == connection_manager::SERVICE_UNCONNECTED_SEND {
            if let Ok(resolved) = self.registry.resolve(&request.path) {
                if (resolved.class, resolved.instance)
                    != (crate::objects::CLASS_CONNECTION_MANAGER, 1)
                {
                    warn!(
                        "Unconnected Send addressed class 0x{:02x} instance {}, not the Connection Manager",
                        resolved.class, resolved.instance
                    );
                }
            }
        }
        let reply_data = message_router::route(&self.registry, &request, self.route_path.as_ref());
        let reply = Reply::from_result(request.service, reply_data);

        let mut cpf = Vec::new();
        cpf.extend_from_slice(&0u32.to_le_bytes()); // interface handle
        cpf.extend_from_slice(&0u16.to_le_bytes()); // timeout
        cpf.extend_from_slice(&2u16.to_le_bytes()); // item count
        cpf.extend_from_slice(&CPF_ITEM_NULL_ADDRESS.to_le_bytes());
        cpf.extend_from_slice(&0u16.to_le_bytes());
        let reply_wire = reply.to_wire();
        cpf.extend_from_slice(&CPF_ITEM_UNCONNECTED_DATA.to_le_bytes());
        cpf.extend_from_slice(&(reply_wire.len() as u16).to_le_bytes());
        cpf.extend_from_slice(&reply_wire);

        Ok(envelope.reply(0, cpf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IfaceAddrs;
    use crate::path::Segment;

    fn build_ucmm() -> Ucmm {
        let registry = Registry::new();
        let identity_obj = identity::new(&registry, 1, 0x1234, 0x0C, 1, (1, 2), 0, 42, "Widget");
        let iface = IfaceAddrs {
            ip_address: u32::from_le_bytes([10, 0, 0, 5]),
            network_mask: u32::from_le_bytes([255, 255, 255, 0]),
            gateway_address: 0,
            name_server: 0,
            name_server_2: 0,
            domain_name: String::new(),
        };
        let tcpip_obj = tcpip::new(&registry, 1, iface, "widget-01");
        let route_path = Path::new(vec![Segment::Port {
            port: 1,
            link: crate::path::PortLink::Number(0),
        }]);
        // `registry` is discarded in favor of the one `Ucmm::new` builds;
        // these objects carry no registry-internal state so that's fine.
        Ucmm::new(identity_obj, tcpip_obj, Some(route_path))
    }

    #[test]
    fn register_then_unregister_session() {
        let ucmm = build_ucmm();
        let register = Envelope {
            command: COMMAND_REGISTER_SESSION,
            session_handle: 0,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data: vec![1, 0, 0, 0],
        };
        let reply = ucmm.request(&register);
        assert_eq!(reply.status, 0);
        assert_ne!(reply.session_handle, 0);

        let unregister = Envelope {
            command: COMMAND_UNREGISTER_SESSION,
            session_handle: reply.session_handle,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data: Vec::new(),
        };
        let reply2 = ucmm.request(&unregister);
        assert_eq!(reply2.status, 0);
    }

    #[test]
    fn send_rr_data_without_session_is_rejected() {
        let ucmm = build_ucmm();
        let envelope = Envelope {
            command: COMMAND_SEND_RR_DATA,
            session_handle: 999,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data: vec![0; 8],
        };
        let reply = ucmm.request(&envelope);
        assert_ne!(reply.status, 0);
    }

    #[test]
    fn send_rr_data_routes_unconnected_send_through_connection_manager() {
        let ucmm = build_ucmm();
        let register = ucmm.request(&Envelope {
            command: COMMAND_REGISTER_SESSION,
            session_handle: 0,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data: vec![1, 0, 0, 0],
        });
        let session = register.session_handle;

        let embedded = Request::new(
            0x0E,
            Path::new(vec![Segment::Class(0x01), Segment::Instance(1), Segment::Attribute(1)]),
            Vec::new(),
        )
        .to_wire();
        let route_path = Path::new(vec![Segment::Port {
            port: 1,
            link: crate::path::PortLink::Number(0),
        }]);
        let mut unconnected_send_data = vec![0x0A, 0x0E];
        unconnected_send_data.extend_from_slice(&(embedded.len() as u16).to_le_bytes());
        unconnected_send_data.extend_from_slice(&embedded);
        if embedded.len() % 2 == 1 {
            unconnected_send_data.push(0);
        }
        unconnected_send_data.extend(route_path.to_wire(true));

        let message_request = Request::new(
            connection_manager::SERVICE_UNCONNECTED_SEND,
            Path::class_instance(crate::objects::CLASS_CONNECTION_MANAGER, 1),
            unconnected_send_data,
        )
        .to_wire();

        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes()); // interface handle
        data.extend_from_slice(&0u16.to_le_bytes()); // timeout
        data.extend_from_slice(&2u16.to_le_bytes()); // item count
        data.extend_from_slice(&CPF_ITEM_NULL_ADDRESS.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&CPF_ITEM_UNCONNECTED_DATA.to_le_bytes());
        data.extend_from_slice(&(message_request.len() as u16).to_le_bytes());
        data.extend_from_slice(&message_request);

        let reply = ucmm.request(&Envelope {
            command: COMMAND_SEND_RR_DATA,
            session_handle: session,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data,
        });
        assert_eq!(reply.status, 0);
        // The Unconnected Data item should carry a reply for VendorID (0x1234, little-endian).
        assert!(reply.data.windows(2).any(|w| w == [0x34, 0x12]));
    }

    #[test]
    fn send_rr_data_accepts_mismatched_route_when_unset() {
        let registry = Registry::new();
        let identity_obj = identity::new(&registry, 1, 0x1234, 0x0C, 1, (1, 2), 0, 42, "Widget");
        let iface = IfaceAddrs {
            ip_address: u32::from_le_bytes([10, 0, 0, 5]),
            network_mask: u32::from_le_bytes([255, 255, 255, 0]),
            gateway_address: 0,
            name_server: 0,
            name_server_2: 0,
            domain_name: String::new(),
        };
        let tcpip_obj = tcpip::new(&registry, 1, iface, "widget-01");
        let ucmm = Ucmm::new(identity_obj, tcpip_obj, None);

        let register = ucmm.request(&Envelope {
            command: COMMAND_REGISTER_SESSION,
            session_handle: 0,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data: vec![1, 0, 0, 0],
        });
        let session = register.session_handle;

        let embedded = Request::new(
            0x0E,
            Path::new(vec![Segment::Class(0x01), Segment::Instance(1), Segment::Attribute(1)]),
            Vec::new(),
        )
        .to_wire();
        // A wire route path that would fail an exact-match check, to prove
        // an unset configured route skips validation entirely.
        let wire_route = Path::new(vec![Segment::Port {
            port: 9,
            link: crate::path::PortLink::Number(99),
        }]);
        let mut unconnected_send_data = vec![0x0A, 0x0E];
        unconnected_send_data.extend_from_slice(&(embedded.len() as u16).to_le_bytes());
        unconnected_send_data.extend_from_slice(&embedded);
        if embedded.len() % 2 == 1 {
            unconnected_send_data.push(0);
        }
        unconnected_send_data.extend(wire_route.to_wire(true));

        let message_request = Request::new(
            connection_manager::SERVICE_UNCONNECTED_SEND,
            Path::class_instance(crate::objects::CLASS_CONNECTION_MANAGER, 1),
            unconnected_send_data,
        )
        .to_wire();

        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&CPF_ITEM_NULL_ADDRESS.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&CPF_ITEM_UNCONNECTED_DATA.to_le_bytes());
        data.extend_from_slice(&(message_request.len() as u16).to_le_bytes());
        data.extend_from_slice(&message_request);

        let reply = ucmm.request(&Envelope {
            command: COMMAND_SEND_RR_DATA,
            session_handle: session,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data,
        });
        assert_eq!(reply.status, 0);
        assert!(reply.data.windows(2).any(|w| w == [0x34, 0x12]));
    }

    #[test]
    fn list_identity_reports_configured_vendor() {
        let ucmm = build_ucmm();
        let envelope = Envelope {
            command: COMMAND_LIST_IDENTITY,
            session_handle: 0,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data: Vec::new(),
        };
        let reply = ucmm.request(&envelope);
        assert_eq!(reply.status, 0);
        assert!(!reply.data.is_empty());
    }
}
