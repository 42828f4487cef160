//! # TCP/IP Interface Object (class 0xF5)
//!
//! Carries the device's network identity (spec.md §4.5): interface
//! status, configuration capability/control flags, and the
//! [`IfaceAddrs`] interface configuration the UCMM's `list_identity` and
//! `list_interfaces` handlers read to fill in the socket address fields
//! of their replies.

use crate::attribute::{Attribute, Elem};
use crate::codec::{IfaceAddrs, Primitive};
use crate::config::Config;
use crate::error::Result;
use crate::object::Object;
use crate::objects::CLASS_TCPIP_INTERFACE;
use crate::path::Path;
use crate::registry::Registry;

pub const ATTR_STATUS: u16 = 1;
pub const ATTR_CONFIGURATION_CAPABILITY: u16 = 2;
pub const ATTR_CONFIGURATION_CONTROL: u16 = 3;
pub const ATTR_PHYSICAL_LINK_OBJECT: u16 = 4;
pub const ATTR_INTERFACE_CONFIGURATION: u16 = 5;
pub const ATTR_HOST_NAME: u16 = 6;

pub fn new(
    registry: &Registry,
    instance_id: u16,
    interface_config: IfaceAddrs,
    host_name: impl Into<String>,
) -> Object {
    Object::new(registry, CLASS_TCPIP_INTERFACE, instance_id, "TCP/IP Interface")
        .with_attribute(ATTR_STATUS, Attribute::scalar("Status", Elem::Udint(1)))
        .with_attribute(
            ATTR_CONFIGURATION_CAPABILITY,
            Attribute::scalar("ConfigurationCapability", Elem::Udint(0)),
        )
        .with_attribute(
            ATTR_CONFIGURATION_CONTROL,
            Attribute::scalar("ConfigurationControl", Elem::Udint(0)),
        )
        .with_attribute(
            ATTR_PHYSICAL_LINK_OBJECT,
            Attribute::scalar(
                "PhysicalLinkObject",
                Elem::Path(Path::class_instance(0xF6, instance_id)),
            ),
        )
        .with_attribute(
            ATTR_INTERFACE_CONFIGURATION,
            Attribute::scalar("InterfaceConfiguration", Elem::IfaceAddrs(Box::new(interface_config))),
        )
        .with_attribute(
            ATTR_HOST_NAME,
            Attribute::scalar("HostName", Elem::Str(host_name.into())),
        )
}

pub fn from_config(registry: &Registry, instance_id: u16, cfg: &Config) -> Result<Object> {
    let iface = IfaceAddrs {
        ip_address: parse_ipv4(&cfg.config_str("tcpip", "ip_address")?)?,
        network_mask: parse_ipv4(&cfg.config_str_or("tcpip", "network_mask", "255.255.255.0"))?,
        gateway_address: parse_ipv4(&cfg.config_str_or("tcpip", "gateway_address", "0.0.0.0"))?,
        name_server: 0,
        name_server_2: 0,
        domain_name: cfg.config_str_or("tcpip", "domain_name", ""),
    };
    Ok(new(
        registry,
        instance_id,
        iface,
        cfg.config_str_or("tcpip", "host_name", ""),
    ))
}

fn parse_ipv4(s: &str) -> Result<u32> {
    let octets: Vec<&str> = s.split('.').collect();
    if octets.len() != 4 {
        return Err(crate::error::CipError::InvalidConfig {
            section: "tcpip".to_string(),
            key: "ip_address".to_string(),
            value: s.to_string(),
        });
    }
    let mut addr = [0u8; 4];
    for (slot, part) in addr.iter_mut().zip(octets) {
        *slot = part.parse::<u8>().map_err(|_| crate::error::CipError::InvalidConfig {
            section: "tcpip".to_string(),
            key: "ip_address".to_string(),
            value: s.to_string(),
        })?;
    }
    Ok(u32::from_le_bytes(addr))
}

/// Read back the Interface Configuration attribute by producing its wire
/// bytes and decoding them through [`IfaceAddrs::decode`] — the same
/// round trip the UCMM's `list_identity` handler performs (see
/// `crate::ucmm`), characterized as suspicious in spec.md §9 because it
/// re-parses data the object already held typed, purely to satisfy a
/// uniform "attributes only leave an object as bytes" calling
/// convention.
pub fn get_interface_config(obj: &Object, registry: &Registry) -> Result<IfaceAddrs> {
    let bytes = obj.get_attribute_single(registry, ATTR_INTERFACE_CONFIGURATION)?;
    let (decoded, _) = IfaceAddrs::decode(&bytes)?;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_configuration_round_trips_through_its_own_parser() {
        let registry = Registry::new();
        let iface = IfaceAddrs {
            ip_address: u32::from_le_bytes([10, 0, 0, 1]),
            network_mask: u32::from_le_bytes([255, 255, 255, 0]),
            gateway_address: u32::from_le_bytes([10, 0, 0, 254]),
            name_server: 0,
            name_server_2: 0,
            domain_name: "example.test".to_string(),
        };
        let obj = new(&registry, 1, iface.clone(), "plc-01");
        let back = get_interface_config(&obj, &registry).unwrap();
        assert_eq!(back, iface);
    }
}
