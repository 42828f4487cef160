//! # Identity Object (class 0x01)
//!
//! Static vendor/device identification attributes (spec.md §4.5). Every
//! field is read straight out of [`Config`] at construction time and
//! never changes afterward — there is no service on this class beyond
//! the three generic ones `Object::request` already answers.

use crate::attribute::{Attribute, Elem};
use crate::config::Config;
use crate::error::Result;
use crate::object::Object;
use crate::objects::CLASS_IDENTITY;
use crate::registry::Registry;

pub const ATTR_VENDOR_ID: u16 = 1;
pub const ATTR_DEVICE_TYPE: u16 = 2;
pub const ATTR_PRODUCT_CODE: u16 = 3;
pub const ATTR_REVISION: u16 = 4;
pub const ATTR_STATUS: u16 = 5;
pub const ATTR_SERIAL_NUMBER: u16 = 6;
pub const ATTR_PRODUCT_NAME: u16 = 7;
pub const ATTR_STATE: u16 = 8;
pub const ATTR_CONFIGURATION_CONSISTENCY_VALUE: u16 = 9;
pub const ATTR_HEARTBEAT_INTERVAL: u16 = 10;

#[allow(clippy::too_many_arguments)]
pub fn new(
    registry: &Registry,
    instance_id: u16,
    vendor_id: u16,
    device_type: u16,
    product_code: u16,
    revision: (u8, u8),
    status: u16,
    serial_number: u32,
    product_name: impl Into<String>,
) -> Object {
    Object::new(registry, CLASS_IDENTITY, instance_id, "Identity")
        .with_attribute(ATTR_VENDOR_ID, Attribute::scalar("VendorID", Elem::Uint(vendor_id)))
        .with_attribute(
            ATTR_DEVICE_TYPE,
            Attribute::scalar("DeviceType", Elem::Uint(device_type)),
        )
        .with_attribute(
            ATTR_PRODUCT_CODE,
            Attribute::scalar("ProductCode", Elem::Uint(product_code)),
        )
        .with_attribute(
            ATTR_REVISION,
            Attribute::vector(
                "Revision",
                vec![Elem::Usint(revision.0), Elem::Usint(revision.1)],
            ),
        )
        .with_attribute(ATTR_STATUS, Attribute::scalar("Status", Elem::Word(status)))
        .with_attribute(
            ATTR_SERIAL_NUMBER,
            Attribute::scalar("SerialNumber", Elem::Udint(serial_number)),
        )
        .with_attribute(
            ATTR_PRODUCT_NAME,
            Attribute::scalar("ProductName", Elem::Sstr(product_name.into())),
        )
        .with_attribute(ATTR_STATE, Attribute::scalar("State", Elem::Usint(0)))
        .with_attribute(
            ATTR_CONFIGURATION_CONSISTENCY_VALUE,
            Attribute::scalar("ConfigurationConsistencyValue", Elem::Uint(0)),
        )
        .with_attribute(
            ATTR_HEARTBEAT_INTERVAL,
            Attribute::scalar("HeartbeatInterval", Elem::Usint(0)),
        )
}

/// Build an Identity instance from a `[identity]` config section, per
/// spec.md §4.3's config-driven attribute defaulting (device.py
/// `Object.config_str`/`config_int` family).
pub fn from_config(registry: &Registry, instance_id: u16, cfg: &Config) -> Result<Object> {
    let major = cfg.config_int_or("identity", "revision_major", 1) as u8;
    let minor = cfg.config_int_or("identity", "revision_minor", 1) as u8;
    Ok(new(
        registry,
        instance_id,
        cfg.config_int("identity", "vendor_id")? as u16,
        cfg.config_int("identity", "device_type")? as u16,
        cfg.config_int("identity", "product_code")? as u16,
        (major, minor),
        cfg.config_int_or("identity", "status", 0) as u16,
        cfg.config_int("identity", "serial_number")? as u32,
        cfg.config_str("identity", "product_name")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_static_attributes() {
        let registry = Registry::new();
        let obj = new(&registry, 1, 0x1234, 0x0C, 1, (1, 2), 0, 0xDEADBEEF, "Widget");
        let out = obj.get_attribute_single(&registry, ATTR_VENDOR_ID).unwrap();
        assert_eq!(out, vec![0x34, 0x12]);
        let revision = obj.get_attribute_single(&registry, ATTR_REVISION).unwrap();
        assert_eq!(revision, vec![1, 2]);
    }

    #[test]
    fn from_config_reads_identity_section() {
        let registry = Registry::new();
        let cfg = Config::parse(
            "[identity]\nvendor_id = 1\ndevice_type = 12\nproduct_code = 99\nserial_number = 1000\nproduct_name = Widget\n",
        )
        .unwrap();
        let obj = from_config(&registry, 1, &cfg).unwrap();
        assert_eq!(
            obj.get_attribute_single(&registry, ATTR_PRODUCT_NAME).unwrap(),
            vec![6, b'W', b'i', b'd', b'g', b'e', b't']
        );
    }
}
