//! # Object
//!
//! The base CIP object model (spec.md §4.4): a `(class_id, instance_id)`
//! identity, a sparse map of [`Attribute`]s, and the three generic
//! services every CIP object answers to — Get Attributes All, Get
//! Attribute Single, Set Attribute Single. Concrete classes
//! (`crate::objects::identity`, `::tcpip`, `::message_router`,
//! `::connection_manager`) build on this by populating the attribute map
//! and, where the class needs more than the generic services, matching on
//! the service code themselves before falling back to `Object::request`.
//!
//! Mirrors device.py's `Object` base class, with one change: rather than
//! each instance carrying a `register_service_parser`-populated dict of
//! bound methods, Rust's dispatch happens as a plain `match` in each
//! concrete class's `request` — closer to the wire, and it sidesteps the
//! "dynamic dict-everywhere IR" redesign flag from spec.md §9.

use crate::attribute::{Attribute, Elem, MASK_GA_ALL, MASK_GA_SNG};
use crate::error::{CipError, Result};
use crate::registry::Registry;
use std::collections::BTreeMap;
use tracing::warn;

pub const GET_ATTRIBUTES_ALL: u8 = 0x01;
pub const GET_ATTRIBUTE_SINGLE: u8 = 0x0E;
pub const SET_ATTRIBUTE_SINGLE: u8 = 0x10;

/// The four class-level attributes every meta-instance (instance 0)
/// carries (spec.md §9 Open Question: meta-instance creation does not
/// recurse into a concrete class's own attribute setup — only these
/// four are ever present on instance 0).
const META_REVISION: u16 = 1;
const META_MAX_INSTANCE: u16 = 2;
const META_NUM_INSTANCES: u16 = 3;
const META_OPTIONAL_ATTRIBUTE_LIST: u16 = 4;

#[derive(Debug)]
pub struct Object {
    pub class_id: u16,
    pub instance_id: u16,
    pub name: String,
    pub attributes: BTreeMap<u16, Attribute>,
}

impl Object {
    /// Construct a new instance, lazily registering the class's
    /// meta-instance (instance 0) the first time any instance of
    /// `class_id` is created (spec.md §4.4).
    pub fn new(registry: &Registry, class_id: u16, instance_id: u16, name: &str) -> Object {
        if instance_id != 0 && registry.lookup(class_id, 0).is_none() {
            registry.register(Object::new_meta(class_id, name));
        }
        Object {
            class_id,
            instance_id,
            name: name.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    fn new_meta(class_id: u16, name: &str) -> Object {
        let mut attributes = BTreeMap::new();
        attributes.insert(META_REVISION, Attribute::scalar("Revision", Elem::Uint(1)));
        attributes.insert(
            META_MAX_INSTANCE,
            Attribute::max_instance("MaxInstance", class_id),
        );
        attributes.insert(
            META_NUM_INSTANCES,
            Attribute::num_instances("NumInstances", class_id),
        );
        attributes.insert(
            META_OPTIONAL_ATTRIBUTE_LIST,
            Attribute::vector("OptionalAttributeList", vec![Elem::Uint(0)]),
        );
        Object {
            class_id,
            instance_id: 0,
            name: format!("{name} (meta)"),
            attributes,
        }
    }

    pub fn with_attribute(mut self, id: u16, attribute: Attribute) -> Self {
        self.attributes.insert(id, attribute);
        self
    }

    fn attribute(&self, id: u16) -> Result<&Attribute> {
        self.attributes.get(&id).ok_or(CipError::NoSuchAttribute(id))
    }

    fn attribute_mut(&mut self, id: u16) -> Result<&mut Attribute> {
        self.attributes
            .get_mut(&id)
            .ok_or(CipError::NoSuchAttribute(id))
    }

    /// Get Attributes All: concatenate every attribute not masked from
    /// `GA_ALL`, in ascending attribute-id order. An instance with no
    /// eligible attributes reports `0x08` rather than an empty success
    /// reply (spec.md §9 Open Question).
    pub fn get_attributes_all(&self, registry: &Registry) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut any = false;
        for (id, attr) in &self.attributes {
            if attr.mask & MASK_GA_ALL != 0 {
                continue;
            }
            if attr.error != 0 {
                return Err(CipError::AttributeConfiguredError {
                    attribute: *id,
                    status: attr.error,
                });
            }
            out.extend(attr.produce(registry, 0, None)?);
            any = true;
        }
        if !any {
            return Err(CipError::NoAttributesAvailable);
        }
        Ok(out)
    }

    /// Get Attribute Single.
    pub fn get_attribute_single(&self, registry: &Registry, attribute: u16) -> Result<Vec<u8>> {
        let attr = self.attribute(attribute)?;
        if attr.mask & MASK_GA_SNG != 0 {
            return Err(CipError::AttributeMasked(attribute));
        }
        if attr.error != 0 {
            return Err(CipError::AttributeConfiguredError {
                attribute,
                status: attr.error,
            });
        }
        attr.produce(registry, 0, None)
    }

    /// Set Attribute Single: the payload must be exactly `len() *
    /// element_size()` bytes (spec.md §4.4's size-mismatch rule).
    pub fn set_attribute_single(&mut self, attribute: u16, data: &[u8]) -> Result<()> {
        let attr = self.attribute_mut(attribute)?;
        let values = attr.decode_elements(data)?;
        attr.set_all(values)
    }

    /// Dispatch one of the three generic services. Concrete classes call
    /// this as their fallback after matching any service codes of their
    /// own (spec.md §4.4).
    pub fn request(
        &mut self,
        registry: &Registry,
        service: u8,
        attribute: Option<u16>,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        match service {
            GET_ATTRIBUTES_ALL => self.get_attributes_all(registry),
            GET_ATTRIBUTE_SINGLE => {
                let attribute = attribute.ok_or(CipError::RequiresAttribute("Get Attribute Single"))?;
                self.get_attribute_single(registry, attribute)
            }
            SET_ATTRIBUTE_SINGLE => {
                let attribute = attribute.ok_or(CipError::RequiresAttribute("Set Attribute Single"))?;
                self.set_attribute_single(attribute, data)?;
                Ok(Vec::new())
            }
            other => {
                warn!(
                    "class 0x{:02x} instance {} has no handler for service 0x{other:02x}",
                    self.class_id, self.instance_id
                );
                Err(CipError::UnsupportedService(other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;

    #[test]
    fn meta_instance_created_lazily() {
        let registry = Registry::new();
        let obj = Object::new(&registry, 6, 1, "Identity");
        registry.register(obj);
        let meta = registry.lookup(6, 0).expect("meta-instance registered");
        let meta = meta.lock();
        assert_eq!(meta.attributes.len(), 4);
        assert_eq!(meta.instance_id, 0);
    }

    #[test]
    fn get_attributes_all_skips_masked() {
        let registry = Registry::new();
        let mut obj = Object::new(&registry, 100, 1, "Widget");
        obj = obj
            .with_attribute(1, Attribute::scalar("Visible", Elem::Uint(7)))
            .with_attribute(
                2,
                Attribute::scalar("Hidden", Elem::Uint(9)).with_mask(crate::attribute::MASK_GA_ALL),
            );
        let out = obj.get_attributes_all(&registry).unwrap();
        assert_eq!(out, vec![0x07, 0x00]);
    }

    #[test]
    fn get_attributes_all_with_nothing_eligible_is_an_error() {
        let registry = Registry::new();
        let obj = Object::new(&registry, 101, 1, "Empty");
        let err = obj.get_attributes_all(&registry).unwrap_err();
        assert!(matches!(err, CipError::NoAttributesAvailable));
    }

    #[test]
    fn set_attribute_single_round_trips() {
        let registry = Registry::new();
        let mut obj =
            Object::new(&registry, 102, 1, "Knob").with_attribute(1, Attribute::scalar("Pos", Elem::Uint(0)));
        obj.set_attribute_single(1, &[0x05, 0x00]).unwrap();
        let out = obj.get_attribute_single(&registry, 1).unwrap();
        assert_eq!(out, vec![0x05, 0x00]);
    }
}
