//! # Attribute
//!
//! A named, typed cell (spec.md §4.3): a scalar or a vector of one CIP
//! primitive type, with a codec bound to that type, an optional
//! configured error code, and a visibility mask that can hide the
//! attribute from Get Attribute(s) All/Single.

use crate::codec::{IfaceAddrs, Primitive};
use crate::error::{CipError, Result};
use crate::path::Path;
use crate::registry::Registry;

/// Bitfield hiding an attribute from Get Attribute Single (`GA_SNG`) and/or
/// Get Attributes All (`GA_ALL`).
pub const MASK_GA_SNG: u8 = 1 << 0;
pub const MASK_GA_ALL: u8 = 1 << 1;

/// One element of an Attribute's backing store. The variant in use is
/// fixed for the lifetime of the Attribute (it's bound at construction to
/// the CIP primitive the Attribute was declared with).
#[derive(Debug, Clone, PartialEq)]
pub enum Elem {
    Bool(bool),
    Sint(i8),
    Usint(u8),
    Int(i16),
    Uint(u16),
    Dint(i32),
    Udint(u32),
    Real(f32),
    Word(u16),
    Dword(u32),
    Str(String),
    Sstr(String),
    Path(Path),
    IfaceAddrs(Box<IfaceAddrs>),
}

impl Elem {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Elem::Bool(v) => out.push(if *v { 0xFF } else { 0x00 }),
            Elem::Sint(v) => out.push(*v as u8),
            Elem::Usint(v) => out.push(*v),
            Elem::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Elem::Uint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Elem::Dint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Elem::Udint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Elem::Real(v) => out.extend_from_slice(&v.to_le_bytes()),
            Elem::Word(v) => out.extend_from_slice(&v.to_le_bytes()),
            Elem::Dword(v) => out.extend_from_slice(&v.to_le_bytes()),
            Elem::Str(s) => {
                out.extend_from_slice(&(s.len() as u16).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
                if s.len() % 2 == 1 {
                    out.push(0);
                }
            }
            Elem::Sstr(s) => {
                out.push(s.len() as u8);
                out.extend_from_slice(s.as_bytes());
            }
            Elem::Path(p) => out.extend_from_slice(&p.to_wire(false)),
            Elem::IfaceAddrs(a) => a.encode(out),
        }
    }

    /// Byte width of this element when fixed-width, or `None` for the
    /// variable-width kinds (matches `struct_calcsize` for the fixed
    /// types; variable types must use `produce()` over the whole range).
    fn fixed_size(&self) -> Option<usize> {
        match self {
            Elem::Bool(_) | Elem::Sint(_) | Elem::Usint(_) => Some(1),
            Elem::Int(_) | Elem::Uint(_) | Elem::Word(_) => Some(2),
            Elem::Dint(_) | Elem::Udint(_) | Elem::Real(_) | Elem::Dword(_) => Some(4),
            Elem::Str(_) | Elem::Sstr(_) | Elem::Path(_) | Elem::IfaceAddrs(_) => None,
        }
    }
}

/// The two specialised read-only attribute kinds from spec.md §4.3 read
/// a live counter off the owning class rather than a stored value; all
/// other attributes store their own data directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Stored,
    MaxInstance { class_id: u16 },
    NumInstances { class_id: u16 },
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    values: Vec<Elem>,
    pub scalar: bool,
    pub error: u8,
    pub mask: u8,
    kind: Kind,
}

impl Attribute {
    /// A simple scalar or vector attribute with a fixed default value.
    pub fn new(name: impl Into<String>, default: Vec<Elem>, scalar: bool) -> Self {
        Attribute {
            name: name.into(),
            values: default,
            scalar,
            error: 0,
            mask: 0,
            kind: Kind::Stored,
        }
    }

    pub fn scalar(name: impl Into<String>, value: Elem) -> Self {
        Attribute::new(name, vec![value], true)
    }

    pub fn vector(name: impl Into<String>, values: Vec<Elem>) -> Self {
        Attribute::new(name, values, false)
    }

    pub fn with_error(mut self, error: u8) -> Self {
        self.error = error;
        self
    }

    pub fn with_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    /// A read-only attribute reflecting `class_id`'s current `max_instance`
    /// counter (spec.md §4.3's `MaxInstance`).
    pub fn max_instance(name: impl Into<String>, class_id: u16) -> Self {
        Attribute {
            name: name.into(),
            values: vec![Elem::Uint(0)],
            scalar: true,
            error: 0,
            mask: 0,
            kind: Kind::MaxInstance { class_id },
        }
    }

    /// A read-only attribute counting live instances of `class_id` in
    /// `1..=max_instance` (spec.md §4.3's `NumInstances`).
    pub fn num_instances(name: impl Into<String>, class_id: u16) -> Self {
        Attribute {
            name: name.into(),
            values: vec![Elem::Uint(0)],
            scalar: true,
            error: 0,
            mask: 0,
            kind: Kind::NumInstances { class_id },
        }
    }

    pub fn len(&self) -> usize {
        if self.scalar {
            1
        } else {
            self.values.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(&self, registry: &Registry) -> Elem {
        match self.kind {
            Kind::Stored => self.values[0].clone(),
            Kind::MaxInstance { class_id } => Elem::Uint(registry.max_instance(class_id)),
            Kind::NumInstances { class_id } => Elem::Uint(registry.num_instances(class_id)),
        }
    }

    /// Validate a `start..stop` range against this attribute's length,
    /// per spec.md §4.3: stride must be 1, the range non-empty, and
    /// within bounds. `stop = None` means "to the end".
    fn validate_range(&self, start: usize, stop: Option<usize>) -> Result<(usize, usize)> {
        let len = self.len();
        let stop = stop.unwrap_or(len);
        if start >= stop || stop > len {
            return Err(CipError::IndexOutOfRange {
                key: format!("{start}..{stop}"),
                len,
            });
        }
        Ok((start, stop))
    }

    fn validate_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(CipError::IndexOutOfRange {
                key: index.to_string(),
                len: self.len(),
            });
        }
        Ok(())
    }

    /// Get a single indexed element (always returns a scalar).
    pub fn get_one(&self, registry: &Registry, index: usize) -> Result<Elem> {
        self.validate_index(index)?;
        if self.scalar {
            Ok(self.live_value(registry))
        } else {
            Ok(self.values[index].clone())
        }
    }

    /// Get a `start..stop` range (always returns a `Vec`, even for a
    /// length-1 scalar).
    pub fn get_range(&self, registry: &Registry, start: usize, stop: Option<usize>) -> Result<Vec<Elem>> {
        let (start, stop) = self.validate_range(start, stop)?;
        if self.scalar {
            Ok(vec![self.live_value(registry); stop - start])
        } else {
            Ok(self.values[start..stop].to_vec())
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.kind {
            Kind::Stored => Ok(()),
            Kind::MaxInstance { .. } | Kind::NumInstances { .. } => {
                Err(CipError::Other("attribute is read-only".to_string()))
            }
        }
    }

    /// Set a single indexed element (always supplied a scalar).
    pub fn set_one(&mut self, index: usize, value: Elem) -> Result<()> {
        self.ensure_writable()?;
        self.validate_index(index)?;
        if self.scalar {
            self.values[0] = value;
        } else {
            self.values[index] = value;
        }
        Ok(())
    }

    /// Set a `start..stop` range; a scalar assigned a range takes the
    /// first supplied value (length is not enforced — the caller must
    /// match it to avoid resizing the underlying store).
    pub fn set_range(&mut self, start: usize, stop: Option<usize>, values: Vec<Elem>) -> Result<()> {
        self.ensure_writable()?;
        let (start, stop) = self.validate_range(start, stop)?;
        if self.scalar {
            self.values[0] = values
                .into_iter()
                .next()
                .ok_or_else(|| CipError::Other("empty assignment to scalar".to_string()))?;
        } else {
            for (slot, value) in self.values[start..stop].iter_mut().zip(values) {
                *slot = value;
            }
        }
        Ok(())
    }

    /// Overwrite the whole vector (used by Set Attribute Single, which
    /// must supply exactly `len() * element_size` bytes; see
    /// `crate::object`).
    pub fn set_all(&mut self, values: Vec<Elem>) -> Result<()> {
        self.ensure_writable()?;
        if self.scalar {
            self.values[0] = values
                .into_iter()
                .next()
                .ok_or_else(|| CipError::Other("empty assignment to scalar".to_string()))?;
        } else {
            self.values = values;
        }
        Ok(())
    }

    /// Byte width of one element, when fixed (this Attribute's
    /// `struct_calcsize`). `None` for variable-width types.
    pub fn element_size(&self) -> Option<usize> {
        self.values.first().and_then(Elem::fixed_size)
    }

    /// Produce the binary rendering of `self[start..stop]`, concatenating
    /// each element's codec output (spec.md §4.3 `produce`).
    pub fn produce(&self, registry: &Registry, start: usize, stop: Option<usize>) -> Result<Vec<u8>> {
        let elems = self.get_range(registry, start, stop)?;
        let mut out = Vec::new();
        for e in elems {
            e.encode(&mut out);
        }
        Ok(out)
    }

    /// Decode `buf` into this attribute's element type, returning one
    /// `Elem` per `element_size()` bytes. Used by Set Attribute Single.
    pub fn decode_elements(&self, buf: &[u8]) -> Result<Vec<Elem>> {
        let size = self.element_size().ok_or_else(|| {
            CipError::Other("attribute type has no fixed element size".to_string())
        })?;
        if buf.len() % size != 0 {
            return Err(CipError::SetAttributeSizeMismatch {
                got: buf.len(),
                expected: size * self.len(),
            });
        }
        let template = self.values.first().cloned();
        buf.chunks(size)
            .map(|chunk| decode_like(template.as_ref().unwrap(), chunk))
            .collect()
    }
}

fn decode_like(template: &Elem, buf: &[u8]) -> Result<Elem> {
    Ok(match template {
        Elem::Bool(_) => Elem::Bool(buf[0] != 0),
        Elem::Sint(_) => Elem::Sint(buf[0] as i8),
        Elem::Usint(_) => Elem::Usint(buf[0]),
        Elem::Int(_) => Elem::Int(i16::from_le_bytes([buf[0], buf[1]])),
        Elem::Uint(_) => Elem::Uint(u16::from_le_bytes([buf[0], buf[1]])),
        Elem::Dint(_) => Elem::Dint(i32::from_le_bytes(buf[0..4].try_into().unwrap())),
        Elem::Udint(_) => Elem::Udint(u32::from_le_bytes(buf[0..4].try_into().unwrap())),
        Elem::Real(_) => Elem::Real(f32::from_le_bytes(buf[0..4].try_into().unwrap())),
        Elem::Word(_) => Elem::Word(u16::from_le_bytes([buf[0], buf[1]])),
        Elem::Dword(_) => Elem::Dword(u32::from_le_bytes(buf[0..4].try_into().unwrap())),
        other => return Err(CipError::Other(format!("{other:?} has no fixed-size decode"))),
    })
}

impl Elem {
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Elem::Usint(v) => Some(v as u32),
            Elem::Uint(v) => Some(v as u32),
            Elem::Udint(v) => Some(v),
            Elem::Word(v) => Some(v as u32),
            Elem::Dword(v) => Some(v),
            Elem::Sint(v) => Some(v as u32),
            Elem::Int(v) => Some(v as u32),
            Elem::Dint(v) => Some(v as u32),
            _ => None,
        }
    }
}
