//! # CIP Primitive Wire Codecs
//!
//! Little-endian encode/decode for the CIP elementary data types
//! (spec.md §6 "Wire format"). Each primitive is a zero-sized marker type
//! implementing [`Primitive`], giving `Attribute` a `struct_calcsize` /
//! `struct_format`-equivalent pair (`SIZE` and `decode`/`encode`) per
//! element, exactly as device.py's `type_cls` parsers do.

use crate::error::{CipError, Result};

/// One CIP elementary data type: fixed-width scalars plus the two
/// variable-width string forms and the two EPATH forms.
pub trait Primitive: Sized + Clone {
    /// Size in bytes of one encoded element, or `None` for variable-width
    /// types (STRING, SSTRING, EPATH, EPATH_padded).
    const SIZE: Option<usize>;

    fn encode(&self, out: &mut Vec<u8>);
    fn decode(buf: &[u8]) -> Result<(Self, usize)>;
}

fn need(buf: &[u8], n: usize) -> Result<()> {
    if buf.len() < n {
        Err(CipError::Truncated {
            needed: n,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

macro_rules! fixed_width_primitive {
    ($name:ident, $ty:ty, $size:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
        pub struct $name(pub $ty);

        impl Primitive for $name {
            const SIZE: Option<usize> = Some($size);

            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.0.to_le_bytes());
            }

            fn decode(buf: &[u8]) -> Result<(Self, usize)> {
                need(buf, $size)?;
                let mut raw = [0u8; $size];
                raw.copy_from_slice(&buf[..$size]);
                Ok(($name(<$ty>::from_le_bytes(raw)), $size))
            }
        }

        impl From<$ty> for $name {
            fn from(v: $ty) -> Self {
                $name(v)
            }
        }
        impl From<$name> for $ty {
            fn from(v: $name) -> Self {
                v.0
            }
        }
    };
}

fixed_width_primitive!(Bool, u8, 1);
fixed_width_primitive!(Sint, i8, 1);
fixed_width_primitive!(Usint, u8, 1);
fixed_width_primitive!(Int, i16, 2);
fixed_width_primitive!(Uint, u16, 2);
fixed_width_primitive!(Dint, i32, 4);
fixed_width_primitive!(Udint, u32, 4);
fixed_width_primitive!(Real, f32, 4);
fixed_width_primitive!(Word, u16, 2);
fixed_width_primitive!(Dword, u32, 4);

/// STRING: UINT length + bytes + 1 pad byte if length is odd.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CipString(pub String);

impl Primitive for CipString {
    const SIZE: Option<usize> = None;

    fn encode(&self, out: &mut Vec<u8>) {
        let bytes = self.0.as_bytes();
        out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(bytes);
        if bytes.len() % 2 == 1 {
            out.push(0);
        }
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        need(buf, 2)?;
        let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let pad = len % 2;
        need(buf, 2 + len + pad)?;
        let s = String::from_utf8_lossy(&buf[2..2 + len]).into_owned();
        Ok((CipString(s), 2 + len + pad))
    }
}

/// SSTRING: USINT length + bytes (no padding).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShortString(pub String);

impl Primitive for ShortString {
    const SIZE: Option<usize> = None;

    fn encode(&self, out: &mut Vec<u8>) {
        let bytes = self.0.as_bytes();
        out.push(bytes.len() as u8);
        out.extend_from_slice(bytes);
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        need(buf, 1)?;
        let len = buf[0] as usize;
        need(buf, 1 + len)?;
        let s = String::from_utf8_lossy(&buf[1..1 + len]).into_owned();
        Ok((ShortString(s), 1 + len))
    }
}

/// IFACEADDRS: a DWORD IP address plus a variable-length SSTRING host name,
/// as carried by the TCP/IP Interface Object's Interface Configuration
/// attribute. Round-tripping this one through its own parser (as the UCMM
/// `list_identity` handler does) is flagged in spec.md §9 as suspicious;
/// see `objects::identity` tests for the characterization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IfaceAddrs {
    pub ip_address: u32,
    pub network_mask: u32,
    pub gateway_address: u32,
    pub name_server: u32,
    pub name_server_2: u32,
    pub domain_name: String,
}

impl Primitive for IfaceAddrs {
    const SIZE: Option<usize> = None;

    fn encode(&self, out: &mut Vec<u8>) {
        for field in [
            self.ip_address,
            self.network_mask,
            self.gateway_address,
            self.name_server,
            self.name_server_2,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        ShortString(self.domain_name.clone()).encode(out);
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        need(buf, 20)?;
        let mut words = [0u32; 5];
        for (i, word) in words.iter_mut().enumerate() {
            let off = i * 4;
            *word = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        let (domain_name, used) = ShortString::decode(&buf[20..])?;
        Ok((
            IfaceAddrs {
                ip_address: words[0],
                network_mask: words[1],
                gateway_address: words[2],
                name_server: words[3],
                name_server_2: words[4],
                domain_name: domain_name.0,
            },
            20 + used,
        ))
    }
}

/// Produce a byte slice verbatim (used for service-code pass-through
/// payloads whose typed data we don't interpret).
pub fn produce_raw(data: &[u8]) -> Vec<u8> {
    data.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_round_trips() {
        let v = Uint(0x1234);
        let mut out = Vec::new();
        v.encode(&mut out);
        assert_eq!(out, vec![0x34, 0x12]);
        let (back, used) = Uint::decode(&out).unwrap();
        assert_eq!(back, v);
        assert_eq!(used, 2);
    }

    #[test]
    fn string_pads_odd_length() {
        let v = CipString("abc".to_string());
        let mut out = Vec::new();
        v.encode(&mut out);
        // 2 (len) + 3 (bytes) + 1 (pad) = 6
        assert_eq!(out.len(), 6);
        let (back, used) = CipString::decode(&out).unwrap();
        assert_eq!(back.0, "abc");
        assert_eq!(used, 6);
    }

    #[test]
    fn sstring_no_padding() {
        let v = ShortString("abc".to_string());
        let mut out = Vec::new();
        v.encode(&mut out);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        let err = Uint::decode(&[0x01]).unwrap_err();
        assert!(matches!(err, CipError::Truncated { .. }));
    }
}
