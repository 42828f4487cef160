//! # Path & Tag Module
//!
//! Textual tag-path parsing (`"Tag.Sub[3]"`, `"@6/1/2"`) into an ordered
//! list of EPATH segments (spec.md §4.1), plus the binary EPATH codec used
//! to embed a `Path` inside a wire-format request or reply (spec.md §6).
//!
//! These are two independent concerns sharing one data model
//! (`Segment`/`Path`): the textual grammar never touches the wire, and the
//! wire codec never touches text.

use crate::error::{CipError, Result};
use serde_json::Value as Json;

/// One EPATH segment. `Port` carries either a numeric link address or a
/// string (e.g. an IP address) — spec.md §3 allows either.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Class(u16),
    Instance(u16),
    Attribute(u16),
    Element(u32),
    Symbolic(String),
    Connection(u16),
    Port { port: u8, link: PortLink },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortLink {
    Number(u8),
    Address(String),
}

/// An ordered sequence of path segments, as produced by [`parse_path`] or
/// decoded off the wire by [`Path::from_wire`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    pub segments: Vec<Segment>,
}

impl Path {
    pub fn new(segments: Vec<Segment>) -> Self {
        Path { segments }
    }

    /// Convenience constructor for the common `{class, instance}` path the
    /// Message Router's Multiple Service Packet default targets (spec.md §4.6).
    pub fn class_instance(class: u16, instance: u16) -> Self {
        Path::new(vec![Segment::Class(class), Segment::Instance(instance)])
    }
}

// ---------------------------------------------------------------------
// Textual parsing (spec.md §4.1)
// ---------------------------------------------------------------------

/// Parse a base-10 integer, falling back to base-0 auto-detection
/// (`0x`/`0o`/`0b` prefixes) only if the direct base-10 parse fails.
/// This is the calibration point vs. a naive integer parser: leading
/// zeros never imply octal, since `"012".parse::<i64>()` succeeds as
/// decimal 12 before the fallback is ever tried.
pub fn parse_int(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    let parsed = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(oct) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8)
    } else if let Some(bin) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)
    } else {
        rest.parse::<i64>()
    }
    .map_err(|e| CipError::InvalidPathComponent(s.to_string(), e.to_string()))?;
    Ok(if neg { -parsed } else { parsed })
}

/// Parse a `"."`-separated tag path into a flat segment list, merging a
/// trailing `[i]`/`[i-j]` element index into (or appending it onto) the
/// last segment. Mirrors `parse_path` / `parse_path_elements` in the
/// original source (device.py ~L268-313).
pub fn parse_path(path: &str, default_element: Option<u32>) -> Result<Vec<Segment>> {
    Ok(parse_path_elements(path, default_element, None)?.0)
}

/// Returns `(segments, element, count)`. Only the final `.`-separated
/// component may specify a count greater than one.
pub fn parse_path_elements(
    path: &str,
    mut elm: Option<u32>,
    mut cnt: Option<u32>,
) -> Result<(Vec<Segment>, Option<u32>, Option<u32>)> {
    let mut segments = Vec::new();
    let parts: Vec<&str> = path.split('.').collect();
    for (i, component) in parts.iter().enumerate() {
        let is_last = i + 1 == parts.len();
        let (seg, e, c) = parse_path_component(component, elm, cnt)?;
        if !is_last && !matches!(c, None | Some(1)) {
            return Err(CipError::MultiElementNotTrailing);
        }
        segments.extend(seg);
        if is_last {
            elm = e;
            cnt = c;
        }
    }
    Ok((segments, elm, cnt))
}

/// Parse a single `"@class/instance/attribute/element"` or `"Tag"`
/// component, optionally suffixed with `[begin-end]` and/or `*count`.
/// Mirrors `parse_path_component` (device.py ~L316-364).
pub fn parse_path_component(
    component: &str,
    mut elm: Option<u32>,
    mut cnt: Option<u32>,
) -> Result<(Vec<Segment>, Option<u32>, Option<u32>)> {
    let mut rest = component;
    let mut tail = String::new();

    if let Some((head, count_str)) = rest.split_once('*') {
        rest = head;
        cnt = Some(parse_int(count_str)?.try_into().map_err(|_| {
            CipError::InvalidPathComponent(component.to_string(), "count out of range".into())
        })?);
    }

    if let Some((head, bracket)) = rest.split_once('[') {
        rest = head;
        let (range, remainder) = bracket.split_once(']').ok_or_else(|| {
            CipError::InvalidPathComponent(component.to_string(), "unterminated [..]".into())
        })?;
        if !remainder.is_empty() {
            return Err(CipError::InvalidPathComponent(
                component.to_string(),
                format!("garbage after [...]: {remainder:?}"),
            ));
        }
        if let Some((begin, end)) = range.split_once('-') {
            let begin = parse_int(begin)?;
            let end = parse_int(end)?;
            if end + 1 - begin <= 0 {
                return Err(CipError::InvalidPathComponent(
                    component.to_string(),
                    format!("invalid element range {begin}-{end}"),
                ));
            }
            cnt = Some((end + 1 - begin) as u32);
            elm = Some(begin as u32);
        } else {
            elm = Some(parse_int(range)? as u32);
        }
        tail = remainder.to_string();
    }
    let _ = tail; // already validated empty above

    let mut segments = Vec::new();
    if let Some(numeric) = rest.strip_prefix('@') {
        const DEFAULTS: [&str; 4] = ["class", "instance", "attribute", "element"];
        for (i, term) in numeric.split('/').enumerate() {
            if let Some(json_term) = term.strip_prefix('{') {
                let value: Json = serde_json::from_str(&format!("{{{json_term}"))
                    .map_err(|e| CipError::InvalidPathComponent(term.to_string(), e.to_string()))?;
                segments.push(segment_from_json(term, &value)?);
            } else {
                if i >= DEFAULTS.len() {
                    return Err(CipError::InvalidPathComponent(
                        component.to_string(),
                        format!("no default segment type beyond {DEFAULTS:?}"),
                    ));
                }
                let n = parse_int(term)?;
                segments.push(segment_from_default(DEFAULTS[i], n)?);
            }
        }
    } else {
        segments.push(Segment::Symbolic(rest.to_string()));
    }

    if let Some(e) = elm {
        match segments.last_mut() {
            Some(Segment::Element(existing)) => *existing = e,
            _ => segments.push(Segment::Element(e)),
        }
    }

    Ok((segments, elm, cnt))
}

fn segment_from_default(name: &str, n: i64) -> Result<Segment> {
    match name {
        "class" => Ok(Segment::Class(n as u16)),
        "instance" => Ok(Segment::Instance(n as u16)),
        "attribute" => Ok(Segment::Attribute(n as u16)),
        "element" => Ok(Segment::Element(n as u32)),
        _ => unreachable!(),
    }
}

fn segment_from_json(raw: &str, value: &Json) -> Result<Segment> {
    let obj = value.as_object().ok_or_else(|| {
        CipError::InvalidPathComponent(raw.to_string(), "expected a JSON object".into())
    })?;
    let err = || CipError::InvalidPathComponent(raw.to_string(), "unrecognized JSON segment".into());
    if let Some(v) = obj.get("class") {
        return Ok(Segment::Class(v.as_u64().ok_or_else(err)? as u16));
    }
    if let Some(v) = obj.get("instance") {
        return Ok(Segment::Instance(v.as_u64().ok_or_else(err)? as u16));
    }
    if let Some(v) = obj.get("attribute") {
        return Ok(Segment::Attribute(v.as_u64().ok_or_else(err)? as u16));
    }
    if let Some(v) = obj.get("element") {
        return Ok(Segment::Element(v.as_u64().ok_or_else(err)? as u32));
    }
    if let Some(v) = obj.get("connection") {
        return Ok(Segment::Connection(v.as_u64().ok_or_else(err)? as u16));
    }
    if let Some(v) = obj.get("port") {
        let port = v.as_u64().ok_or_else(err)? as u8;
        let link = match obj.get("link") {
            Some(Json::String(s)) => PortLink::Address(s.clone()),
            Some(Json::Number(n)) => PortLink::Number(n.as_u64().ok_or_else(err)? as u8),
            _ => PortLink::Number(0),
        };
        return Ok(Segment::Port { port, link });
    }
    Err(err())
}

// ---------------------------------------------------------------------
// Wire EPATH codec (spec.md §6)
// ---------------------------------------------------------------------

const LOGICAL_CLASS: u8 = 0x20;
const LOGICAL_INSTANCE: u8 = 0x24;
const LOGICAL_ELEMENT: u8 = 0x28;
const LOGICAL_CONNECTION: u8 = 0x2C;
const LOGICAL_ATTRIBUTE: u8 = 0x30;
const SYMBOLIC_MARKER: u8 = 0x91;

fn encode_logical(out: &mut Vec<u8>, base: u8, value: u32) {
    if value <= 0xFF {
        out.push(base);
        out.push(value as u8);
    } else if value <= 0xFFFF {
        out.push(base | 0x01);
        out.push(0); // pad
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else {
        out.push(base | 0x02);
        out.push(0);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn decode_logical(buf: &[u8], format: u8) -> Result<(u32, usize)> {
    match format {
        0 => {
            if buf.is_empty() {
                return Err(CipError::Truncated {
                    needed: 1,
                    available: 0,
                });
            }
            Ok((buf[0] as u32, 1))
        }
        1 => {
            if buf.len() < 3 {
                return Err(CipError::Truncated {
                    needed: 3,
                    available: buf.len(),
                });
            }
            Ok((u16::from_le_bytes([buf[1], buf[2]]) as u32, 3))
        }
        2 => {
            if buf.len() < 5 {
                return Err(CipError::Truncated {
                    needed: 5,
                    available: buf.len(),
                });
            }
            Ok((u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]), 5))
        }
        _ => Err(CipError::InvalidPathComponent(
            "epath".into(),
            format!("unrecognized logical format {format}"),
        )),
    }
}

impl Segment {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Segment::Class(v) => encode_logical(out, LOGICAL_CLASS, *v as u32),
            Segment::Instance(v) => encode_logical(out, LOGICAL_INSTANCE, *v as u32),
            Segment::Attribute(v) => encode_logical(out, LOGICAL_ATTRIBUTE, *v as u32),
            Segment::Element(v) => encode_logical(out, LOGICAL_ELEMENT, *v),
            Segment::Connection(v) => encode_logical(out, LOGICAL_CONNECTION, *v as u32),
            Segment::Symbolic(name) => {
                out.push(SYMBOLIC_MARKER);
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
                if (2 + name.len()) % 2 == 1 {
                    out.push(0);
                }
            }
            Segment::Port { port, link } => {
                out.push(*port);
                match link {
                    PortLink::Number(n) => out.push(*n),
                    PortLink::Address(addr) => {
                        out.push(addr.len() as u8);
                        out.extend_from_slice(addr.as_bytes());
                        if addr.len() % 2 == 1 {
                            out.push(0);
                        }
                    }
                }
            }
        }
    }
}

impl Path {
    /// Encode as a wire EPATH: `USINT size-in-words` (+ 1 pad byte if
    /// `padded`) followed by the concatenated segments.
    pub fn to_wire(&self, padded: bool) -> Vec<u8> {
        let mut body = Vec::new();
        for seg in &self.segments {
            seg.encode(&mut body);
        }
        let words = body.len().div_ceil(2);
        let mut out = Vec::with_capacity(1 + usize::from(padded) + body.len());
        out.push(words as u8);
        if padded {
            out.push(0);
        }
        out.extend_from_slice(&body);
        out
    }

    /// Decode a wire EPATH, returning `(path, bytes consumed)`.
    pub fn from_wire(buf: &[u8], padded: bool) -> Result<(Path, usize)> {
        if buf.is_empty() {
            return Err(CipError::Truncated {
                needed: 1,
                available: 0,
            });
        }
        let words = buf[0] as usize;
        let mut pos = 1;
        if padded {
            pos += 1;
        }
        let body_len = words * 2;
        if buf.len() < pos + body_len {
            return Err(CipError::Truncated {
                needed: pos + body_len,
                available: buf.len(),
            });
        }
        let mut body = &buf[pos..pos + body_len];
        let mut segments = Vec::new();
        while !body.is_empty() {
            let marker = body[0];
            if marker == SYMBOLIC_MARKER {
                let len = *body.get(1).ok_or(CipError::Truncated {
                    needed: 2,
                    available: body.len(),
                })? as usize;
                let total = 2 + len;
                let consumed = total + (total % 2);
                if body.len() < consumed {
                    return Err(CipError::Truncated {
                        needed: consumed,
                        available: body.len(),
                    });
                }
                let name = String::from_utf8_lossy(&body[2..2 + len]).into_owned();
                segments.push(Segment::Symbolic(name));
                body = &body[consumed..];
                continue;
            }
            let upper = marker & 0xE0;
            if upper == 0x20 {
                let base = marker & 0xFC;
                let format = marker & 0x03;
                let (value, consumed) = decode_logical(body, format)?;
                let seg = match base {
                    LOGICAL_CLASS => Segment::Class(value as u16),
                    LOGICAL_INSTANCE => Segment::Instance(value as u16),
                    LOGICAL_ELEMENT => Segment::Element(value),
                    LOGICAL_CONNECTION => Segment::Connection(value as u16),
                    LOGICAL_ATTRIBUTE => Segment::Attribute(value as u16),
                    other => {
                        return Err(CipError::InvalidPathComponent(
                            "epath".into(),
                            format!("unrecognized logical segment base 0x{other:02x}"),
                        ))
                    }
                };
                segments.push(seg);
                body = &body[consumed..];
            } else {
                // Port segment: byte 0 is the port number, byte 1 the link.
                if body.len() < 2 {
                    return Err(CipError::Truncated {
                        needed: 2,
                        available: body.len(),
                    });
                }
                segments.push(Segment::Port {
                    port: body[0],
                    link: PortLink::Number(body[1]),
                });
                body = &body[2..];
            }
        }
        Ok((Path::new(segments), pos + body_len))
    }
}

// ---------------------------------------------------------------------
// Element extraction (spec.md §4.2)
// ---------------------------------------------------------------------

/// Return the first `Element` segment's value, or `0` if none is present
/// (mirrors `resolve_element`, which always returns a 1-tuple).
pub fn resolve_element(path: &Path) -> u32 {
    path.segments
        .iter()
        .find_map(|s| match s {
            Segment::Element(e) => Some(*e),
            _ => None,
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zero_is_not_octal() {
        assert_eq!(parse_int("012").unwrap(), 12);
        assert_eq!(parse_int("0o12").unwrap(), 10);
        assert_eq!(parse_int("0x1A").unwrap(), 26);
        assert_eq!(parse_int("0b101").unwrap(), 5);
    }

    #[test]
    fn numeric_path_component() {
        let segs = parse_path("@6/1/2", None).unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::Class(6),
                Segment::Instance(1),
                Segment::Attribute(2)
            ]
        );
    }

    #[test]
    fn symbolic_with_element_range() {
        let segs = parse_path("Tag.Sub[3-5]", None).unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::Symbolic("Tag".into()),
                Segment::Symbolic("Sub".into()),
                Segment::Element(3),
            ]
        );
    }

    #[test]
    fn only_trailing_component_may_specify_multiple_elements() {
        let err = parse_path("Tag[1-2].Sub", None).unwrap_err();
        assert!(matches!(err, CipError::MultiElementNotTrailing));
    }

    #[test]
    fn json_segment_term() {
        let segs = parse_path(r#"@{"connection":100}"#, None).unwrap();
        assert_eq!(segs, vec![Segment::Connection(100)]);
    }

    #[test]
    fn epath_round_trips_identity_vendor() {
        let path = Path::class_instance(1, 1);
        let mut path = path;
        path.segments.push(Segment::Attribute(1));
        let wire = path.to_wire(false);
        assert_eq!(wire, vec![0x03, 0x20, 0x01, 0x24, 0x01, 0x30, 0x01]);
        let (decoded, used) = Path::from_wire(&wire, false).unwrap();
        assert_eq!(used, wire.len());
        assert_eq!(decoded, path);
    }

    #[test]
    fn resolve_element_defaults_to_zero() {
        let path = Path::class_instance(1, 1);
        assert_eq!(resolve_element(&path), 0);
    }
}
