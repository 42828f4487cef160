//! # Registry
//!
//! The process-wide directory of objects (keyed by `(class_id,
//! instance_id)`) and the symbol table mapping tag names onto a default
//! `@class/instance[/attribute]` path (spec.md §4.2). Mirrors device.py's
//! module-level `directory`/`symbol` dicts and their `lookup`/
//! `redirect_tag`/`resolve`/`lookup_reset` functions, but as an owned,
//! lockable type rather than process globals — there is exactly one
//! `Registry` per running device, constructed once at startup.

use crate::error::{CipError, Result};
use crate::object::Object;
use crate::path::{Path, Segment};
use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub type ObjectRef = Arc<Mutex<Object>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub class: u16,
    pub instance: u16,
    pub attribute: Option<u16>,
}

#[derive(Default)]
struct Inner {
    directory: HashMap<(u16, u16), ObjectRef>,
    symbols: HashMap<String, String>,
    class_max_instance: HashMap<u16, u16>,
}

/// Process-wide object directory and tag symbol table, guarded by a
/// single `RwLock` (spec.md §5: readers - path resolution, attribute
/// reads - never block each other; only registration and symbol-table
/// edits take the write half).
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register an object, creating its class's instance-0 meta-instance
    /// first if this is the first instance of that class to be
    /// registered (see `crate::object::Object::new`, which is where the
    /// meta-instance is actually constructed — this just bumps the
    /// class's high-water mark).
    pub fn register(&self, object: Object) -> ObjectRef {
        let key = (object.class_id, object.instance_id);
        debug!("registering object class 0x{:02x} instance {}", key.0, key.1);
        let handle: ObjectRef = Arc::new(Mutex::new(object));
        let mut inner = self.inner.write();
        let slot = inner.class_max_instance.entry(key.0).or_insert(0);
        if key.1 > *slot {
            *slot = key.1;
        }
        inner.directory.insert(key, handle.clone());
        handle
    }

    /// Allocate the next instance id for `class_id` without registering
    /// anything yet (used by constructors that need the id up front to
    /// build the object before handing it to [`Registry::register`]).
    pub fn next_instance(&self, class_id: u16) -> u16 {
        let mut inner = self.inner.write();
        let slot = inner.class_max_instance.entry(class_id).or_insert(0);
        *slot += 1;
        *slot
    }

    pub fn lookup(&self, class_id: u16, instance_id: u16) -> Option<ObjectRef> {
        self.inner.read().directory.get(&(class_id, instance_id)).cloned()
    }

    /// The live `MaxInstance` counter for a class (spec.md §4.3).
    pub fn max_instance(&self, class_id: u16) -> u16 {
        self.inner
            .read()
            .class_max_instance
            .get(&class_id)
            .copied()
            .unwrap_or(0)
    }

    /// Count of currently-registered instances of `class_id` in
    /// `1..=max_instance` (spec.md §4.3's `NumInstances`; instance 0,
    /// the meta-instance, never counts).
    pub fn num_instances(&self, class_id: u16) -> u16 {
        self.inner
            .read()
            .directory
            .keys()
            .filter(|(c, i)| *c == class_id && *i != 0)
            .count() as u16
    }

    /// Bind a symbolic tag name to a default path string, e.g.
    /// `redirect_tag("SCADA", "@6/1")` (spec.md §4.2's `redirect_tag`).
    pub fn redirect_tag(&self, name: impl Into<String>, target: impl Into<String>) {
        self.inner.write().symbols.insert(name.into(), target.into());
    }

    /// Clear the directory and symbol table. Mirrors `lookup_reset` in the
    /// original, used between independent test scenarios that should not
    /// see each other's registered objects. Per-class `max_instance`
    /// counters are deliberately left untouched (spec.md §3: new instances
    /// must receive strictly higher ids than any prior instance of that
    /// class ever held, even across a reset) — device.py's `lookup_reset`
    /// only clears `directory`/`symbol` and never resets `max_instance`.
    pub fn lookup_reset(&self) {
        debug!("clearing object directory and symbol table");
        let mut inner = self.inner.write();
        inner.directory.clear();
        inner.symbols.clear();
    }

    /// Resolve a parsed [`Path`] into a concrete `(class, instance,
    /// attribute)` triple, substituting any symbolic segment with its
    /// registered default path and merging the result (spec.md §4.2's
    /// `resolve`). A path with no `Symbolic` segments resolves purely
    /// from its own logical segments.
    pub fn resolve(&self, path: &Path) -> Result<Resolved> {
        let mut class = None;
        let mut instance = None;
        let mut attribute = None;
        let mut pending = String::new();
        self.resolve_into(path, &mut class, &mut instance, &mut attribute, &mut pending)?;
        if !pending.is_empty() {
            return Err(CipError::UnresolvedSymbol(pending));
        }
        Ok(Resolved {
            class: class.ok_or(CipError::PathIncomplete("class"))?,
            instance: instance.ok_or(CipError::PathIncomplete("instance"))?,
            attribute,
        })
    }

    /// Walk `path`'s segments left to right, filling `class`/`instance`/
    /// `attribute` at most once each (spec.md §4.2). Symbolic segments
    /// accumulate into a dotted `pending` tag ("Parent.Child") rather than
    /// resolving one component at a time: at each extension the whole
    /// accumulated name is looked up, and only a hit substitutes the
    /// mapped path and resets `pending` — a miss just keeps accumulating,
    /// so multi-segment tag names ("Parent.Child") resolve correctly even
    /// though neither "Parent" nor "Parent.Child" is itself registered
    /// until the full name matches.
    fn resolve_into(
        &self,
        path: &Path,
        class: &mut Option<u16>,
        instance: &mut Option<u16>,
        attribute: &mut Option<u16>,
        pending: &mut String,
    ) -> Result<()> {
        for seg in &path.segments {
            match seg {
                Segment::Class(c) => set_or_conflict(class, *c, "class")?,
                Segment::Instance(i) => set_or_conflict(instance, *i, "instance")?,
                Segment::Attribute(a) => set_or_conflict(attribute, *a, "attribute")?,
                Segment::Symbolic(name) => {
                    if pending.is_empty() {
                        pending.push_str(name);
                    } else {
                        pending.push('.');
                        pending.push_str(name);
                    }
                    let target = { self.inner.read().symbols.get(pending.as_str()).cloned() };
                    if let Some(target) = target {
                        pending.clear();
                        let sub = crate::path::parse_path(&target, None)?;
                        self.resolve_into(&Path::new(sub), class, instance, attribute, pending)?;
                    }
                }
                // Element/Connection/Port segments are consumed by the
                // connection manager and attribute indexing, not by
                // object resolution.
                Segment::Element(_) | Segment::Connection(_) | Segment::Port { .. } => {}
            }
        }
        Ok(())
    }
    /// Walk the symbol table and confirm every registered tag still
    /// resolves to a live object — catches the case where a tag was
    /// bound with [`Registry::redirect_tag`] before its target was ever
    /// registered (or after it was dropped by a `lookup_reset`). Not part
    /// of the wire-facing request path; intended for a startup or
    /// integration-test sanity pass, so it collects ad-hoc `anyhow`
    /// context per tag rather than the structured `CipError` the request
    /// path uses, and only that context is stripped off at this public
    /// boundary.
    pub fn self_check(&self) -> Result<()> {
        self.validate_symbol_targets().map_err(|e| CipError::Other(e.to_string()))
    }

    fn validate_symbol_targets(&self) -> anyhow::Result<()> {
        let symbols = self.inner.read().symbols.clone();
        for (name, target) in &symbols {
            let segments = crate::path::parse_path(target, None)
                .with_context(|| format!("tag {name:?} has an unparseable target {target:?}"))?;
            let resolved = self
                .resolve(&Path::new(segments))
                .with_context(|| format!("tag {name:?} targets {target:?}, which does not resolve"))?;
            if self.lookup(resolved.class, resolved.instance).is_none() {
                anyhow::bail!(
                    "tag {name:?} targets class 0x{:02x} instance {}, which is not registered",
                    resolved.class,
                    resolved.instance
                );
            }
        }
        Ok(())
    }
}

fn set_or_conflict(slot: &mut Option<u16>, value: u16, field: &'static str) -> Result<()> {
    match slot {
        Some(existing) if *existing != value => Err(CipError::PathSegmentConflict { field }),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::path::parse_path;

    #[test]
    fn resolves_plain_logical_path() {
        let reg = Registry::new();
        let path = Path::new(parse_path("@6/1/1", None).unwrap());
        let resolved = reg.resolve(&path).unwrap();
        assert_eq!(resolved.class, 6);
        assert_eq!(resolved.instance, 1);
        assert_eq!(resolved.attribute, Some(1));
    }

    #[test]
    fn resolves_symbolic_tag() {
        let reg = Registry::new();
        reg.redirect_tag("SCADA", "@6/1");
        let path = Path::new(parse_path("SCADA", None).unwrap());
        let resolved = reg.resolve(&path).unwrap();
        assert_eq!(resolved.class, 6);
        assert_eq!(resolved.instance, 1);
        assert_eq!(resolved.attribute, None);
    }

    #[test]
    fn resolves_dotted_multi_component_symbol() {
        let reg = Registry::new();
        reg.redirect_tag("Parent.Child", "@6/1/1");
        let path = Path::new(parse_path("Parent.Child", None).unwrap());
        let resolved = reg.resolve(&path).unwrap();
        assert_eq!(resolved.class, 6);
        assert_eq!(resolved.instance, 1);
        assert_eq!(resolved.attribute, Some(1));
    }

    #[test]
    fn unresolved_symbol_errors() {
        let reg = Registry::new();
        let path = Path::new(parse_path("NoSuchTag", None).unwrap());
        let err = reg.resolve(&path).unwrap_err();
        assert!(matches!(err, CipError::UnresolvedSymbol(_)));
    }

    #[test]
    fn self_check_flags_a_tag_with_no_registered_target() {
        let reg = Registry::new();
        reg.redirect_tag("SCADA", "@6/1");
        let err = reg.self_check().unwrap_err();
        assert!(matches!(err, CipError::Other(_)));
    }

    #[test]
    fn self_check_passes_once_target_is_registered() {
        let reg = Registry::new();
        reg.redirect_tag("SCADA", "@1/1");
        reg.register(Object::new(&reg, 1, 1, "Identity"));
        reg.self_check().unwrap();
    }

    #[test]
    fn lookup_reset_does_not_rewind_max_instance() {
        let reg = Registry::new();
        let id = reg.next_instance(1);
        reg.register(Object::new(&reg, 1, id, "Identity"));
        let before = reg.max_instance(1);
        reg.lookup_reset();
        let after = reg.next_instance(1);
        assert!(after > before);
        assert!(reg.lookup(1, id).is_none());
    }

    #[test]
    fn max_instance_tracks_registrations() {
        let reg = Registry::new();
        assert_eq!(reg.max_instance(1), 0);
        let obj = Object::new(&reg, 1, 1, "Identity");
        reg.register(obj);
        assert_eq!(reg.max_instance(1), 1);
        assert_eq!(reg.num_instances(1), 1);
    }
}
