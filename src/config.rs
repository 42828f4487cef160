//! # Config
//!
//! A small INI-flavored configuration surface for per-object defaults
//! (vendor id, product name, TCP/IP interface address, and so on) —
//! spec.md §4.3's `config_str`/`config_int`/`config_float`/`config_bool`/
//! `config_json` accessors, grounded on device.py's `Object.config_str`
//! family (~L704-730).
//!
//! Grammar: `#`-prefixed comment lines, `[section]` headers, `key =
//! value` pairs, and `${section:key}` interpolation terms that are
//! substituted (recursively, up to a fixed depth) before a value is
//! returned. There's no crate on the teacher's dependency list that
//! speaks this exact grammar, so it's hand-rolled the way the teacher
//! hand-rolls its own `IpcConfig` parsing in `src/cli.rs` rather than
//! importing one.

use crate::error::{CipError, Result};
use serde_json::Value as Json;
use std::collections::HashMap;

const MAX_INTERPOLATION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn parse(input: &str) -> Result<Config> {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();
        for (lineno, raw_line) in input.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                current = name.trim().to_string();
                sections.entry(current.clone()).or_default();
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                CipError::InvalidConfig {
                    section: current.clone(),
                    key: format!("line {}", lineno + 1),
                    value: raw_line.to_string(),
                }
            })?;
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Config { sections })
    }

    /// Look up `key` in `section`, falling back to the `DEFAULT` section
    /// when the named section doesn't carry it (spec.md §6: "falls back
    /// to a DEFAULT section").
    fn raw(&self, section: &str, key: &str) -> Result<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .or_else(|| self.sections.get("DEFAULT").and_then(|s| s.get(key)))
            .map(String::as_str)
            .ok_or_else(|| CipError::MissingConfig {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    fn interpolate(&self, value: &str, depth: usize) -> Result<String> {
        if depth > MAX_INTERPOLATION_DEPTH {
            return Err(CipError::InvalidConfig {
                section: String::new(),
                key: String::new(),
                value: value.to_string(),
            });
        }
        let mut out = String::new();
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| CipError::InvalidConfig {
                section: String::new(),
                key: String::new(),
                value: value.to_string(),
            })?;
            let term = &after[..end];
            let (section, key) = term.split_once(':').ok_or_else(|| CipError::InvalidConfig {
                section: String::new(),
                key: term.to_string(),
                value: value.to_string(),
            })?;
            let resolved = self.raw(section, key)?;
            out.push_str(&self.interpolate(resolved, depth + 1)?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    pub fn config_str(&self, section: &str, key: &str) -> Result<String> {
        self.interpolate(self.raw(section, key)?, 0)
    }

    pub fn config_int(&self, section: &str, key: &str) -> Result<i64> {
        let raw = self.config_str(section, key)?;
        crate::path::parse_int(&raw)
    }

    pub fn config_float(&self, section: &str, key: &str) -> Result<f64> {
        let raw = self.config_str(section, key)?;
        raw.parse::<f64>().map_err(|_| CipError::InvalidConfig {
            section: section.to_string(),
            key: key.to_string(),
            value: raw,
        })
    }

    pub fn config_bool(&self, section: &str, key: &str) -> Result<bool> {
        let raw = self.config_str(section, key)?;
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(CipError::InvalidConfig {
                section: section.to_string(),
                key: key.to_string(),
                value: raw,
            }),
        }
    }

    pub fn config_json(&self, section: &str, key: &str) -> Result<Json> {
        let raw = self.config_str(section, key)?;
        serde_json::from_str(&raw).map_err(|e| CipError::InvalidConfig {
            section: section.to_string(),
            key: key.to_string(),
            value: format!("{raw} ({e})"),
        })
    }

    /// Convenience accessor used by constructors that can fall back to a
    /// caller-supplied default rather than erroring when a key is absent.
    pub fn config_str_or(&self, section: &str, key: &str, default: &str) -> String {
        self.config_str(section, key).unwrap_or_else(|_| default.to_string())
    }

    pub fn config_int_or(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config_int(section, key).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_comments() {
        let cfg = Config::parse(
            "# a comment\n[identity]\nvendor_id = 1\nproduct_name = Widget # inline comment\n",
        )
        .unwrap();
        assert_eq!(cfg.config_int("identity", "vendor_id").unwrap(), 1);
        assert_eq!(cfg.config_str("identity", "product_name").unwrap(), "Widget");
    }

    #[test]
    fn interpolates_across_sections() {
        let cfg = Config::parse("[net]\nhost = 10.0.0.1\n[identity]\naddr = ${net:host}:44818\n").unwrap();
        assert_eq!(cfg.config_str("identity", "addr").unwrap(), "10.0.0.1:44818");
    }

    #[test]
    fn falls_back_to_default_section() {
        let cfg = Config::parse("[DEFAULT]\nproduct_name = Widget\n[identity]\nvendor_id = 1\n").unwrap();
        assert_eq!(cfg.config_str("identity", "product_name").unwrap(), "Widget");
        assert_eq!(cfg.config_int("identity", "vendor_id").unwrap(), 1);
    }

    #[test]
    fn parses_from_a_file_on_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[identity]\nvendor_id = 7\nproduct_name = Widget\n").unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        let cfg = Config::parse(&contents).unwrap();
        assert_eq!(cfg.config_int("identity", "vendor_id").unwrap(), 7);
    }

    #[test]
    fn missing_key_is_an_error() {
        let cfg = Config::parse("[identity]\n").unwrap();
        let err = cfg.config_str("identity", "vendor_id").unwrap_err();
        assert!(matches!(err, CipError::MissingConfig { .. }));
    }

    #[test]
    fn bool_accepts_common_spellings() {
        let cfg = Config::parse("[a]\nx = yes\ny = 0\n").unwrap();
        assert!(cfg.config_bool("a", "x").unwrap());
        assert!(!cfg.config_bool("a", "y").unwrap());
    }
}
