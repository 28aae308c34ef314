//! Project descriptor: the immutable `pkg` record used for template substitution.

use std::borrow::Cow;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::template::{walk_value, Binding, Lookup, RefPath};
use crate::utils::io;

pub const DESCRIPTOR_ROOT: &str = "pkg";

const REQUIRED_FIELDS: [&str; 4] = ["name", "version", "author", "license"];

#[derive(Debug, Clone, Serialize)]
pub struct Descriptor {
    pub name: String,
    pub version: String,
    pub author: String,
    pub license: String,
    #[serde(skip)]
    raw: Map<String, Value>,
}

impl Descriptor {
    /// Full descriptor object, including nested tool configuration blocks.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }
}

pub fn load(path: &Path) -> Result<Descriptor> {
    let display = path.display().to_string();
    let content = io::read_config(path)?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_format(display.clone(), e.to_string()))?;
    from_value(value, &display)
}

pub fn from_value(value: Value, origin: &str) -> Result<Descriptor> {
    let Value::Object(raw) = value else {
        return Err(Error::config_invalid_format(
            origin,
            "descriptor must be a JSON object",
        ));
    };

    let mut fields = Vec::with_capacity(REQUIRED_FIELDS.len());
    for key in REQUIRED_FIELDS {
        match raw.get(key) {
            None | Some(Value::Null) => {
                return Err(Error::config_missing_key(key, Some(origin.to_string())))
            }
            Some(Value::String(s)) if !s.trim().is_empty() => fields.push(s.clone()),
            Some(other) => {
                return Err(Error::config_invalid_value(
                    key,
                    Some(other.to_string()),
                    "must be a non-empty string",
                ))
            }
        }
    }

    let version = &fields[1];
    if let Err(e) = semver::Version::parse(version) {
        return Err(Error::config_invalid_value(
            "version",
            Some(version.clone()),
            format!("not a semantic version ({})", e),
        ));
    }

    let mut fields = fields.into_iter();
    Ok(Descriptor {
        name: fields.next().unwrap_or_default(),
        version: fields.next().unwrap_or_default(),
        author: fields.next().unwrap_or_default(),
        license: fields.next().unwrap_or_default(),
        raw,
    })
}

impl Lookup for Descriptor {
    fn lookup(&self, path: &RefPath) -> Option<Binding<'_>> {
        let (root, rest) = path.segments().split_first()?;
        if root != DESCRIPTOR_ROOT || rest.is_empty() {
            return None;
        }
        let (head, tail) = rest.split_first()?;
        walk_value(self.raw.get(head)?, tail).map(|v| Binding::Value(Cow::Borrowed(v)))
    }
}
