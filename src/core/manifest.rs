//! Pipeline manifest loading and normalization.
//!
//! The manifest is JSON, YAML, or TOML (chosen by extension) with five top-level
//! keys: `descriptor`, `vars`, `tools`, `tasks`, `aliases`. Task targets are
//! normalized into [`AtomicTask`]s with every template parsed up front, and into a
//! configuration tree that templates can reference (`<%= concat.core.dest %>`).

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::registry::{AtomicTask, FileMapping, TaskKey, TaskRegistry};
use crate::template::{Template, TemplateValue};
use crate::tools::external::ToolDefinition;
use crate::utils::io;

pub const DEFAULT_MANIFEST: &str = "assetline.json";
pub const DEFAULT_DESCRIPTOR: &str = "package.json";

const GROUP_TOOL: &str = "tool";
const GROUP_OPTIONS: &str = "options";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Format::Json),
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            Some("toml") => Ok(Format::Toml),
            other => Err(Error::config_invalid_format(
                path.display().to_string(),
                format!(
                    "unsupported manifest extension '{}' (expected .json, .yaml, .yml or .toml)",
                    other.unwrap_or("")
                ),
            )),
        }
    }
}

fn default_descriptor() -> String {
    DEFAULT_DESCRIPTOR.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default = "default_descriptor")]
    descriptor: String,
    #[serde(default)]
    vars: Map<String, Value>,
    #[serde(default)]
    tools: IndexMap<String, ToolDefinition>,
    #[serde(default)]
    tasks: Map<String, Value>,
    #[serde(default)]
    aliases: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    /// Descriptor path as written, relative to the manifest directory.
    pub descriptor: String,
    pub vars: IndexMap<String, TemplateValue>,
    pub tools: IndexMap<String, ToolDefinition>,
    /// Normalized task configuration, addressable as `group.target.field`.
    pub config: IndexMap<String, TemplateValue>,
    pub tasks: Vec<AtomicTask>,
    pub aliases: IndexMap<String, Vec<String>>,
}

pub fn load(path: &Path) -> Result<Manifest> {
    let format = Format::from_path(path)?;
    let content = io::read_config(path)?;
    parse(&content, format, path)
}

pub fn parse(content: &str, format: Format, path: &Path) -> Result<Manifest> {
    let display = path.display().to_string();
    let value: Value = match format {
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        Format::Yaml => serde_yml::from_str(content).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    }
    .map_err(|e| Error::config_invalid_format(display.clone(), e))?;

    let raw: RawManifest = serde_json::from_value(value)
        .map_err(|e| Error::config_invalid_format(display.clone(), e.to_string()))?;

    let vars = raw
        .vars
        .iter()
        .map(|(k, v)| TemplateValue::parse(v).map(|t| (k.clone(), t)))
        .collect::<Result<IndexMap<_, _>>>()?;

    let mut config = IndexMap::new();
    let mut tasks = Vec::new();
    for (group, body) in &raw.tasks {
        let (normalized, group_tasks) = parse_group(group, body)?;
        config.insert(group.clone(), TemplateValue::parse(&Value::Object(normalized))?);
        tasks.extend(group_tasks);
    }

    for (name, refs) in &raw.aliases {
        if let Some(bad) = refs.iter().find(|r| r.trim().is_empty()) {
            return Err(Error::config_invalid_value(
                format!("aliases.{}", name),
                Some(bad.clone()),
                "task references must be non-empty",
            ));
        }
    }

    Ok(Manifest {
        path: path.to_path_buf(),
        descriptor: raw.descriptor,
        vars,
        tools: raw.tools,
        config,
        tasks,
        aliases: raw.aliases,
    })
}

impl Manifest {
    pub fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.dir().join(&self.descriptor)
    }

    /// Register every atomic task, then every alias.
    pub fn registry(&self) -> Result<TaskRegistry> {
        let mut registry = TaskRegistry::new();
        for task in &self.tasks {
            registry.register(&task.key.group, &task.key.target, task.clone())?;
        }
        for (name, refs) in &self.aliases {
            registry.register_composite(name, refs.clone())?;
        }
        Ok(registry)
    }
}

fn parse_group(group: &str, body: &Value) -> Result<(Map<String, Value>, Vec<AtomicTask>)> {
    let field = format!("tasks.{}", group);
    if group.is_empty() || group.contains(':') {
        return Err(Error::config_invalid_value(
            field,
            Some(group.to_string()),
            "group names must be non-empty and must not contain ':'",
        ));
    }
    let Value::Object(entries) = body else {
        return Err(Error::config_invalid_value(
            field,
            Some(body.to_string()),
            "must be an object of targets",
        ));
    };

    let tool = match entries.get(GROUP_TOOL) {
        None => group.to_string(),
        Some(Value::String(t)) if !t.is_empty() => t.clone(),
        Some(other) => {
            return Err(Error::config_invalid_value(
                format!("{}.{}", field, GROUP_TOOL),
                Some(other.to_string()),
                "must be a non-empty string",
            ))
        }
    };
    let group_options = match entries.get(GROUP_OPTIONS) {
        None => Map::new(),
        Some(Value::Object(o)) => o.clone(),
        Some(other) => {
            return Err(Error::config_invalid_value(
                format!("{}.{}", field, GROUP_OPTIONS),
                Some(other.to_string()),
                "must be an object",
            ))
        }
    };

    let mut normalized = Map::new();
    let mut tasks = Vec::new();
    for (target, target_body) in entries {
        if target == GROUP_TOOL || target == GROUP_OPTIONS {
            normalized.insert(target.clone(), target_body.clone());
            continue;
        }
        let body = normalize_target(&format!("{}.{}", field, target), target_body)?;
        tasks.push(build_task(
            TaskKey::new(group, target.as_str()),
            &tool,
            &group_options,
            &body,
        )?);
        normalized.insert(target.clone(), Value::Object(body));
    }
    Ok((normalized, tasks))
}

/// Strings and arrays are shorthand for `{ "src": ... }`.
fn normalize_target(field: &str, body: &Value) -> Result<Map<String, Value>> {
    match body {
        Value::String(_) | Value::Array(_) => {
            let mut map = Map::new();
            map.insert("src".to_string(), body.clone());
            Ok(map)
        }
        Value::Object(map) => Ok(map.clone()),
        other => Err(Error::config_invalid_value(
            field,
            Some(other.to_string()),
            "a target must be a string, an array, or an object",
        )),
    }
}

fn build_task(
    key: TaskKey,
    group_tool: &str,
    group_options: &Map<String, Value>,
    body: &Map<String, Value>,
) -> Result<AtomicTask> {
    let field = format!("tasks.{}.{}", key.group, key.target);
    let mut options = group_options.clone();
    let mut explicit = Map::new();
    let mut task = AtomicTask::new(key, group_tool);

    for (name, value) in body {
        let at = || format!("{}.{}", field, name);
        match name.as_str() {
            "src" => task.src = templates(&at(), value)?,
            "dest" => task.dest = Some(Template::parse(string(&at(), value)?)?),
            "cwd" => task.cwd = Some(Template::parse(string(&at(), value)?)?),
            "tool" => task.tool = string(&at(), value)?.to_string(),
            "expand" => {
                task.expand = value.as_bool().ok_or_else(|| {
                    Error::config_invalid_value(at(), Some(value.to_string()), "must be a boolean")
                })?
            }
            "files" => task.files = file_mappings(&at(), value)?,
            "options" => match value {
                Value::Object(o) => explicit = o.clone(),
                other => {
                    return Err(Error::config_invalid_value(
                        at(),
                        Some(other.to_string()),
                        "must be an object",
                    ))
                }
            },
            _ => {
                options.insert(name.clone(), value.clone());
            }
        }
    }
    options.extend(explicit);

    for (name, value) in &options {
        task.options.insert(name.clone(), TemplateValue::parse(value)?);
    }
    Ok(task)
}

fn string<'v>(field: &str, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        Error::config_invalid_value(field, Some(value.to_string()), "must be a string")
    })
}

fn templates(field: &str, value: &Value) -> Result<Vec<Template>> {
    match value {
        Value::String(s) => Ok(vec![Template::parse(s)?]),
        Value::Array(items) => items
            .iter()
            .map(|item| Template::parse(string(field, item)?))
            .collect(),
        other => Err(Error::config_invalid_value(
            field,
            Some(other.to_string()),
            "must be a string or an array of strings",
        )),
    }
}

/// `{ "dest": src }` objects, or `[{ "dest": ..., "src": ... }]` arrays.
fn file_mappings(field: &str, value: &Value) -> Result<Vec<FileMapping>> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(dest, src)| {
                Ok(FileMapping {
                    dest: Template::parse(dest)?,
                    src: templates(&format!("{}.{}", field, dest), src)?,
                })
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let at = format!("{}.{}", field, i);
                let dest = item
                    .get("dest")
                    .ok_or_else(|| Error::config_missing_key(format!("{}.dest", at), None))?;
                let src = item
                    .get("src")
                    .ok_or_else(|| Error::config_missing_key(format!("{}.src", at), None))?;
                Ok(FileMapping {
                    dest: Template::parse(string(&at, dest)?)?,
                    src: templates(&at, src)?,
                })
            })
            .collect(),
        other => Err(Error::config_invalid_value(
            field,
            Some(other.to_string()),
            "must be an object or an array of mappings",
        )),
    }
}
