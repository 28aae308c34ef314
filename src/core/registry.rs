//! Typed task registry.
//!
//! Atomic tasks are keyed by `(group, target)`; composite tasks live in their own
//! namespace. Lookups return an exhaustive [`Entry`] variant instead of a dynamic value.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::template::{Template, TemplateValue};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskKey {
    pub group: String,
    pub target: String,
}

impl TaskKey {
    pub fn new(group: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            target: target.into(),
        }
    }

    /// Split `group:target` at the first colon.
    pub fn parse(reference: &str) -> Option<Self> {
        let (group, target) = reference.split_once(':')?;
        if group.is_empty() || target.is_empty() {
            return None;
        }
        Some(Self::new(group, target))
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.target)
    }
}

/// One `dest: [src...]` mapping of a target's `files` block.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMapping {
    pub dest: Template,
    pub src: Vec<Template>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomicTask {
    pub key: TaskKey,
    pub tool: String,
    pub src: Vec<Template>,
    pub dest: Option<Template>,
    pub cwd: Option<Template>,
    pub expand: bool,
    pub files: Vec<FileMapping>,
    pub options: IndexMap<String, TemplateValue>,
}

impl AtomicTask {
    pub fn new(key: TaskKey, tool: impl Into<String>) -> Self {
        Self {
            key,
            tool: tool.into(),
            src: Vec::new(),
            dest: None,
            cwd: None,
            expand: false,
            files: Vec::new(),
            options: IndexMap::new(),
        }
    }

    pub fn with_src(mut self, patterns: &[&str]) -> Result<Self> {
        for pattern in patterns {
            self.src.push(Template::parse(pattern)?);
        }
        Ok(self)
    }

    pub fn with_dest(mut self, dest: &str) -> Result<Self> {
        self.dest = Some(Template::parse(dest)?);
        Ok(self)
    }

    pub fn with_option(mut self, key: &str, value: serde_json::Value) -> Result<Self> {
        self.options
            .insert(key.to_string(), TemplateValue::parse(&value)?);
        Ok(self)
    }

    /// Every template reference the task's fields contain.
    pub fn references(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        let templates = self
            .src
            .iter()
            .chain(self.dest.iter())
            .chain(self.cwd.iter())
            .chain(self.files.iter().flat_map(|m| std::iter::once(&m.dest).chain(m.src.iter())));
        for template in templates {
            refs.extend(template.references().map(|r| r.to_string()));
        }
        for value in self.options.values() {
            refs.extend(value.references().into_iter().map(|r| r.to_string()));
        }
        refs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeTask {
    pub name: String,
    pub refs: Vec<String>,
}

/// Result of looking up a task reference.
#[derive(Debug)]
pub enum Entry<'a> {
    Atomic(&'a AtomicTask),
    /// A bare group name: every target of the group, in declaration order.
    Group(Vec<&'a AtomicTask>),
    Composite(&'a CompositeTask),
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    atomics: IndexMap<TaskKey, AtomicTask>,
    groups: IndexMap<String, Vec<TaskKey>>,
    composites: IndexMap<String, CompositeTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, group: &str, target: &str, mut task: AtomicTask) -> Result<()> {
        let key = TaskKey::new(group, target);
        let display = key.to_string();

        if self.atomics.contains_key(&key) {
            return Err(Error::task_duplicate(display, "an atomic task"));
        }
        if self.composites.contains_key(&display) {
            return Err(Error::task_duplicate(display, "a composite task"));
        }
        if !self.groups.contains_key(group) && self.composites.contains_key(group) {
            return Err(Error::task_duplicate(group, "a composite task"));
        }

        task.key = key.clone();
        self.groups
            .entry(group.to_string())
            .or_default()
            .push(key.clone());
        self.atomics.insert(key, task);
        Ok(())
    }

    pub fn register_composite(&mut self, name: &str, refs: Vec<String>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::validation_invalid_argument(
                "aliases",
                "Composite task name must not be empty",
                None,
                None,
            ));
        }
        if self.composites.contains_key(name) {
            return Err(Error::task_duplicate(name, "a composite task"));
        }
        if self.groups.contains_key(name) {
            return Err(Error::task_duplicate(name, "an atomic task group"));
        }
        if TaskKey::parse(name).is_some_and(|key| self.atomics.contains_key(&key)) {
            return Err(Error::task_duplicate(name, "an atomic task"));
        }

        self.composites.insert(
            name.to_string(),
            CompositeTask {
                name: name.to_string(),
                refs,
            },
        );
        Ok(())
    }

    /// Resolve a reference: composite name first, then `group:target`, then a bare group.
    pub fn get(&self, reference: &str) -> Option<Entry<'_>> {
        if let Some(composite) = self.composites.get(reference) {
            return Some(Entry::Composite(composite));
        }
        if let Some(key) = TaskKey::parse(reference) {
            return self.atomics.get(&key).map(Entry::Atomic);
        }
        self.groups.get(reference).map(|keys| {
            Entry::Group(keys.iter().filter_map(|k| self.atomics.get(k)).collect())
        })
    }

    pub fn atomic(&self, key: &TaskKey) -> Option<&AtomicTask> {
        self.atomics.get(key)
    }

    pub fn composite(&self, name: &str) -> Option<&CompositeTask> {
        self.composites.get(name)
    }

    pub fn atomics(&self) -> impl Iterator<Item = &AtomicTask> {
        self.atomics.values()
    }

    pub fn composites(&self) -> impl Iterator<Item = &CompositeTask> {
        self.composites.values()
    }

    /// Every name a reference may use, for suggestions.
    pub fn reference_names(&self) -> Vec<String> {
        self.composites
            .keys()
            .cloned()
            .chain(self.groups.keys().cloned())
            .chain(self.atomics.keys().map(|k| k.to_string()))
            .collect()
    }
}
