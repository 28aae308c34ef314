//! Two-phase string templates.
//!
//! Templates are parsed once into literal and reference nodes (`<%= pkg.version %>`)
//! and rendered later against a [`Lookup`] scope. Unresolved references are errors,
//! never empty strings.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"(?s)<%=(.*?)%>").expect("tag pattern is valid"))
}

fn path_pattern() -> &'static Regex {
    static PATH: OnceLock<Regex> = OnceLock::new();
    PATH.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_$-]+(?:\.[A-Za-z0-9_$-]+)*$").expect("path pattern is valid")
    })
}

/// Dotted reference path such as `pkg.version` or `jshint.grunt.src`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefPath {
    segments: Vec<String>,
}

impl RefPath {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !path_pattern().is_match(raw) {
            return None;
        }
        Some(Self {
            segments: raw.split('.').map(str::to_string).collect(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn root(&self) -> &str {
        &self.segments[0]
    }
}

impl fmt::Display for RefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Literal(String),
    Reference(RefPath),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut cursor = 0;

        for caps in tag_pattern().captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            push_literal(&mut nodes, &source[cursor..whole.start()], source)?;

            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let path = RefPath::parse(inner).ok_or_else(|| {
                Error::template_syntax(
                    source,
                    format!("'{}' is not a dotted reference path", inner.trim()),
                )
            })?;
            nodes.push(Node::Reference(path));
            cursor = whole.end();
        }
        push_literal(&mut nodes, &source[cursor..], source)?;

        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_literal(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, Node::Literal(_)))
    }

    pub fn references(&self) -> impl Iterator<Item = &RefPath> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Reference(path) => Some(path),
            Node::Literal(_) => None,
        })
    }

    /// The reference when the whole template is exactly one `<%= ... %>` tag.
    pub fn single_reference(&self) -> Option<&RefPath> {
        match self.nodes.as_slice() {
            [Node::Reference(path)] => Some(path),
            _ => None,
        }
    }

    pub fn render(&self, scope: &dyn Lookup) -> Result<String> {
        Renderer::new(scope).text(self)
    }

    /// Render keeping the referenced value's type when the template is a single reference.
    pub fn render_value(&self, scope: &dyn Lookup) -> Result<Value> {
        Renderer::new(scope).text_value(self)
    }

    /// Render to a list of strings; a single reference to an array expands in place.
    pub fn render_list(&self, scope: &dyn Lookup) -> Result<Vec<String>> {
        let value = self.render_value(scope)?;
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    scalar_text(item).ok_or_else(|| {
                        Error::template_invalid_value(
                            self.source.clone(),
                            "contains a non-scalar list element",
                        )
                    })
                })
                .collect(),
            other => Ok(vec![stringify(&other, &self.source)?]),
        }
    }
}

fn push_literal(nodes: &mut Vec<Node>, text: &str, source: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    if text.contains("<%") {
        return Err(Error::template_syntax(
            source,
            "unterminated or unsupported '<%' tag",
        ));
    }
    nodes.push(Node::Literal(text.to_string()));
    Ok(())
}

/// Parsed JSON value whose strings are templates.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Text(Template),
    List(Vec<TemplateValue>),
    Map(IndexMap<String, TemplateValue>),
    Scalar(Value),
}

impl TemplateValue {
    pub fn parse(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::String(s) => TemplateValue::Text(Template::parse(s)?),
            Value::Array(items) => TemplateValue::List(
                items
                    .iter()
                    .map(TemplateValue::parse)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                let mut parsed = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    parsed.insert(key.clone(), TemplateValue::parse(item)?);
                }
                TemplateValue::Map(parsed)
            }
            other => TemplateValue::Scalar(other.clone()),
        })
    }

    /// Walk into maps and lists by path segments.
    pub fn get(&self, segments: &[String]) -> Option<Binding<'_>> {
        let Some((head, rest)) = segments.split_first() else {
            return Some(Binding::Template(self));
        };
        match self {
            TemplateValue::Map(map) => map.get(head)?.get(rest),
            TemplateValue::List(items) => items.get(head.parse::<usize>().ok()?)?.get(rest),
            TemplateValue::Scalar(value) => {
                walk_value(value, segments).map(|v| Binding::Value(Cow::Borrowed(v)))
            }
            TemplateValue::Text(_) => None,
        }
    }

    pub fn references(&self) -> Vec<&RefPath> {
        match self {
            TemplateValue::Text(t) => t.references().collect(),
            TemplateValue::List(items) => items.iter().flat_map(|i| i.references()).collect(),
            TemplateValue::Map(map) => map.values().flat_map(|v| v.references()).collect(),
            TemplateValue::Scalar(_) => Vec::new(),
        }
    }

    pub fn render(&self, scope: &dyn Lookup) -> Result<Value> {
        Renderer::new(scope).value(self)
    }
}

/// What a scope yields for a reference: a finished value, or a template still to render.
pub enum Binding<'a> {
    Value(Cow<'a, Value>),
    Template(&'a TemplateValue),
}

pub trait Lookup {
    fn lookup(&self, path: &RefPath) -> Option<Binding<'_>>;
}

impl Lookup for Map<String, Value> {
    fn lookup(&self, path: &RefPath) -> Option<Binding<'_>> {
        let (head, rest) = path.segments().split_first()?;
        walk_value(self.get(head)?, rest).map(|v| Binding::Value(Cow::Borrowed(v)))
    }
}

impl Lookup for IndexMap<String, TemplateValue> {
    fn lookup(&self, path: &RefPath) -> Option<Binding<'_>> {
        let (head, rest) = path.segments().split_first()?;
        self.get(head)?.get(rest)
    }
}

/// First-hit composition of several scopes, highest priority first.
#[derive(Default)]
pub struct Layered<'a> {
    layers: Vec<&'a dyn Lookup>,
}

impl<'a> Layered<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn with(mut self, layer: &'a dyn Lookup) -> Self {
        self.layers.push(layer);
        self
    }
}

impl Lookup for Layered<'_> {
    fn lookup(&self, path: &RefPath) -> Option<Binding<'_>> {
        self.layers.iter().find_map(|layer| layer.lookup(path))
    }
}

pub fn walk_value<'v>(value: &'v Value, segments: &[String]) -> Option<&'v Value> {
    segments.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Text form used when a value is interpolated into surrounding text.
/// Lists are treated as line fragments.
fn stringify(value: &Value, reference: &str) -> Result<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                scalar_text(item).ok_or_else(|| {
                    Error::template_invalid_value(reference, "contains a non-scalar list element")
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(|lines| lines.join("\n")),
        Value::Null => Err(Error::template_invalid_value(reference, "is null")),
        Value::Object(_) => Err(Error::template_invalid_value(
            reference,
            "is an object and cannot be interpolated",
        )),
        scalar => Ok(scalar_text(scalar).unwrap_or_default()),
    }
}

struct Renderer<'s> {
    scope: &'s dyn Lookup,
    chain: Vec<String>,
}

impl<'s> Renderer<'s> {
    fn new(scope: &'s dyn Lookup) -> Self {
        Self {
            scope,
            chain: Vec::new(),
        }
    }

    fn text(&mut self, template: &Template) -> Result<String> {
        let mut out = String::with_capacity(template.source.len());
        for node in &template.nodes {
            match node {
                Node::Literal(text) => out.push_str(text),
                Node::Reference(path) => {
                    let value = self.reference(path, template)?;
                    out.push_str(&stringify(&value, &path.to_string())?);
                }
            }
        }
        Ok(out)
    }

    fn text_value(&mut self, template: &Template) -> Result<Value> {
        if let Some(path) = template.single_reference() {
            return self.reference(path, template);
        }
        self.text(template).map(Value::String)
    }

    fn reference(&mut self, path: &RefPath, origin: &Template) -> Result<Value> {
        let key = path.to_string();
        if self.chain.contains(&key) {
            let mut chain = self.chain.clone();
            chain.push(key);
            return Err(Error::template_recursive(chain));
        }

        let scope: &'s dyn Lookup = self.scope;
        match scope.lookup(path) {
            None => Err(Error::template_unresolved(key, Some(origin.source.clone()))),
            Some(Binding::Value(value)) => Ok(value.into_owned()),
            Some(Binding::Template(nested)) => {
                self.chain.push(key);
                let rendered = self.value(nested);
                self.chain.pop();
                rendered
            }
        }
    }

    fn value(&mut self, value: &TemplateValue) -> Result<Value> {
        match value {
            TemplateValue::Text(template) => self.text_value(template),
            TemplateValue::List(items) => items
                .iter()
                .map(|item| self.value(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            TemplateValue::Map(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.value(item)?);
                }
                Ok(Value::Object(out))
            }
            TemplateValue::Scalar(value) => Ok(value.clone()),
        }
    }
}
