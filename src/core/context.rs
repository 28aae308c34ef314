//! Run-scoped store of values produced by executed steps.

use std::borrow::Cow;
use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::registry::TaskKey;
use crate::template::{walk_value, Binding, Lookup, RefPath};
use crate::tools::ProducedOutputs;

/// Values produced so far in one run, addressed as `group.target.key`.
///
/// Entries are only ever added; a later step with the same key overwrites its own
/// earlier values. The context lives exactly as long as its run.
#[derive(Debug, Default, Clone)]
pub struct ExecutionContext {
    values: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &TaskKey, outputs: ProducedOutputs) {
        if outputs.is_empty() {
            return;
        }
        let group = self
            .values
            .entry(key.group.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(targets) = group else {
            return;
        };
        let target = targets
            .entry(key.target.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(slot) = target {
            slot.extend(outputs);
        }
    }

    pub fn get(&self, key: &TaskKey, name: &str) -> Option<&Value> {
        self.values.get(&key.group)?.get(&key.target)?.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

impl Lookup for ExecutionContext {
    fn lookup(&self, path: &RefPath) -> Option<Binding<'_>> {
        let (head, rest) = path.segments().split_first()?;
        walk_value(self.values.get(head)?, rest).map(|v| Binding::Value(Cow::Borrowed(v)))
    }
}

/// Stand-in for outputs that earlier steps will produce, used while checking a
/// sequence before anything runs. Resolves declared output paths to a placeholder.
#[derive(Debug, Default)]
pub struct PendingOutputs {
    declared: HashSet<(String, String, String)>,
}

impl PendingOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, key: &TaskKey, outputs: &[String]) {
        for name in outputs {
            self.declared
                .insert((key.group.clone(), key.target.clone(), name.clone()));
        }
    }

    pub fn placeholder(group: &str, target: &str, name: &str) -> String {
        format!("<pending {}.{}.{}>", group, target, name)
    }
}

impl Lookup for PendingOutputs {
    fn lookup(&self, path: &RefPath) -> Option<Binding<'_>> {
        let [group, target, name, ..] = path.segments() else {
            return None;
        };
        let entry = (group.clone(), target.clone(), name.clone());
        if !self.declared.contains(&entry) {
            return None;
        }
        Some(Binding::Value(Cow::Owned(Value::String(Self::placeholder(
            group, target, name,
        )))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;
    use serde_json::json;

    fn outputs(value: Value) -> ProducedOutputs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn produced_values_are_addressable_by_path() {
        let mut ctx = ExecutionContext::new();
        let key = TaskKey::new("concat", "core");
        ctx.insert(&key, outputs(json!({ "dest": "dist/public/fei.js" })));

        assert_eq!(ctx.get(&key, "dest"), Some(&json!("dist/public/fei.js")));
        let t = Template::parse("<%= concat.core.dest %>").unwrap();
        assert_eq!(t.render(&ctx).unwrap(), "dist/public/fei.js");
    }

    #[test]
    fn inserts_merge_and_overwrite_per_key() {
        let mut ctx = ExecutionContext::new();
        let key = TaskKey::new("exec", "version");
        ctx.insert(&key, outputs(json!({ "stdout": "1", "exitCode": 0 })));
        ctx.insert(&key, outputs(json!({ "stdout": "2" })));
        ctx.insert(&TaskKey::new("exec", "other"), outputs(json!({ "stdout": "x" })));

        assert_eq!(
            ctx.as_value(),
            json!({ "exec": { "version": { "stdout": "2", "exitCode": 0 }, "other": { "stdout": "x" } } })
        );
    }

    #[test]
    fn empty_outputs_leave_context_untouched() {
        let mut ctx = ExecutionContext::new();
        ctx.insert(&TaskKey::new("clean", "dist"), ProducedOutputs::new());
        assert!(ctx.is_empty());
    }

    #[test]
    fn pending_outputs_resolve_to_placeholders() {
        let mut pending = PendingOutputs::new();
        pending.declare(&TaskKey::new("exec", "hash"), &["stdout".to_string()]);

        let t = Template::parse("dist/<%= exec.hash.stdout %>.js").unwrap();
        assert_eq!(
            t.render(&pending).unwrap(),
            "dist/<pending exec.hash.stdout>.js"
        );

        let undeclared = Template::parse("<%= exec.hash.stderr %>").unwrap();
        assert!(undeclared.render(&pending).is_err());
    }
}
