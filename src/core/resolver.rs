//! Composite task resolution.
//!
//! Flattens a task reference into the ordered sequence of atomic steps it
//! denotes. Depth-first, order preserving, no deduplication: a step reached
//! twice runs twice.

use crate::error::{Error, Result};
use crate::registry::{AtomicTask, Entry, TaskRegistry};
use crate::suggest;

const SUGGESTION_LIMIT: usize = 3;

pub fn resolve<'r>(registry: &'r TaskRegistry, name: &str) -> Result<Vec<&'r AtomicTask>> {
    let mut sequence = Vec::new();
    let mut path = Vec::new();
    visit(registry, name, None, &mut path, &mut sequence)?;
    Ok(sequence)
}

/// Resolve every composite, returning the step count of each.
pub fn resolve_all(registry: &TaskRegistry) -> Result<Vec<(String, usize)>> {
    registry
        .composites()
        .map(|composite| {
            resolve(registry, &composite.name).map(|steps| (composite.name.clone(), steps.len()))
        })
        .collect()
}

fn visit<'r>(
    registry: &'r TaskRegistry,
    reference: &str,
    parent: Option<&str>,
    path: &mut Vec<String>,
    sequence: &mut Vec<&'r AtomicTask>,
) -> Result<()> {
    let entry = registry.get(reference).ok_or_else(|| {
        let suggestions =
            suggest::similar_names(reference, &registry.reference_names(), SUGGESTION_LIMIT);
        Error::task_unknown(reference, parent.map(str::to_string), suggestions)
    })?;

    match entry {
        Entry::Atomic(task) => sequence.push(task),
        Entry::Group(tasks) => sequence.extend(tasks),
        Entry::Composite(composite) => {
            if let Some(start) = path.iter().position(|p| p == &composite.name) {
                let mut cycle = path[start..].to_vec();
                cycle.push(composite.name.clone());
                return Err(Error::task_cyclic(cycle));
            }

            path.push(composite.name.clone());
            for child in &composite.refs {
                visit(registry, child, Some(&composite.name), path, sequence)?;
            }
            path.pop();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::registry::TaskKey;

    fn refs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn add(registry: &mut TaskRegistry, key: &str) {
        let key = TaskKey::parse(key).unwrap();
        let task = AtomicTask::new(key.clone(), key.group.clone());
        registry.register(&key.group, &key.target, task).unwrap();
    }

    fn keys(steps: &[&AtomicTask]) -> Vec<String> {
        steps.iter().map(|t| t.key.to_string()).collect()
    }

    fn build_registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for key in [
            "jshint:core",
            "jshint:grunt",
            "jscs:core",
            "jscs:grunt",
            "clean:dist",
            "less:compileCore",
            "autoprefixer:core",
            "usebanner:css",
            "csscomb:dist",
            "cssmin:minifyCore",
            "csslint:dist",
            "concat:core",
            "uglify:build",
        ] {
            add(&mut registry, key);
        }
        registry
            .register_composite(
                "validate-js",
                refs(&["jshint:core", "jshint:grunt", "jscs:core", "jscs:grunt"]),
            )
            .unwrap();
        registry
            .register_composite(
                "compile-less",
                refs(&[
                    "less:compileCore",
                    "autoprefixer:core",
                    "usebanner:css",
                    "csscomb:dist",
                    "cssmin:minifyCore",
                    "csslint:dist",
                ]),
            )
            .unwrap();
        registry
            .register_composite("compile-js", refs(&["concat", "uglify:build"]))
            .unwrap();
        registry
            .register_composite(
                "compile",
                refs(&["validate-js", "clean:dist", "compile-less", "compile-js"]),
            )
            .unwrap();
        registry
    }

    #[test]
    fn compile_flattens_in_declared_order() {
        let registry = build_registry();
        let steps = resolve(&registry, "compile").unwrap();

        assert_eq!(
            keys(&steps),
            vec![
                "jshint:core",
                "jshint:grunt",
                "jscs:core",
                "jscs:grunt",
                "clean:dist",
                "less:compileCore",
                "autoprefixer:core",
                "usebanner:css",
                "csscomb:dist",
                "cssmin:minifyCore",
                "csslint:dist",
                "concat:core",
                "uglify:build",
            ]
        );
    }

    #[test]
    fn length_is_sum_of_leaves_with_duplicates() {
        let mut registry = build_registry();
        registry
            .register_composite("twice", refs(&["compile-js", "compile-js", "clean:dist"]))
            .unwrap();

        let steps = resolve(&registry, "twice").unwrap();
        assert_eq!(steps.len(), 2 + 2 + 1);
    }

    #[test]
    fn atomic_and_group_references_resolve_directly() {
        let registry = build_registry();
        assert_eq!(keys(&resolve(&registry, "clean:dist").unwrap()), vec!["clean:dist"]);
        assert_eq!(
            keys(&resolve(&registry, "jscs").unwrap()),
            vec!["jscs:core", "jscs:grunt"]
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let registry = build_registry();
        let first = keys(&resolve(&registry, "compile").unwrap());
        for _ in 0..5 {
            assert_eq!(keys(&resolve(&registry, "compile").unwrap()), first);
        }
    }

    #[test]
    fn direct_cycle_is_detected() {
        let mut registry = TaskRegistry::new();
        registry.register_composite("a", refs(&["a"])).unwrap();

        let err = resolve(&registry, "a").unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskCyclic);
        assert_eq!(err.message, "Task cycle detected: a -> a");
    }

    #[test]
    fn transitive_cycle_is_detected() {
        let mut registry = TaskRegistry::new();
        add(&mut registry, "clean:dist");
        registry.register_composite("a", refs(&["clean:dist", "b"])).unwrap();
        registry.register_composite("b", refs(&["c"])).unwrap();
        registry.register_composite("c", refs(&["a"])).unwrap();

        let err = resolve(&registry, "a").unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskCyclic);
        assert_eq!(
            err.details["cycle"],
            serde_json::json!(["a", "b", "c", "a"])
        );
    }

    #[test]
    fn diamond_reuse_is_not_a_cycle() {
        let mut registry = TaskRegistry::new();
        add(&mut registry, "clean:dist");
        registry.register_composite("shared", refs(&["clean:dist"])).unwrap();
        registry.register_composite("left", refs(&["shared"])).unwrap();
        registry.register_composite("right", refs(&["shared"])).unwrap();
        registry.register_composite("top", refs(&["left", "right"])).unwrap();

        assert_eq!(resolve(&registry, "top").unwrap().len(), 2);
    }

    #[test]
    fn unknown_reference_names_key_and_parent() {
        let mut registry = build_registry();
        registry
            .register_composite("broken", refs(&["clean:dist", "uglify:bulid"]))
            .unwrap();

        let err = resolve(&registry, "broken").unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskUnknown);
        assert_eq!(err.details["key"], "uglify:bulid");
        assert_eq!(err.details["referencedBy"], "broken");
        assert_eq!(err.details["suggestions"], serde_json::json!(["uglify:build"]));
    }

    #[test]
    fn unknown_top_level_name_has_no_parent() {
        let registry = build_registry();
        let err = resolve(&registry, "deploy").unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskUnknown);
        assert!(err.details.get("referencedBy").is_none());
    }

    #[test]
    fn resolve_all_reports_step_counts() {
        let registry = build_registry();
        let counts = resolve_all(&registry).unwrap();
        assert_eq!(
            counts,
            vec![
                ("validate-js".to_string(), 4),
                ("compile-less".to_string(), 6),
                ("compile-js".to_string(), 2),
                ("compile".to_string(), 13),
            ]
        );
    }
}
