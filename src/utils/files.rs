//! Source pattern expansion with glob support and `!` exclusions.

use std::path::{Path, PathBuf};

use glob_match::glob_match;

use crate::error::{Error, Result};

/// A matched source, with its path relative to the expansion base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub relative: String,
    pub path: PathBuf,
}

/// Expand patterns in order. Positive patterns add matches (deduplicated, first match wins),
/// `!pattern` removes anything already matched.
///
/// Literal paths that do not exist yield nothing; callers decide whether that is an error.
pub fn expand(patterns: &[String], base: &Path) -> Result<Vec<SourceFile>> {
    let mut matched: Vec<SourceFile> = Vec::new();

    for pattern in patterns {
        if let Some(exclude) = pattern.strip_prefix('!') {
            let exclude = normalize(exclude);
            matched.retain(|file| !glob_match(&exclude, &file.relative));
            continue;
        }

        for file in expand_one(pattern, base)? {
            if !matched.iter().any(|m| m.relative == file.relative) {
                matched.push(file);
            }
        }
    }

    Ok(matched)
}

/// Expand patterns for a step that has not run yet. Matched files are listed as
/// [`expand`] would; a positive pattern matching no file stands for itself, since an
/// earlier step in the same run may create it.
pub fn expand_planned(patterns: &[String], base: &Path) -> Result<Vec<String>> {
    let mut planned: Vec<String> = Vec::new();

    for pattern in patterns {
        if let Some(exclude) = pattern.strip_prefix('!') {
            let exclude = normalize(exclude);
            planned.retain(|p| !glob_match(&exclude, p));
            continue;
        }

        let mut found: Vec<String> = expand_one(pattern, base)?
            .into_iter()
            .filter(|f| f.path.is_file())
            .map(|f| f.relative)
            .collect();
        if found.is_empty() {
            found.push(normalize(pattern));
        }
        for file in found {
            if !planned.contains(&file) {
                planned.push(file);
            }
        }
    }

    Ok(planned)
}

fn expand_one(pattern: &str, base: &Path) -> Result<Vec<SourceFile>> {
    if !contains_glob_chars(pattern) {
        let path = base.join(pattern);
        if !path.exists() {
            return Ok(Vec::new());
        }
        return Ok(vec![SourceFile {
            relative: normalize(pattern),
            path,
        }]);
    }

    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!(
            "{}/{}",
            glob::Pattern::escape(&base.to_string_lossy()),
            pattern
        )
    };

    let entries = glob::glob(&full).map_err(|e| {
        Error::validation_invalid_argument(
            "src",
            format!("Invalid glob pattern '{}': {}", pattern, e),
            Some(pattern.to_string()),
            None,
        )
    })?;

    Ok(entries
        .filter_map(|entry| entry.ok())
        .map(|path| {
            let relative = path
                .strip_prefix(base)
                .map(|p| normalize(&p.to_string_lossy()))
                .unwrap_or_else(|_| normalize(&path.to_string_lossy()));
            SourceFile { relative, path }
        })
        .collect())
}

pub fn contains_glob_chars(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[') || s.contains(']')
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}
