//! Common post-collection name filtering: include (regex or glob), exclude,
//! explicit keys, prefix stripping. Applied by the collector after an
//! adapter returns, in that order.

use crate::error::{SourceError, SourceResult};
use config::FilterOptions;
use regex::Regex;
use std::collections::HashSet;
use sync_core::SecretItem;

#[derive(Debug)]
pub struct ItemFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    keys: HashSet<String>,
    strip_prefix: Option<String>
}

impl ItemFilter {
    pub fn compile(options: &FilterOptions) -> SourceResult<Self> {
        let mut include = Vec::new();
        for glob in &options.include {
            include.push(compile_anchored(&glob_to_regex(glob), glob)?);
        }
        if let Some(pattern) = &options.include_regex {
            include.push(compile_anchored(pattern, pattern)?);
        }

        let exclude = options
            .exclude
            .iter()
            .map(|p| compile_anchored(p, p))
            .collect::<SourceResult<Vec<_>>>()?;

        Ok(Self {
            include,
            exclude,
            keys: options.keys.iter().cloned().collect(),
            strip_prefix: options.strip_prefix.clone()
        })
    }

    pub fn apply(&self, items: Vec<SecretItem>) -> Vec<SecretItem> {
        items
            .into_iter()
            .filter(|item| self.selects(&item.name))
            .map(|mut item| {
                if let Some(prefix) = &self.strip_prefix {
                    if let Some(stripped) = item.name.strip_prefix(prefix.as_str()) {
                        item.name = stripped.to_string();
                    }
                }
                item
            })
            .collect()
    }

    fn selects(&self, name: &str) -> bool {
        // Explicit keys are unioned back in regardless of the filters.
        if self.keys.contains(name) {
            return true;
        }
        if !self.include.is_empty() && !self.include.iter().any(|r| r.is_match(name)) {
            return false;
        }
        !self.exclude.iter().any(|r| r.is_match(name))
    }
}

fn compile_anchored(pattern: &str, original: &str) -> SourceResult<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| SourceError::InvalidPattern {
        pattern: original.to_string(),
        message: e.to_string()
    })
}

/// Translate a shell-style glob into an equivalent regex body.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if "\\.+()[]{}^$|".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c)
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<SecretItem> {
        names.iter().map(|n| SecretItem::new(*n, "v")).collect()
    }

    fn names(items: &[SecretItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_include_regex_exclude_and_strip() {
        let filter = ItemFilter::compile(&FilterOptions {
            include_regex: Some("^APP_.*".to_string()),
            exclude: vec!["^APP_DEBUG$".to_string()],
            strip_prefix: Some("APP_".to_string()),
            ..Default::default()
        })
        .unwrap();

        let out = filter.apply(items(&["APP_DB_URL", "APP_DEBUG", "UNRELATED"]));
        assert_eq!(names(&out), vec!["DB_URL"]);
    }

    #[test]
    fn test_include_globs_match_full_name() {
        let filter = ItemFilter::compile(&FilterOptions {
            include: vec!["DB_*".to_string()],
            ..Default::default()
        })
        .unwrap();

        let out = filter.apply(items(&["DB_HOST", "MY_DB_HOST", "OTHER"]));
        assert_eq!(names(&out), vec!["DB_HOST"]);
    }

    #[test]
    fn test_keys_union_bypasses_filters() {
        let filter = ItemFilter::compile(&FilterOptions {
            include_regex: Some("^APP_.*".to_string()),
            exclude: vec!["^APP_SECRET$".to_string()],
            keys: vec!["EXTRA".to_string(), "APP_SECRET".to_string()],
            ..Default::default()
        })
        .unwrap();

        let out = filter.apply(items(&["APP_DB", "APP_SECRET", "EXTRA", "OTHER"]));
        assert_eq!(names(&out), vec!["APP_DB", "APP_SECRET", "EXTRA"]);
    }

    #[test]
    fn test_no_filters_pass_everything() {
        let filter = ItemFilter::compile(&FilterOptions::default()).unwrap();
        let out = filter.apply(items(&["A", "B"]));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = ItemFilter::compile(&FilterOptions {
            include_regex: Some("(".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, SourceError::InvalidPattern { .. }));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        assert_eq!(glob_to_regex("a.b*"), "a\\.b.*");
        assert_eq!(glob_to_regex("x?y"), "x.y");
    }
}
