//! # Config Loading
//!
//! Reads an ordered list of YAML documents and produces a validated
//! [`AppConfig`]. Later documents override earlier ones under the merge
//! rules of [`crate::merge`]. Relative file paths inside `yaml` source
//! options are resolved against the document that first declared the source;
//! declaring documents are tracked through merges with a `declared_in`
//! annotation that is stripped once resolution is done.

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{deep_merge, scalar_to_string};
use crate::schema::{AppConfig, AwsConfig, SinkKind, SinkSpec, SourceKind, SourceSelector, SourceSpec};
use crate::template;
use serde_yaml::{Mapping, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const DECLARED_IN: &str = "declared_in";

struct ConfigDocument {
    path: PathBuf,
    value: Value
}

/// Load, merge, interpolate and validate the given config documents.
pub fn load_config_from_files<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<AppConfig> {
    if paths.is_empty() {
        return Err(ConfigError::NoConfigFiles);
    }

    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        docs.push(read_document(path.as_ref())?);
    }

    // First merge of the raw documents: establishes the variable map and the
    // declaring document of every source entry.
    let raw_merged = merge_documents(&docs);
    let vars = build_var_map(&raw_merged)?;

    // Interpolate each document separately so an unresolved placeholder can
    // name the file it came from, then merge again.
    let mut rendered = Vec::with_capacity(docs.len());
    for doc in &docs {
        let value = template_document(doc, &vars)?;
        rendered.push(ConfigDocument {
            path: doc.path.clone(),
            value
        });
    }
    let mut merged = merge_documents(&rendered);

    resolve_source_paths(&mut merged);
    ensure_no_placeholders(&merged)?;

    parse_app_config(merged, vars)
}

fn read_document(path: &Path) -> ConfigResult<ConfigDocument> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string()
    })?;
    let mut value = match value {
        Value::Null => Value::Mapping(Mapping::new()),
        other => other
    };
    normalize_source_key(&mut value);

    let path = path.canonicalize().map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source
    })?;
    debug!(path = %path.display(), "Loaded config document");
    Ok(ConfigDocument { path, value })
}

/// `secrets_sources:` is an accepted alias for `sources:`; when both appear
/// in one document the alias wins.
fn normalize_source_key(doc: &mut Value) {
    if let Some(map) = doc.as_mapping_mut() {
        if let Some(aliased) = map.remove("secrets_sources") {
            map.insert(Value::String("sources".to_string()), aliased);
        }
    }
}

fn merge_documents(docs: &[ConfigDocument]) -> Value {
    let mut merged = Value::Mapping(Mapping::new());
    for doc in docs {
        let mut incoming = doc.value.clone();
        annotate_new_sources(&mut incoming, &merged, &doc.path);
        merged = deep_merge(merged, incoming);
    }
    merged
}

/// Stamp `declared_in` on source entries whose name is not yet present in
/// the accumulated document. Entries merging onto an existing source keep
/// the original annotation.
fn annotate_new_sources(incoming: &mut Value, accumulated: &Value, path: &Path) {
    let existing: HashSet<String> = source_entries(accumulated)
        .iter()
        .filter_map(|e| entry_name(e))
        .collect();

    let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    if let Some(entries) = incoming
        .get_mut("sources")
        .and_then(Value::as_sequence_mut)
    {
        for entry in entries {
            let Some(name) = entry_name(entry) else { continue };
            if existing.contains(&name) {
                continue;
            }
            if let Some(map) = entry.as_mapping_mut() {
                map.insert(
                    Value::String(DECLARED_IN.to_string()),
                    Value::String(dir.display().to_string())
                );
            }
        }
    }
}

fn source_entries(doc: &Value) -> Vec<Value> {
    doc.get("sources")
        .and_then(Value::as_sequence)
        .cloned()
        .unwrap_or_default()
}

fn entry_name(entry: &Value) -> Option<String> {
    let name = entry
        .get("name")
        .or_else(|| entry.get("type"))
        .map(scalar_to_string)?;
    (!name.is_empty()).then_some(name)
}

/// Variable map: OS environment first, config `vars` override it. Variable
/// values themselves may reference other variables one level deep.
fn build_var_map(merged: &Value) -> ConfigResult<HashMap<String, String>> {
    let mut vars: HashMap<String, String> = std::env::vars().collect();

    if let Some(cfg_vars) = merged.get("vars") {
        let map = cfg_vars.as_mapping().ok_or_else(|| ConfigError::InvalidShape {
            message: "'vars' must be a mapping of key: value".to_string()
        })?;
        for (key, value) in map {
            let key = scalar_to_string(key);
            if key.is_empty() {
                return Err(ConfigError::InvalidShape {
                    message: "'vars' keys must be scalar".to_string()
                });
            }
            vars.insert(key, scalar_to_string(value));
        }
    }

    let snapshot = vars.clone();
    for value in vars.values_mut() {
        if value.contains("{{") {
            *value = template::interpolate_idents(value, &snapshot).map_err(|e| {
                ConfigError::UnresolvedVar {
                    name: e.var_name().unwrap_or_default().to_string(),
                    location: "config vars".to_string()
                }
            })?;
        }
    }
    Ok(vars)
}

fn template_document(
    doc: &ConfigDocument,
    vars: &HashMap<String, String>
) -> ConfigResult<Value> {
    interpolate_value(doc.value.clone(), vars).map_err(|e| ConfigError::UnresolvedVar {
        name: e.var_name().unwrap_or_default().to_string(),
        location: doc.path.display().to_string()
    })
}

fn interpolate_value(
    value: Value,
    vars: &HashMap<String, String>
) -> Result<Value, template::TemplateError> {
    match value {
        Value::String(s) => Ok(Value::String(template::interpolate_idents(&s, vars)?)),
        Value::Sequence(items) => Ok(Value::Sequence(
            items
                .into_iter()
                .map(|v| interpolate_value(v, vars))
                .collect::<Result<_, _>>()?
        )),
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, interpolate_value(v, vars)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other)
    }
}

/// Resolve relative `files` of yaml sources against the declaring document
/// and strip the `declared_in` annotation everywhere.
fn resolve_source_paths(merged: &mut Value) {
    let Some(entries) = merged.get_mut("sources").and_then(Value::as_sequence_mut) else {
        return;
    };

    for entry in entries {
        let Some(map) = entry.as_mapping_mut() else { continue };
        let declared_in = map
            .remove(DECLARED_IN)
            .map(|v| PathBuf::from(scalar_to_string(&v)));

        let is_yaml = map
            .get("type")
            .map(|t| scalar_to_string(t).eq_ignore_ascii_case("yaml"))
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }

        let Some(options) = map.get_mut("options").and_then(Value::as_mapping_mut) else {
            continue;
        };
        // Accept singular `file:` and fold it into `files:`.
        if !options.contains_key("files") {
            if let Some(single) = options.remove("file") {
                options.insert(
                    Value::String("files".to_string()),
                    Value::Sequence(vec![single])
                );
            }
        } else {
            options.remove("file");
        }

        if let Some(files) = options.get_mut("files").and_then(Value::as_sequence_mut) {
            for file in files {
                let Value::String(path) = file else { continue };
                let candidate = PathBuf::from(&*path);
                if candidate.is_absolute() {
                    continue;
                }
                if let Some(base) = &declared_in {
                    *file = Value::String(normalize_path(&base.join(candidate)).display().to_string());
                }
            }
        }
    }
}

/// Lexically normalize `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other)
        }
    }
    out
}

/// Templating totality: loading fails if any string still carries `{{`.
fn ensure_no_placeholders(value: &Value) -> ConfigResult<()> {
    match value {
        Value::String(s) if template::has_placeholder(s) => {
            Err(ConfigError::UnresolvedPlaceholder { snippet: s.clone() })
        }
        Value::Sequence(items) => items.iter().try_for_each(ensure_no_placeholders),
        Value::Mapping(map) => map.values().try_for_each(ensure_no_placeholders),
        _ => Ok(())
    }
}

fn parse_app_config(merged: Value, vars: HashMap<String, String>) -> ConfigResult<AppConfig> {
    let aws = parse_aws(merged.get("aws"));

    let mut sources = Vec::new();
    let mut seen = HashSet::new();
    for entry in merged
        .get("sources")
        .and_then(Value::as_sequence)
        .cloned()
        .unwrap_or_default()
    {
        let Some(map) = entry.as_mapping() else {
            return Err(ConfigError::InvalidShape {
                message: "each source must be a mapping".to_string()
            });
        };
        let type_ = map
            .get("type")
            .map(scalar_to_string)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::InvalidShape {
                message: "source entry is missing 'type'".to_string()
            })?;
        let name = map
            .get("name")
            .map(scalar_to_string)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| type_.clone());
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateSource { name });
        }
        let options = map.get("options").cloned().unwrap_or(Value::Null);
        let kind = SourceKind::parse(&type_, &name, options)?;
        sources.push(SourceSpec { name, kind });
    }

    let source_names: HashSet<&str> = sources.iter().map(|s| s.name.as_str()).collect();

    let mut sinks = Vec::new();
    for entry in merged
        .get("sinks")
        .and_then(Value::as_sequence)
        .cloned()
        .unwrap_or_default()
    {
        let Some(map) = entry.as_mapping() else {
            return Err(ConfigError::InvalidShape {
                message: "each sink must be a mapping".to_string()
            });
        };
        let type_ = map
            .get("type")
            .map(scalar_to_string)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::InvalidShape {
                message: "sink entry is missing 'type'".to_string()
            })?;
        let name = map
            .get("name")
            .map(scalar_to_string)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| type_.clone());

        let selector = parse_selector(map.get("sources"), &name, &source_names)?;
        let options = map.get("options").cloned().unwrap_or(Value::Null);
        let kind = SinkKind::parse(&type_, &name, options)?;
        sinks.push(SinkSpec {
            name,
            kind,
            sources: selector
        });
    }

    Ok(AppConfig {
        vars,
        aws,
        sources,
        sinks
    })
}

fn parse_selector(
    value: Option<&Value>,
    sink: &str,
    source_names: &HashSet<&str>
) -> ConfigResult<SourceSelector> {
    let refs: Vec<String> = match value {
        None | Some(Value::Null) => return Ok(SourceSelector::All),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Sequence(items)) => items.iter().map(scalar_to_string).collect(),
        Some(other) => {
            return Err(ConfigError::InvalidShape {
                message: format!("sink '{sink}' has an invalid 'sources' value: {other:?}")
            });
        }
    };

    if refs.iter().any(|r| r == "*") {
        return Ok(SourceSelector::All);
    }
    for reference in &refs {
        if !source_names.contains(reference.as_str()) {
            return Err(ConfigError::UnknownSourceRef {
                sink: sink.to_string(),
                source_name: reference.clone()
            });
        }
    }
    Ok(SourceSelector::Named(refs))
}

fn parse_aws(value: Option<&Value>) -> AwsConfig {
    let get = |key: &str| {
        value
            .and_then(|v| v.get(key))
            .map(scalar_to_string)
            .filter(|s| !s.is_empty())
    };
    AwsConfig {
        region: get("region")
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .or_else(|| std::env::var("AWS_REGION").ok())
            .filter(|s| !s.is_empty()),
        profile: get("profile")
            .or_else(|| std::env::var("AWS_PROFILE").ok())
            .filter(|s| !s.is_empty())
    }
}
