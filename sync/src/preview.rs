//! Dry-run preview: the routed view of every sink with no AWS calls.
//! Values are masked unless `--print-values` was given, and source
//! collection failures are recorded against the sinks that subscribe to
//! them.

use crate::reporter::PrintFormat;
use crate::router::prefixed_name;
use config::{AppConfig, SourceSelector};
use serde::Serialize;
use sync_core::SecretItem;

const MASK: &str = "***";

#[derive(Debug, Serialize)]
pub struct SinkPreview {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub prefix: String,
    pub sources: Vec<String>,
    pub items: Vec<PreviewItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>
}

#[derive(Debug, Serialize)]
pub struct PreviewItem {
    pub name: String,
    pub value: String,
    pub description: String
}

pub fn build(
    cfg: &AppConfig,
    collected: &[(String, Vec<SecretItem>)],
    failures: &[(String, String)],
    print_values: bool
) -> Vec<SinkPreview> {
    cfg.sinks
        .iter()
        .map(|sink| {
            let subscribed: Vec<String> = match &sink.sources {
                SourceSelector::All => {
                    cfg.sources.iter().map(|s| s.name.clone()).collect()
                }
                SourceSelector::Named(names) => names.clone()
            };

            let mut items = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for source in &subscribed {
                let Some((_, collected_items)) =
                    collected.iter().find(|(name, _)| name == source)
                else {
                    continue;
                };
                for item in collected_items {
                    let full_name = prefixed_name(sink.kind.prefix(), &item.name);
                    if !seen.insert(full_name.clone()) {
                        continue;
                    }
                    items.push(PreviewItem {
                        name: full_name,
                        value: if print_values {
                            item.value.clone()
                        } else {
                            MASK.to_string()
                        },
                        description: item.description.clone().unwrap_or_default()
                    });
                }
            }

            let errors = failures
                .iter()
                .filter(|(source, _)| subscribed.contains(source))
                .map(|(source, error)| format!("source '{source}' failed: {error}"))
                .collect();

            SinkPreview {
                name: sink.name.clone(),
                type_name: sink.kind.type_name().to_string(),
                prefix: sink.kind.prefix().to_string(),
                sources: subscribed,
                items,
                errors
            }
        })
        .collect()
}

pub fn print(previews: &[SinkPreview], format: PrintFormat) {
    match format {
        PrintFormat::Json => match serde_json::to_string_pretty(previews) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize preview")
        },
        PrintFormat::List => {
            for preview in previews {
                print_header(preview);
                if preview.items.is_empty() {
                    println!("(no items)");
                } else {
                    for item in &preview.items {
                        println!("{}={}", item.name, item.value);
                    }
                }
                println!();
            }
        }
        PrintFormat::Table => {
            for preview in previews {
                print_header(preview);
                if preview.items.is_empty() {
                    println!("(no items)");
                } else {
                    let rows: Vec<[&str; 2]> = preview
                        .items
                        .iter()
                        .map(|i| [i.name.as_str(), i.value.as_str()])
                        .collect();
                    print_table(["Name", "Value"], &rows);
                }
                println!();
            }
        }
    }
}

fn print_header(preview: &SinkPreview) {
    let mut header = format!("--- Sink: {} [{}]", preview.name, preview.type_name);
    if !preview.prefix.is_empty() {
        header.push_str(&format!(" prefix='{}'", preview.prefix));
    }
    if !preview.sources.is_empty() {
        header.push_str(&format!(" sources={}", preview.sources.join(",")));
    }
    println!("{header}");
    for error in &preview.errors {
        println!("! {error}");
    }
}

fn print_table(headers: [&str; 2], rows: &[[&str; 2]]) {
    let mut widths = [headers[0].len(), headers[1].len()];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    println!(
        "{:<w0$} | {:<w1$}",
        headers[0],
        headers[1],
        w0 = widths[0],
        w1 = widths[1]
    );
    println!("{}-+-{}", "-".repeat(widths[0]), "-".repeat(widths[1]));
    for row in rows {
        println!("{:<w0$} | {:<w1$}", row[0], row[1], w0 = widths[0], w1 = widths[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::load_config_from_files;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(sink_yaml: &str) -> AppConfig {
        let dir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("cfg.yaml");
        std::fs::write(
            &path,
            format!("sources:\n  - name: app\n    type: env\n  - name: files\n    type: yaml\n    options:\n      files: [/tmp/x.yaml]\nsinks:\n{sink_yaml}")
        )
        .unwrap();
        load_config_from_files(&[path]).unwrap()
    }

    fn collected() -> Vec<(String, Vec<SecretItem>)> {
        vec![
            (
                "app".to_string(),
                vec![SecretItem::new("DB_URL", "postgres://x").with_description("primary db")]
            ),
            ("files".to_string(), vec![SecretItem::new("FLAG", "true")]),
        ]
    }

    #[test]
    fn test_preview_shape_matches_the_wire_format() {
        let cfg = config(
            "  - name: params\n    type: ssm\n    options:\n      prefix: /env/dev/\n    sources: [app]\n"
        );
        let previews = build(&cfg, &collected(), &[], true);
        let json = serde_json::to_value(&previews).unwrap();

        assert_eq!(
            json,
            serde_json::json!([
                {
                    "name": "params",
                    "type": "ssm",
                    "prefix": "/env/dev/",
                    "sources": ["app"],
                    "items": [
                        {
                            "name": "/env/dev/DB_URL",
                            "value": "postgres://x",
                            "description": "primary db"
                        }
                    ]
                }
            ])
        );
    }

    #[test]
    fn test_values_are_masked_without_print_values() {
        let cfg = config("  - name: params\n    type: ssm\n    sources: [app]\n");
        let previews = build(&cfg, &collected(), &[], false);
        assert_eq!(previews[0].items[0].value, "***");
    }

    #[test]
    fn test_all_selector_lists_every_source() {
        let cfg = config("  - name: params\n    type: ssm\n");
        let previews = build(&cfg, &collected(), &[], true);
        assert_eq!(previews[0].sources, vec!["app", "files"]);
        assert_eq!(previews[0].items.len(), 2);
    }

    #[test]
    fn test_source_failures_are_recorded_on_subscribed_sinks() {
        let cfg = config(
            "  - name: a\n    type: ssm\n    sources: [app]\n  - name: b\n    type: ssm\n    sources: [files]\n"
        );
        let failures = vec![("files".to_string(), "boom".to_string())];
        let previews = build(&cfg, &collected(), &failures, true);

        assert!(previews[0].errors.is_empty());
        assert_eq!(previews[1].errors.len(), 1);
        assert!(previews[1].errors[0].contains("files"));
    }
}
