//! Fan items out to the sinks subscribed to their sources. Within one sink,
//! the first source in its declaration list wins name conflicts; the loser
//! is dropped with a warning. Items no sink subscribes to are simply left
//! behind.

use config::{SinkSpec, SourceSelector};
use std::collections::HashMap;
use sync_core::{DispatchItem, SecretItem};
use tracing::warn;

/// Join the sink prefix and the item name. A trailing `/` on the prefix is
/// collapsed so both `/env/dev` and `/env/dev/` yield `/env/dev/NAME`.
pub fn prefixed_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", prefix.trim_end_matches('/'), name)
}

/// Dispatch batches aligned with the sink declaration order.
pub fn route(
    collected: &[(String, Vec<SecretItem>)],
    sinks: &[SinkSpec]
) -> Vec<Vec<DispatchItem>> {
    sinks
        .iter()
        .map(|sink| {
            let subscribed: Vec<&str> = match &sink.sources {
                SourceSelector::All => collected.iter().map(|(name, _)| name.as_str()).collect(),
                SourceSelector::Named(names) => names.iter().map(String::as_str).collect()
            };

            let prefix = sink.kind.prefix();
            let mut batch: Vec<DispatchItem> = Vec::new();
            let mut claimed: HashMap<String, String> = HashMap::new();

            for source_name in subscribed {
                let Some((_, items)) = collected.iter().find(|(name, _)| name == source_name)
                else {
                    continue;
                };
                for item in items {
                    let full_name = prefixed_name(prefix, &item.name);
                    if let Some(winner) = claimed.get(&full_name) {
                        warn!(
                            sink = %sink.name,
                            full_name = %full_name,
                            kept = %winner,
                            dropped = %source_name,
                            "duplicate item routed to sink; earlier source wins"
                        );
                        continue;
                    }
                    claimed.insert(full_name.clone(), source_name.to_string());
                    batch.push(DispatchItem {
                        full_name,
                        value: item.value.clone(),
                        description: item.description.clone(),
                        source_name: source_name.to_string()
                    });
                }
            }
            batch
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{SinkKind, SinkSpec};

    fn ssm_sink(name: &str, prefix: &str, sources: SourceSelector) -> SinkSpec {
        let options = format!("prefix: '{prefix}'");
        SinkSpec {
            name: name.to_string(),
            kind: SinkKind::parse("ssm", name, serde_yaml::from_str(&options).unwrap()).unwrap(),
            sources
        }
    }

    fn collected(pairs: &[(&str, &[(&str, &str)])]) -> Vec<(String, Vec<SecretItem>)> {
        pairs
            .iter()
            .map(|(source, items)| {
                (
                    source.to_string(),
                    items
                        .iter()
                        .map(|(name, value)| SecretItem::new(*name, *value))
                        .collect()
                )
            })
            .collect()
    }

    #[test]
    fn test_prefix_trailing_slash_is_collapsed() {
        assert_eq!(prefixed_name("/env/dev/", "X"), "/env/dev/X");
        assert_eq!(prefixed_name("/env/dev", "X"), "/env/dev/X");
        assert_eq!(prefixed_name("", "X"), "X");
    }

    #[test]
    fn test_earlier_source_wins_conflicts() {
        let collected = collected(&[
            ("A", &[("DB_HOST", "from-a")]),
            ("B", &[("DB_HOST", "from-b"), ("OTHER", "o")]),
        ]);
        let sinks = vec![ssm_sink(
            "params",
            "/p/",
            SourceSelector::Named(vec!["A".to_string(), "B".to_string()])
        )];

        let batches = route(&collected, &sinks);
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 2);

        let db = batch.iter().find(|i| i.full_name == "/p/DB_HOST").unwrap();
        assert_eq!(db.value, "from-a");
        assert_eq!(db.source_name, "A");
    }

    #[test]
    fn test_all_selector_takes_every_source_in_order() {
        let collected = collected(&[("A", &[("X", "1")]), ("B", &[("Y", "2")])]);
        let sinks = vec![ssm_sink("params", "", SourceSelector::All)];

        let batch = &route(&collected, &sinks)[0];
        let names: Vec<_> = batch.iter().map(|i| i.full_name.as_str()).collect();
        assert_eq!(names, vec!["X", "Y"]);
    }

    #[test]
    fn test_sink_source_order_beats_collection_order() {
        let collected = collected(&[("A", &[("X", "a")]), ("B", &[("X", "b")])]);
        let sinks = vec![ssm_sink(
            "params",
            "",
            SourceSelector::Named(vec!["B".to_string(), "A".to_string()])
        )];

        let batch = &route(&collected, &sinks)[0];
        assert_eq!(batch[0].value, "b");
        assert_eq!(batch[0].source_name, "B");
    }

    #[test]
    fn test_unrouted_sources_are_not_an_error() {
        let collected = collected(&[("A", &[("X", "1")]), ("ORPHAN", &[("Z", "9")])]);
        let sinks = vec![ssm_sink(
            "params",
            "",
            SourceSelector::Named(vec!["A".to_string()])
        )];

        let batches = route(&collected, &sinks);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].full_name, "X");
    }

    #[test]
    fn test_each_sink_gets_its_own_batch() {
        let collected = collected(&[("A", &[("X", "1")])]);
        let sinks = vec![
            ssm_sink("one", "/1/", SourceSelector::All),
            ssm_sink("two", "/2/", SourceSelector::All),
        ];

        let batches = route(&collected, &sinks);
        assert_eq!(batches[0][0].full_name, "/1/X");
        assert_eq!(batches[1][0].full_name, "/2/X");
    }
}
