//! Override resolution for tagged stores. `tag_filters` is ordered lowest to
//! highest priority; for each title the record whose best tag has the
//! greatest index wins. Ties go to the last discovered record, with a
//! warning naming the title and the contested tag.

use sync_core::TaggedRecord;
use tracing::warn;

pub fn resolve_tag_overrides(
    records: Vec<TaggedRecord>,
    tag_filters: &[String]
) -> Vec<TaggedRecord> {
    struct Candidate {
        priority: i64,
        record: TaggedRecord,
        tied: bool
    }

    let mut order: Vec<String> = Vec::new();
    let mut best: Vec<(String, Candidate)> = Vec::new();

    for record in records {
        let priority = record_priority(&record, tag_filters);
        match best.iter_mut().find(|(title, _)| *title == record.title) {
            None => {
                order.push(record.title.clone());
                best.push((
                    record.title.clone(),
                    Candidate {
                        priority,
                        record,
                        tied: false
                    }
                ));
            }
            Some((_, current)) => {
                if priority > current.priority {
                    *current = Candidate {
                        priority,
                        record,
                        tied: false
                    };
                } else if priority == current.priority {
                    // Last discovered wins the tie.
                    current.record = record;
                    current.tied = true;
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|title| {
            let index = best.iter().position(|(t, _)| *t == title)?;
            let (_, candidate) = best.remove(index);
            if candidate.tied {
                let tag = usize::try_from(candidate.priority)
                    .ok()
                    .and_then(|i| tag_filters.get(i))
                    .map(String::as_str)
                    .unwrap_or("<untagged>");
                warn!(
                    title = %candidate.record.title,
                    tag,
                    "multiple records share the highest-priority tag; keeping the last discovered"
                );
            }
            Some(candidate.record)
        })
        .collect()
}

/// Greatest `tag_filters` index among the record's tags, or -1 when none
/// match (possible only when no tag filtering is configured).
fn record_priority(record: &TaggedRecord, tag_filters: &[String]) -> i64 {
    record
        .tags
        .iter()
        .filter_map(|tag| tag_filters.iter().position(|f| f == tag))
        .max()
        .map(|i| i as i64)
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, value: &str, tags: &[&str]) -> TaggedRecord {
        TaggedRecord {
            title: title.to_string(),
            value: value.to_string(),
            description: None,
            tags: tags.iter().map(|t| t.to_string()).collect()
        }
    }

    #[test]
    fn test_highest_priority_tag_wins() {
        let filters = vec!["default".to_string(), "prod".to_string()];
        let resolved = resolve_tag_overrides(
            vec![
                record("APP_DB_PASSWORD", "fallback", &["default"]),
                record("APP_DB_PASSWORD", "real", &["prod"]),
            ],
            &filters
        );
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].value, "real");
    }

    #[test]
    fn test_priority_order_is_filter_order_not_discovery_order() {
        let filters = vec!["default".to_string(), "prod".to_string()];
        let resolved = resolve_tag_overrides(
            vec![
                record("KEY", "winner", &["prod"]),
                record("KEY", "loser", &["default"]),
            ],
            &filters
        );
        assert_eq!(resolved[0].value, "winner");
    }

    #[test]
    fn test_tie_goes_to_last_discovered() {
        let filters = vec!["prod".to_string()];
        let resolved = resolve_tag_overrides(
            vec![
                record("KEY", "first", &["prod"]),
                record("KEY", "second", &["prod"]),
            ],
            &filters
        );
        assert_eq!(resolved[0].value, "second");
    }

    #[test]
    fn test_record_with_extra_tags_uses_best_match() {
        let filters = vec!["default".to_string(), "staging".to_string(), "prod".to_string()];
        let resolved = resolve_tag_overrides(
            vec![
                record("KEY", "staging", &["default", "staging"]),
                record("KEY", "prod", &["default", "prod"]),
            ],
            &filters
        );
        assert_eq!(resolved[0].value, "prod");
    }

    #[test]
    fn test_titles_keep_discovery_order() {
        let resolved = resolve_tag_overrides(
            vec![record("B", "1", &[]), record("A", "2", &[]), record("C", "3", &[])],
            &[]
        );
        let titles: Vec<_> = resolved.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_no_filters_last_duplicate_wins() {
        let resolved = resolve_tag_overrides(
            vec![record("K", "old", &[]), record("K", "new", &[])],
            &[]
        );
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].value, "new");
    }
}
