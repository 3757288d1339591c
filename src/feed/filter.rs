use chrono::{DateTime, Utc};

use super::value::FeedValue;

/// Outcome of filtering one fetch against a checkpoint boundary.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Entries newer than the boundary (plus undated ones), in feed order.
    pub selected: Vec<FeedValue>,
    /// Newest timestamp seen in the whole fetch, selected or not.
    pub latest: Option<DateTime<Utc>>,
}

/// The timestamp an entry is ordered by: `updated_parsed`, falling back to
/// `published_parsed`.
pub fn effective_timestamp(entry: &FeedValue) -> Option<DateTime<Utc>> {
    entry
        .get("updated_parsed")
        .and_then(FeedValue::as_timestamp)
        .or_else(|| entry.get("published_parsed").and_then(FeedValue::as_timestamp))
}

/// Keep entries strictly newer than `boundary`.
///
/// Undated entries are always kept and never move `latest`. With no boundary
/// every entry is kept.
pub fn select_entries(entries: Vec<FeedValue>, boundary: Option<DateTime<Utc>>) -> Selection {
    let mut selection = Selection::default();

    for entry in entries {
        let Some(ts) = effective_timestamp(&entry) else {
            selection.selected.push(entry);
            continue;
        };

        if selection.latest.map_or(true, |latest| ts > latest) {
            selection.latest = Some(ts);
        }

        match boundary {
            Some(b) if ts <= b => {
                tracing::debug!(
                    date = %ts,
                    boundary = %b,
                    title = entry.get("title").and_then(FeedValue::as_str).unwrap_or(""),
                    "Skipping entry not later than checkpoint"
                );
            }
            _ => selection.selected.push(entry),
        }
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::value::FeedMap;
    use chrono::{Duration, TimeZone};

    fn entry(title: &str, updated: Option<DateTime<Utc>>, published: Option<DateTime<Utc>>) -> FeedValue {
        let mut map = FeedMap::new();
        map.insert("title", title);
        map.insert_opt("updated_parsed", updated);
        map.insert_opt("published_parsed", published);
        FeedValue::Mapping(map)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 2, 9, hour, 0, 0).unwrap()
    }

    fn titles(selection: &Selection) -> Vec<&str> {
        selection
            .selected
            .iter()
            .map(|e| e.get("title").and_then(FeedValue::as_str).unwrap())
            .collect()
    }

    #[test]
    fn test_updated_takes_precedence_over_published() {
        let e = entry("a", Some(at(5)), Some(at(1)));
        assert_eq!(effective_timestamp(&e), Some(at(5)));
    }

    #[test]
    fn test_published_used_when_no_updated() {
        let e = entry("a", None, Some(at(1)));
        assert_eq!(effective_timestamp(&e), Some(at(1)));
    }

    #[test]
    fn test_no_boundary_selects_everything() {
        let entries = vec![entry("a", Some(at(1)), None), entry("b", Some(at(3)), None)];

        let selection = select_entries(entries, None);
        assert_eq!(titles(&selection), vec!["a", "b"]);
        assert_eq!(selection.latest, Some(at(3)));
    }

    #[test]
    fn test_boundary_equal_to_latest_selects_nothing() {
        let entries = vec![entry("a", Some(at(1)), None), entry("b", Some(at(3)), None)];

        let selection = select_entries(entries, Some(at(3)));
        assert!(selection.selected.is_empty());
        assert_eq!(selection.latest, Some(at(3)));
    }

    #[test]
    fn test_boundary_one_second_before_latest_selects_latest() {
        let entries = vec![entry("a", Some(at(1)), None), entry("b", Some(at(3)), None)];

        let selection = select_entries(entries, Some(at(3) - Duration::seconds(1)));
        assert_eq!(titles(&selection), vec!["b"]);
    }

    #[test]
    fn test_undated_always_selected_and_ignored_for_latest() {
        let entries = vec![entry("undated", None, None), entry("old", Some(at(1)), None)];

        let selection = select_entries(entries, Some(at(2)));
        assert_eq!(titles(&selection), vec!["undated"]);
        assert_eq!(selection.latest, Some(at(1)));
    }

    #[test]
    fn test_selected_keep_feed_order_not_date_order() {
        let entries = vec![
            entry("newest", Some(at(9)), None),
            entry("oldest", Some(at(2)), None),
            entry("middle", Some(at(5)), None),
        ];

        let selection = select_entries(entries, Some(at(1)));
        assert_eq!(titles(&selection), vec!["newest", "oldest", "middle"]);
        assert_eq!(selection.latest, Some(at(9)));
    }

    #[test]
    fn test_only_undated_entries_has_no_latest() {
        let selection = select_entries(vec![entry("x", None, None)], None);
        assert_eq!(selection.selected.len(), 1);
        assert_eq!(selection.latest, None);
    }
}
