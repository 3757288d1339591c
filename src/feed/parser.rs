use chrono::{DateTime, SubsecRound, Utc};
use feed_rs::model::{Category, Content, Entry, Link, Person, Text};
use feed_rs::parser;
use thiserror::Error;

use super::value::{FeedMap, FeedValue};

/// Feed bytes could not be decoded as RSS, Atom, RDF or JSON Feed.
#[derive(Debug, Error)]
#[error("Parse error: {0}")]
pub struct ParseError(String);

/// Parse raw feed bytes into normalized entries, in feed order.
///
/// Field names follow the conventions most feed tooling uses (`title`,
/// `title_detail`, `updated_parsed`, `content`, `summary_detail`, ...), so
/// flattened records look the same regardless of the feed format.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<FeedValue>, ParseError> {
    let feed = parser::parse(bytes).map_err(|e| ParseError(e.to_string()))?;
    Ok(feed.entries.into_iter().map(normalize_entry).collect())
}

fn normalize_entry(entry: Entry) -> FeedValue {
    let mut map = FeedMap::new();

    if !entry.id.trim().is_empty() {
        map.insert("id", entry.id.trim());
    }

    if let Some(title) = entry.title {
        map.insert("title", title.content.clone());
        map.insert("title_detail", text_detail(title));
    }

    if let Some(first) = entry.links.first() {
        map.insert("link", first.href.clone());
    }
    if !entry.links.is_empty() {
        map.insert(
            "links",
            entry.links.into_iter().map(link).collect::<Vec<_>>(),
        );
    }

    if let Some(updated) = entry.updated.map(whole_seconds) {
        map.insert("updated", updated.to_rfc3339());
        map.insert("updated_parsed", updated);
    }
    if let Some(published) = entry.published.map(whole_seconds) {
        map.insert("published", published.to_rfc3339());
        map.insert("published_parsed", published);
    }

    if let Some(summary) = entry.summary {
        map.insert("summary", summary.content.clone());
        map.insert("summary_detail", text_detail(summary));
    }

    if let Some(content) = entry.content.and_then(content_detail) {
        map.insert("content", vec![content]);
    }

    if let Some(first) = entry.authors.first() {
        map.insert("author", first.name.clone());
    }
    if !entry.authors.is_empty() {
        map.insert(
            "authors",
            entry.authors.into_iter().map(person).collect::<Vec<_>>(),
        );
    }
    if !entry.contributors.is_empty() {
        map.insert(
            "contributors",
            entry
                .contributors
                .into_iter()
                .map(person)
                .collect::<Vec<_>>(),
        );
    }

    if !entry.categories.is_empty() {
        map.insert(
            "tags",
            entry
                .categories
                .into_iter()
                .map(category)
                .collect::<Vec<_>>(),
        );
    }

    map.insert_opt("rights", entry.rights.map(|r| r.content));
    map.insert_opt("language", entry.language);
    map.insert_opt("source", entry.source);

    FeedValue::Mapping(map)
}

/// Checkpoints persist whole epoch seconds; keeping fractions here would make
/// an entry compare greater than its own stored high-water-mark.
fn whole_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(0)
}

fn text_detail(text: Text) -> FeedValue {
    let mut map = FeedMap::new();
    map.insert("type", text.content_type.essence().to_string());
    map.insert("value", text.content);
    map.insert_opt("src", text.src);
    FeedValue::Mapping(map)
}

fn content_detail(content: Content) -> Option<FeedValue> {
    let body = content.body?;
    let mut map = FeedMap::new();
    map.insert("type", content.content_type.essence().to_string());
    map.insert("value", body);
    map.insert_opt("src", content.src.map(|l| l.href));
    map.insert_opt("length", content.length);
    Some(FeedValue::Mapping(map))
}

fn link(link: Link) -> FeedValue {
    let mut map = FeedMap::new();
    map.insert("href", link.href);
    map.insert_opt("rel", link.rel);
    map.insert_opt("type", link.media_type);
    map.insert_opt("hreflang", link.href_lang);
    map.insert_opt("title", link.title);
    map.insert_opt("length", link.length);
    FeedValue::Mapping(map)
}

fn person(person: Person) -> FeedValue {
    let mut map = FeedMap::new();
    map.insert("name", person.name);
    map.insert_opt("email", person.email);
    map.insert_opt("href", person.uri);
    FeedValue::Mapping(map)
}

fn category(category: Category) -> FeedValue {
    let mut map = FeedMap::new();
    map.insert("term", category.term);
    map.insert_opt("scheme", category.scheme);
    map.insert_opt("label", category.label);
    FeedValue::Mapping(map)
}
