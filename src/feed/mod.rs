//! Feed entry handling: parsing, date filtering, HTML cleanup and flattening.
//!
//! - [`parser`] - Decode RSS/Atom/RDF bytes with `feed-rs` and normalize each
//!   entry into a [`FeedValue`] tree
//! - [`filter`] - Select entries newer than a checkpoint boundary
//! - [`html`] - Convert HTML text fields to plain text in place
//! - [`flatten`] - Turn an entry tree into a flat dotted-path record
//!
//! # Example
//!
//! ```ignore
//! use siphon::feed::{flatten_sorted, parse_entries, select_entries};
//!
//! let entries = parse_entries(&bytes)?;
//! let selection = select_entries(entries, checkpoint.last_entry_date);
//! let records: Vec<_> = selection
//!     .selected
//!     .iter()
//!     .map(|e| flatten_sorted(e, ""))
//!     .collect();
//! ```

mod filter;
mod flatten;
mod html;
mod parser;
mod value;

pub use filter::{effective_timestamp, select_entries, Selection};
pub use flatten::{
    flatten, flatten_sorted, format_timestamp, FieldValue, FlattenedRecord, TIMESTAMP_FORMAT,
};
pub use html::{clean_entry, HtmlCleanupError, HtmlConverter, PlainTextConverter};
pub use parser::{parse_entries, ParseError};
pub use value::{FeedMap, FeedValue};
