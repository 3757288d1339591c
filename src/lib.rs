//! Incremental syndication feed importer.
//!
//! Each configured stanza names a feed. A poll fetches it (through a proxy
//! and Basic/Digest authentication when configured), keeps only entries
//! newer than the stanza's checkpoint, flattens each into a dotted-key
//! record and hands it to an [`sink::EventSink`], then advances the
//! checkpoint on a drift-free schedule.

pub mod checkpoint;
pub mod config;
pub mod feed;
pub mod http;
pub mod poll;
pub mod sink;
pub mod util;
