//! Event output.
use std::io::Write;

use serde::Serialize;
use thiserror::Error;

use crate::config::StanzaConfig;
use crate::feed::FlattenedRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write event: {0}")]
    Io(#[from] std::io::Error),
}

/// One flattened entry plus the metadata it is indexed under.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Stanza name.
    pub source: String,
    pub sourcetype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub index: String,
    pub fields: FlattenedRecord,
}

impl Event {
    pub fn for_stanza(stanza: &StanzaConfig, fields: FlattenedRecord) -> Self {
        Self {
            source: stanza.name.clone(),
            sourcetype: stanza.sourcetype.clone(),
            host: stanza.host.clone(),
            index: stanza.index.clone(),
            fields,
        }
    }
}

pub trait EventSink: Send {
    fn emit(&mut self, event: &Event) -> Result<(), SinkError>;
}

/// Writes each event as one line of JSON.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &Event) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        // One write per event so concurrent writers to a shared stream never interleave mid-line
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<Event>,
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &Event) -> Result<(), SinkError> {
        self.events.push(event.clone());
        Ok(())
    }
}
