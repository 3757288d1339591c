//! Per-stanza checkpoints: when a stanza last ran and the newest entry date
//! it has seen.
//!
//! A checkpoint is stored as JSON bytes keyed by stanza name. Storage is
//! pluggable through [`CheckpointStore`]; [`SqliteCheckpointStore`] keeps all
//! stanzas in one database and [`FileCheckpointStore`] keeps one file per
//! stanza.

mod file;
mod schedule;
mod sqlite;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub use file::FileCheckpointStore;
pub use schedule::{compute_next_checkpoint, interval_elapsed, is_due, non_deviated_last_run};
pub use sqlite::SqliteCheckpointStore;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Checkpoint file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid checkpoint data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Checkpoint access timed out after {0:?}")]
    Timeout(Duration),
}

/// Bound applied to checkpoint reads and writes when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one store operation, failing with [`CheckpointError::Timeout`] if it
/// takes longer than `timeout`.
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: F) -> Result<T, CheckpointError>
where
    F: Future<Output = Result<T, CheckpointError>>,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| CheckpointError::Timeout(timeout))?
}

/// The persisted state of one stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(with = "epoch_seconds")]
    pub last_run: DateTime<Utc>,

    #[serde(
        default,
        with = "epoch_seconds_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_entry_date: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Keyed storage for opaque checkpoint bytes.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn read(&self, stanza: &str) -> Result<Option<Vec<u8>>, CheckpointError>;

    /// Replace the stored bytes for `stanza`. A reader never observes a
    /// partially written value.
    async fn write(&self, stanza: &str, bytes: &[u8]) -> Result<(), CheckpointError>;
}

/// Read and decode the checkpoint for `stanza`, if one exists.
pub async fn load_checkpoint(
    store: &dyn CheckpointStore,
    stanza: &str,
) -> Result<Option<Checkpoint>, CheckpointError> {
    match store.read(stanza).await? {
        Some(bytes) => Ok(Some(Checkpoint::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Like [`load_checkpoint`], but an unreadable or undecodable checkpoint is
/// logged and treated as absent.
pub async fn load_checkpoint_lenient(store: &dyn CheckpointStore, stanza: &str) -> Option<Checkpoint> {
    match load_checkpoint(store, stanza).await {
        Ok(checkpoint) => checkpoint,
        Err(e) => {
            tracing::warn!(stanza = %stanza, error = %e, "Unreadable checkpoint, treating as first run");
            None
        }
    }
}

pub async fn save_checkpoint(
    store: &dyn CheckpointStore,
    stanza: &str,
    checkpoint: &Checkpoint,
) -> Result<(), CheckpointError> {
    store.write(stanza, &checkpoint.to_bytes()?).await
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSeconds {
    Int(i64),
    Float(f64),
}

impl RawSeconds {
    fn into_datetime<E: serde::de::Error>(self) -> Result<DateTime<Utc>, E> {
        let secs = match self {
            RawSeconds::Int(secs) => Some(secs),
            RawSeconds::Float(secs) if secs.is_finite() => Some(secs.trunc() as i64),
            RawSeconds::Float(_) => None,
        };
        secs.and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| E::custom("epoch seconds out of range"))
    }
}

mod epoch_seconds {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        RawSeconds::deserialize(deserializer)?.into_datetime()
    }
}

mod epoch_seconds_opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_some(&ts.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<RawSeconds>::deserialize(deserializer)?
            .map(RawSeconds::into_datetime)
            .transpose()
    }
}
