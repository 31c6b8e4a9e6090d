//! Event delivery boundary.
//!
//! The aggregator only sees `EventSource`: an ordered (oldest-first)
//! event stream per named source, optionally bounded by a time window,
//! plus per-post endorser enumeration. The chat-platform client lives
//! behind this trait; `JsonlEventSource` is the file-backed
//! implementation the CLI wires in.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::models::{Event, TimeWindow};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("permission denied reading source {source_id}")]
    Forbidden { source_id: String },

    #[error("source {source_id} not found")]
    NotFound { source_id: String },

    #[error("failed to read source {source_id}")]
    Io {
        source_id: String,
        #[source]
        source: io::Error,
    },
}

#[async_trait]
pub trait EventSource {
    /// Events for one source, oldest first, bounded by `window`.
    async fn fetch_events(
        &self,
        source_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<Event>, SourceError>;

    /// Granter labels behind one endorsed post.
    async fn fetch_endorsers(
        &self,
        source_id: &str,
        message_id: u64,
    ) -> Result<Vec<String>, SourceError>;
}

/// File-backed source: one `<source_id>.jsonl` per source under a
/// directory, one serde-tagged event per line, plus an optional
/// `<source_id>.endorsers.json` sidecar mapping message ids to granter
/// labels.
pub struct JsonlEventSource {
    dir: PathBuf,
}

impl JsonlEventSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn map_io(source_id: &str, err: io::Error) -> SourceError {
        match err.kind() {
            io::ErrorKind::PermissionDenied => SourceError::Forbidden {
                source_id: source_id.to_string(),
            },
            io::ErrorKind::NotFound => SourceError::NotFound {
                source_id: source_id.to_string(),
            },
            _ => SourceError::Io {
                source_id: source_id.to_string(),
                source: err,
            },
        }
    }
}

#[async_trait]
impl EventSource for JsonlEventSource {
    async fn fetch_events(
        &self,
        source_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<Event>, SourceError> {
        let path = self.dir.join(format!("{source_id}.jsonl"));
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| Self::map_io(source_id, err))?;

        let mut events = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => {
                    if window.contains(event.timestamp()) {
                        events.push(event);
                    }
                }
                Err(err) => {
                    warn!(source_id, line = number + 1, %err, "skipping malformed event record");
                }
            }
        }

        // Oldest first; the stable sort keeps file order for ties.
        events.sort_by_key(Event::timestamp);
        Ok(events)
    }

    async fn fetch_endorsers(
        &self,
        source_id: &str,
        message_id: u64,
    ) -> Result<Vec<String>, SourceError> {
        let path = self.dir.join(format!("{source_id}.endorsers.json"));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Self::map_io(source_id, err)),
        };

        let sidecar: HashMap<String, Vec<String>> = match serde_json::from_str(&raw) {
            Ok(sidecar) => sidecar,
            Err(err) => {
                warn!(source_id, %err, "skipping malformed endorser sidecar");
                return Ok(Vec::new());
            }
        };

        Ok(sidecar
            .get(&message_id.to_string())
            .cloned()
            .unwrap_or_default())
    }
}
