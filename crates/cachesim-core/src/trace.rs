//! Trace snapshots: recording and replaying a run's exact event stream.
//!
//! A [`TraceSnapshot`] holds every `(time, event)` pair a fresh run
//! processed, in order, together with the popularity mass function they
//! were drawn from. It is stored as one JSON document:
//!
//! ```json
//! {"version": 1,
//!  "popularity": [0.6, 0.4],
//!  "events": [{"time": 1.0, "receiver": 0, "content": 1, "log": true}]}
//! ```
//!
//! Snapshots are written to a unique temporary sibling and renamed into place,
//! so a reader sees either the previous snapshot or the complete new one.

use crate::popularity::{Popularity, PopularityError};
use crate::workload::TimedEvent;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse snapshot: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(serde_json::Error),
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("Malformed event record at index {index}: {source}")]
    MalformedEvent {
        index: usize,
        source: serde_json::Error,
    },
    #[error("Event at index {index} has invalid time {time}")]
    InvalidTime { index: usize, time: f64 },
    #[error("Event at index {index} is earlier than the event before it")]
    OutOfOrder { index: usize },
    #[error("Invalid popularity in snapshot: {0}")]
    Popularity(#[from] PopularityError),
}

/// One recorded event, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventRecord {
    time: f64,
    receiver: u32,
    content: u32,
    log: bool,
}

impl From<&TimedEvent> for EventRecord {
    fn from(e: &TimedEvent) -> Self {
        Self {
            time: e.time,
            receiver: e.event.receiver,
            content: e.event.content,
            log: e.event.log,
        }
    }
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    popularity: &'a [f64],
    events: Vec<EventRecord>,
}

/// On load, events stay as raw JSON so a bad record can be reported with
/// its position.
#[derive(Deserialize)]
struct SnapshotIn {
    version: u32,
    popularity: Vec<f64>,
    events: Vec<serde_json::Value>,
}

/// The recorded event stream of one run and the popularity it was drawn from.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSnapshot {
    pub popularity: Popularity,
    pub events: Vec<TimedEvent>,
}

impl TraceSnapshot {
    pub fn new(popularity: Popularity, events: Vec<TimedEvent>) -> Self {
        Self { popularity, events }
    }

    /// Serialize to the on-disk JSON form.
    pub fn to_json(&self) -> Result<String, TraceError> {
        let out = SnapshotOut {
            version: SNAPSHOT_VERSION,
            popularity: self.popularity.as_slice(),
            events: self.events.iter().map(EventRecord::from).collect(),
        };
        serde_json::to_string(&out).map_err(TraceError::Serialize)
    }

    /// Parse the on-disk JSON form, validating every event.
    pub fn from_json(s: &str) -> Result<Self, TraceError> {
        let raw: SnapshotIn = serde_json::from_str(s).map_err(TraceError::Parse)?;
        if raw.version != SNAPSHOT_VERSION {
            return Err(TraceError::UnsupportedVersion(raw.version));
        }
        let popularity = Popularity::new(raw.popularity)?;

        let mut events = Vec::with_capacity(raw.events.len());
        let mut last = f64::NEG_INFINITY;
        for (index, value) in raw.events.into_iter().enumerate() {
            let record: EventRecord = serde_json::from_value(value)
                .map_err(|source| TraceError::MalformedEvent { index, source })?;
            if !record.time.is_finite() || record.time < 0.0 {
                return Err(TraceError::InvalidTime {
                    index,
                    time: record.time,
                });
            }
            if record.time < last {
                return Err(TraceError::OutOfOrder { index });
            }
            last = record.time;
            events.push(TimedEvent::new(
                record.time,
                record.receiver,
                record.content,
                record.log,
            ));
        }
        Ok(Self { popularity, events })
    }

    /// Atomically write the snapshot to `path`.
    pub fn save(&self, path: &Path) -> Result<(), TraceError> {
        let json = self.to_json()?;
        write_atomic(path, json.as_bytes())
    }

    /// Read a snapshot from `path`.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let content = std::fs::read_to_string(path).map_err(|source| TraceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }
}

/// Accumulates the events of a fresh run in processing order.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    events: Vec<TimedEvent>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Append an event, unmodified.
    pub fn record(&mut self, event: TimedEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Close the recording into a snapshot.
    pub fn finalize(self, popularity: Popularity) -> TraceSnapshot {
        TraceSnapshot::new(popularity, self.events)
    }
}

/// Write `bytes` to a uniquely named temporary file next to `path`, flush it
/// to disk and rename it over `path`.
///
/// Concurrent writers to the same target each stage their own file, so the
/// last rename wins and no writer fails because of another.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TraceError> {
    let write_err = |source| TraceError::Write {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent).map_err(write_err)?;
            parent
        }
        None => Path::new("."),
    };

    // The temporary file is removed on drop if anything below fails.
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    {
        let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
        writer.write_all(bytes).map_err(write_err)?;
        writer.flush().map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
