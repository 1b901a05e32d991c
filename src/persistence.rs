use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::{error::CounterError, systems::counters::Counts};

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// End-of-stream summary of one counting run. Never modified after creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: String,
    pub user: String,
    pub source_name: String,
    pub in_count: u64,
    pub out_count: u64,
    pub frames_processed: u64,
    pub dropped_detections: u64,
    pub tracks_seen: usize,
    /// True if a stop request or a source failure ended the run early.
    /// Reaching the configured frame limit is a normal finish.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunResult {
    pub fn counts(&self) -> Counts {
        Counts {
            in_count: self.in_count,
            out_count: self.out_count,
        }
    }
}

/// Unique per process and per start time, so re-saving the same result is harmless
pub fn new_run_id(started_at: &DateTime<Utc>) -> String {
    let sequence = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}",
        started_at.format("%Y%m%dT%H%M%S%.3fZ"),
        std::process::id(),
        sequence
    )
}

/// Somewhere to keep finished runs, keyed by run id.
pub trait RunStore {
    /// Store a result. Saving a run id that is already present is a no-op.
    fn save(&mut self, result: &RunResult) -> io::Result<()>;

    /// All stored results in insertion order, optionally only those for one user
    fn list(&self, user: Option<&str>) -> io::Result<Vec<RunResult>>;
}

/// Hand a finished run to the store, wrapping any failure so the caller can retry
pub fn persist(store: &mut dyn RunStore, result: &RunResult) -> Result<(), CounterError> {
    match store.save(result) {
        Ok(()) => {
            info!(
                "Saved run {} ({}): IN {} | OUT {}",
                result.run_id, result.source_name, result.in_count, result.out_count
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to save run {}: {}", result.run_id, e);
            Err(CounterError::PersistenceFailure {
                result: Box::new(result.clone()),
                source: e,
            })
        }
    }
}

/// Appends one JSON record per run to a file.
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: &Path) -> Self {
        JsonLinesStore {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> io::Result<Vec<RunResult>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<RunResult>(l).map_err(io::Error::from))
            .collect()
    }
}

impl RunStore for JsonLinesStore {
    fn save(&mut self, result: &RunResult) -> io::Result<()> {
        if self.read_all()?.iter().any(|r| r.run_id == result.run_id) {
            debug!("Run {} already stored in {:?}", result.run_id, self.path);
            return Ok(());
        }
        let line = serde_json::to_string(result)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn list(&self, user: Option<&str>) -> io::Result<Vec<RunResult>> {
        let mut results = self.read_all()?;
        if let Some(user) = user {
            results.retain(|r| r.user == user);
        }
        Ok(results)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    results: IndexMap<String, RunResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl RunStore for MemoryStore {
    fn save(&mut self, result: &RunResult) -> io::Result<()> {
        self.results
            .entry(result.run_id.clone())
            .or_insert_with(|| result.clone());
        Ok(())
    }

    fn list(&self, user: Option<&str>) -> io::Result<Vec<RunResult>> {
        Ok(self
            .results
            .values()
            .filter(|r| user.is_none_or(|u| r.user == u))
            .cloned()
            .collect())
    }
}
