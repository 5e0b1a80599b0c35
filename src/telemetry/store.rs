use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::TelemetryResult;
use super::types::{Feedback, FinalDecision, LayerAttempt, Outcome, RoutingEvent};

/// One line in the append-only routing event log. Updates are modeled as
/// later record kinds correlated by `event_id`, never in-place mutation, so
/// the store stays write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum EventRecord {
    Started {
        event_id: String,
        task_id: String,
        task_description: String,
        created_at: DateTime<Utc>,
    },
    Attempt {
        event_id: String,
        attempt: LayerAttempt,
    },
    Finalized {
        event_id: String,
        decision: FinalDecision,
        total_latency_ms: f64,
    },
    Outcome {
        event_id: String,
        outcome: Outcome,
        feedback: Feedback,
        recorded_at: DateTime<Utc>,
    },
}

impl EventRecord {
    pub fn event_id(&self) -> &str {
        match self {
            EventRecord::Started { event_id, .. }
            | EventRecord::Attempt { event_id, .. }
            | EventRecord::Finalized { event_id, .. }
            | EventRecord::Outcome { event_id, .. } => event_id,
        }
    }
}

pub struct EventStore {
    path: PathBuf,
}

impl EventStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &EventRecord) -> TelemetryResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let locked = file.try_lock_exclusive().is_ok();
        let json = serde_json::to_string(record)?;
        let result = writeln!(file, "{}", json);
        if locked {
            FileExt::unlock(&file).ok();
        }
        result?;
        Ok(())
    }

    pub fn read_records(&self) -> TelemetryResult<Vec<EventRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // A torn write must not take the rest of the log with it.
                    tracing::warn!(
                        event = "telemetry.corrupt_record_skipped",
                        line = line_num + 1,
                        error = %e,
                    );
                }
            }
        }
        Ok(records)
    }

    /// Reconstruct current event state by folding all records per `event_id`
    /// in arrival order. Later outcome records overwrite earlier ones, which
    /// is what makes outcome submission idempotent.
    pub fn fold_events(&self) -> TelemetryResult<Vec<RoutingEvent>> {
        let records = self.read_records()?;

        let mut order: Vec<String> = Vec::new();
        let mut events: HashMap<String, RoutingEvent> = HashMap::new();

        for record in records {
            let event_id = record.event_id().to_string();
            let event = match events.entry(event_id.clone()) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    order.push(event_id.clone());
                    entry.insert(RoutingEvent::started(
                        event_id.clone(),
                        String::new(),
                        String::new(),
                        Utc::now(),
                    ))
                }
            };

            match record {
                EventRecord::Started {
                    task_id,
                    task_description,
                    created_at,
                    ..
                } => {
                    event.task_id = task_id;
                    event.task_description = task_description;
                    event.created_at = created_at;
                }
                EventRecord::Attempt { attempt, .. } => {
                    event.layer_attempts.push(attempt);
                }
                EventRecord::Finalized {
                    decision,
                    total_latency_ms,
                    ..
                } => {
                    event.final_decision = Some(decision);
                    event.total_latency_ms = Some(total_latency_ms);
                }
                EventRecord::Outcome {
                    outcome, feedback, ..
                } => {
                    event.outcome = Some(outcome);
                    event.learning_feedback = Some(feedback);
                }
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|id| events.remove(&id))
            .collect())
    }

    pub fn load_event(&self, event_id: &str) -> TelemetryResult<Option<RoutingEvent>> {
        Ok(self
            .fold_events()?
            .into_iter()
            .find(|e| e.event_id == event_id))
    }
}
