use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigError, ConfigStore};
use crate::telemetry::{EventStore, TelemetryError};

#[derive(Debug, Error)]
pub enum TuneError {
    #[error("Layer '{layer}' not found in configuration")]
    UnknownLayer { layer: String },

    #[error("Telemetry error: {0}")]
    TelemetryError(#[from] TelemetryError),

    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),
}

#[derive(Debug, Clone)]
pub struct TuneParams {
    pub layer_name: String,
    pub window: Duration,
    pub min_samples: usize,
    pub step_size: f64,
    pub aggressive: bool,
}

impl TuneParams {
    pub fn new(layer_name: impl Into<String>) -> Self {
        Self {
            layer_name: layer_name.into(),
            window: Duration::days(7),
            min_samples: 100,
            step_size: 0.05,
            aggressive: false,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn aggressive(mut self, aggressive: bool) -> Self {
        self.aggressive = aggressive;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBias {
    /// Missed opportunities dominate: the layer keeps deferring tasks it
    /// would have routed correctly.
    TooHigh,
    /// False positives dominate: the layer keeps accepting tasks it routes
    /// incorrectly.
    TooLow,
    Balanced,
}

impl std::fmt::Display for ThresholdBias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdBias::TooHigh => write!(f, "threshold too high"),
            ThresholdBias::TooLow => write!(f, "threshold too low"),
            ThresholdBias::Balanced => write!(f, "balanced"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TuneReport {
    pub layer_name: String,
    pub old_threshold: f64,
    pub new_threshold: f64,
    pub optimal_threshold: Option<f64>,
    pub samples_used: usize,
    pub bias: Option<ThresholdBias>,
    pub rationale: String,
}

struct Sample {
    confidence: f64,
    correct: bool,
}

#[derive(Default)]
struct Confusion {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl Confusion {
    fn at(samples: &[Sample], threshold: f64) -> Self {
        let mut counts = Self::default();
        for sample in samples {
            match (sample.confidence >= threshold, sample.correct) {
                (true, true) => counts.tp += 1,
                (true, false) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (false, true) => counts.fn_ += 1,
            }
        }
        counts
    }

    fn accuracy(&self) -> f64 {
        let total = self.tp + self.fp + self.tn + self.fn_;
        if total == 0 {
            return 0.0;
        }
        (self.tp + self.tn) as f64 / total as f64
    }
}

/// Offline recalibration job. Replays historical routing events with
/// attached outcomes, treats one layer as a binary accept/defer classifier,
/// finds the accuracy-maximizing threshold in a fixed sweep and nudges the
/// live threshold toward it by a bounded step. Never runs in the request
/// path; reads a snapshot of the log taken at start, tolerating concurrent
/// appends.
pub struct ThresholdTuner {
    config: Arc<ConfigStore>,
    store: EventStore,
}

impl ThresholdTuner {
    pub fn new(config: Arc<ConfigStore>, store: EventStore) -> Self {
        Self { config, store }
    }

    pub fn tune(&self, params: &TuneParams) -> Result<TuneReport, TuneError> {
        let snapshot_at = Utc::now();
        let config = self.config.snapshot();

        let old_threshold = config
            .layer(&params.layer_name)
            .map(|l| l.confidence_threshold)
            .ok_or_else(|| TuneError::UnknownLayer {
                layer: params.layer_name.clone(),
            })?;

        let samples = self.collect_samples(&params.layer_name, snapshot_at, params.window)?;

        if samples.len() < params.min_samples {
            return Ok(TuneReport {
                layer_name: params.layer_name.clone(),
                old_threshold,
                new_threshold: old_threshold,
                optimal_threshold: None,
                samples_used: samples.len(),
                bias: None,
                rationale: format!(
                    "insufficient data: {} qualifying events, {} required; threshold unchanged",
                    samples.len(),
                    params.min_samples
                ),
            });
        }

        let tuning = &config.tuning;
        let sweep_steps = ((tuning.sweep_ceiling - tuning.sweep_floor) / tuning.sweep_step)
            .round() as usize;

        let mut optimum = tuning.sweep_floor;
        let mut best_accuracy = -1.0f64;
        for i in 0..=sweep_steps {
            let candidate = tuning.sweep_floor + i as f64 * tuning.sweep_step;
            let accuracy = Confusion::at(&samples, candidate).accuracy();
            // Strictly-greater keeps ties on the lowest candidate: routing
            // at the cheaper layer wins when accuracy is equal.
            if accuracy > best_accuracy {
                best_accuracy = accuracy;
                optimum = candidate;
            }
        }

        let current = Confusion::at(&samples, old_threshold);
        let bias = if current.fn_ > current.fp {
            ThresholdBias::TooHigh
        } else if current.fp > current.fn_ {
            ThresholdBias::TooLow
        } else {
            ThresholdBias::Balanced
        };

        let step = if params.aggressive {
            params.step_size * 2.0
        } else {
            params.step_size
        };
        let delta = (optimum - old_threshold).clamp(-step, step);
        let new_threshold = (old_threshold + delta).clamp(0.0, 1.0);

        if (new_threshold - old_threshold).abs() > f64::EPSILON {
            self.config.set_threshold(&params.layer_name, new_threshold)?;
        }

        let rationale = format!(
            "optimum {:.2} (accuracy {:.3} over {} samples); {} ({} missed opportunities, {} false positives at current threshold); moved {:.2} -> {:.2}",
            optimum,
            best_accuracy,
            samples.len(),
            bias,
            current.fn_,
            current.fp,
            old_threshold,
            new_threshold,
        );

        tracing::info!(
            event = "tuning.applied",
            layer = %params.layer_name,
            old_threshold = old_threshold,
            new_threshold = new_threshold,
            optimum = optimum,
            samples = samples.len(),
        );

        Ok(TuneReport {
            layer_name: params.layer_name.clone(),
            old_threshold,
            new_threshold,
            optimal_threshold: Some(optimum),
            samples_used: samples.len(),
            bias: Some(bias),
            rationale,
        })
    }

    fn collect_samples(
        &self,
        layer_name: &str,
        snapshot_at: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<Sample>, TuneError> {
        let window_start = snapshot_at - window;
        let mut samples = Vec::new();

        for event in self.store.fold_events()? {
            if event.created_at < window_start || event.created_at > snapshot_at {
                continue;
            }
            let Some(decision) = &event.final_decision else {
                continue;
            };
            if decision.is_cancelled() {
                continue;
            }
            let Some(outcome) = &event.outcome else {
                continue;
            };
            let Some(attempt) = event.attempt_for(layer_name) else {
                continue;
            };
            if !attempt.attempted {
                continue;
            }
            // Without a resolvable true target the attempt cannot be scored
            // as correct or incorrect, so it contributes nothing.
            let Some(true_target) = outcome.true_target(decision.selected_target.as_deref())
            else {
                continue;
            };

            samples.push(Sample {
                confidence: attempt.confidence,
                correct: attempt.selected_target.as_deref() == Some(true_target.as_str()),
            });
        }

        Ok(samples)
    }
}
