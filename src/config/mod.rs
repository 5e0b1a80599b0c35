pub mod error;
pub mod store;

pub use error::{ConfigError, ConfigResult};
pub use store::ConfigStore;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

pub const LAYER_KEYWORD: &str = "keyword";
pub const LAYER_SEMANTIC: &str = "semantic";
pub const LAYER_CONTEXT: &str = "context-augmented";
pub const LAYER_CLASSIFIER: &str = "learned-classifier";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerSpec {
    pub layer_id: u32,
    pub name: String,
    pub confidence_threshold: f64,
    pub max_latency_budget_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default = "default_sweep_floor")]
    pub sweep_floor: f64,
    #[serde(default = "default_sweep_ceiling")]
    pub sweep_ceiling: f64,
    #[serde(default = "default_sweep_step")]
    pub sweep_step: f64,
}

fn default_min_samples() -> usize {
    100
}

fn default_step_size() -> f64 {
    0.05
}

fn default_sweep_floor() -> f64 {
    0.50
}

fn default_sweep_ceiling() -> f64 {
    0.95
}

fn default_sweep_step() -> f64 {
    0.05
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            step_size: default_step_size(),
            sweep_floor: default_sweep_floor(),
            sweep_ceiling: default_sweep_ceiling(),
            sweep_step: default_sweep_step(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdStartConfig {
    #[serde(default = "default_min_classifier_samples")]
    pub min_classifier_samples: u64,
}

fn default_min_classifier_samples() -> u64 {
    25
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            min_classifier_samples: default_min_classifier_samples(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Weight of the semantic score in the blended context-augmented score.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,
}

fn default_semantic_weight() -> f64 {
    0.6
}

fn default_retrieval_limit() -> usize {
    5
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            retrieval_limit: default_retrieval_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub targets: IndexMap<String, TargetSpec>,
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub cold_start: ColdStartConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let layers = vec![
            LayerSpec {
                layer_id: 1,
                name: LAYER_KEYWORD.to_string(),
                confidence_threshold: 0.85,
                max_latency_budget_ms: 50,
            },
            LayerSpec {
                layer_id: 2,
                name: LAYER_SEMANTIC.to_string(),
                confidence_threshold: 0.70,
                max_latency_budget_ms: 500,
            },
            LayerSpec {
                layer_id: 3,
                name: LAYER_CONTEXT.to_string(),
                confidence_threshold: 0.65,
                max_latency_budget_ms: 1500,
            },
            LayerSpec {
                layer_id: 4,
                name: LAYER_CLASSIFIER.to_string(),
                confidence_threshold: 0.60,
                max_latency_budget_ms: 1000,
            },
        ];

        let mut targets = IndexMap::new();
        targets.insert(
            "development-master".to_string(),
            TargetSpec {
                description: "Implements features, fixes bugs, refactors code and reviews \
                              pull requests across the codebase"
                    .to_string(),
                keywords: vec![
                    "fix bug".to_string(),
                    "implement".to_string(),
                    "refactor".to_string(),
                    "code review".to_string(),
                ],
            },
        );
        targets.insert(
            "devops-master".to_string(),
            TargetSpec {
                description: "Handles deployments, infrastructure provisioning, CI pipelines \
                              and production incident response"
                    .to_string(),
                keywords: vec![
                    "deploy".to_string(),
                    "pipeline".to_string(),
                    "infrastructure".to_string(),
                    "rollback".to_string(),
                ],
            },
        );
        targets.insert(
            "research-master".to_string(),
            TargetSpec {
                description: "Investigates open questions, compares approaches and produces \
                              written analysis and recommendations"
                    .to_string(),
                keywords: vec![
                    "investigate".to_string(),
                    "compare".to_string(),
                    "research".to_string(),
                ],
            },
        );

        Self {
            layers,
            targets,
            tuning: TuningConfig::default(),
            telemetry: TelemetryConfig::default(),
            cold_start: ColdStartConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn load(path: &PathBuf) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDirectory)?;
        Ok(config_dir.join("taskcascade").join("router.toml"))
    }

    pub fn default_log_path(&self) -> ConfigResult<PathBuf> {
        if let Some(path) = &self.telemetry.log_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoConfigDirectory)?;
        Ok(data_dir.join("taskcascade").join("routing_events.jsonl"))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.layers.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "At least one layer must be configured".to_string(),
            ));
        }

        let mut previous_id: Option<u32> = None;
        for layer in &self.layers {
            if let Some(prev) = previous_id
                && layer.layer_id <= prev
            {
                return Err(ConfigError::InvalidConfig(format!(
                    "Layer ids must be strictly ascending: {} follows {}",
                    layer.layer_id, prev
                )));
            }
            previous_id = Some(layer.layer_id);

            if !(0.0..=1.0).contains(&layer.confidence_threshold) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Confidence threshold for layer '{}' must be between 0.0 and 1.0",
                    layer.name
                )));
            }

            if layer.max_latency_budget_ms == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "Latency budget for layer '{}' must be positive",
                    layer.name
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Duplicate layer name: {}",
                    layer.name
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.context.semantic_weight) {
            return Err(ConfigError::InvalidConfig(
                "Semantic weight must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.tuning.sweep_floor >= self.tuning.sweep_ceiling {
            return Err(ConfigError::InvalidConfig(
                "Tuning sweep floor must be below sweep ceiling".to_string(),
            ));
        }

        Ok(())
    }

    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.name == name)
    }
}
