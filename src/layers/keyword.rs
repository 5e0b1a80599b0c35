use async_trait::async_trait;
use indexmap::IndexMap;
use regex::RegexBuilder;
use serde_json::Value;

use super::{LayerAdapter, LayerError, LayerOutcome};
use crate::config::{LAYER_KEYWORD, RouterConfig};
use crate::routing::Task;

struct CompiledPattern {
    regex: regex::Regex,
    specificity: f64,
}

struct TargetVocabulary {
    target: String,
    patterns: Vec<CompiledPattern>,
}

/// Deterministic first layer: regex vocabularies per target, matched against
/// the task description. Confidence comes from match specificity; a longer,
/// multi-word phrase is stronger evidence than a single generic word, and
/// several independent matches stack (capped at 1.0).
pub struct KeywordLayer {
    vocabularies: Vec<TargetVocabulary>,
}

impl KeywordLayer {
    pub fn new() -> Self {
        Self {
            vocabularies: Vec::new(),
        }
    }

    pub fn from_config(config: &RouterConfig) -> Result<Self, LayerError> {
        let mut layer = Self::new();
        for (target, spec) in &config.targets {
            layer.add_vocabulary(target, &spec.keywords)?;
        }
        Ok(layer)
    }

    pub fn add_vocabulary(&mut self, target: &str, phrases: &[String]) -> Result<(), LayerError> {
        let mut patterns = Vec::new();
        for phrase in phrases {
            let escaped = regex::escape(phrase);
            let source = format!(r"\b{}\b", escaped);
            let regex = RegexBuilder::new(&source)
                .case_insensitive(true)
                .build()
                .map_err(|e| LayerError::InvalidPattern {
                    pattern: phrase.clone(),
                    message: e.to_string(),
                })?;
            patterns.push(CompiledPattern {
                regex,
                specificity: Self::specificity(phrase),
            });
        }
        self.vocabularies.push(TargetVocabulary {
            target: target.to_string(),
            patterns,
        });
        Ok(())
    }

    fn specificity(phrase: &str) -> f64 {
        let words = phrase.split_whitespace().count().max(1);
        let base = 0.45 + 0.12 * (words as f64 - 1.0);
        let length_bonus = (phrase.len() as f64 * 0.01).min(0.2);
        (base + length_bonus).min(0.95)
    }
}

impl Default for KeywordLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAdapter for KeywordLayer {
    async fn attempt(&self, task: &Task) -> Result<LayerOutcome, LayerError> {
        if self.vocabularies.is_empty() {
            return Ok(LayerOutcome::empty("no keyword vocabularies configured"));
        }

        let mut scores = IndexMap::new();
        let mut matched_phrases = 0usize;

        for vocabulary in &self.vocabularies {
            let mut score = 0.0f64;
            for pattern in &vocabulary.patterns {
                if pattern.regex.is_match(&task.description) {
                    score += pattern.specificity;
                    matched_phrases += 1;
                }
            }
            if score > 0.0 {
                scores.insert(vocabulary.target.clone(), score.min(1.0));
            }
        }

        if scores.is_empty() {
            return Ok(LayerOutcome::empty("no keyword matches"));
        }

        Ok(LayerOutcome::from_scores(scores)
            .with_metadata("matched_phrases", Value::from(matched_phrases)))
    }

    fn layer_name(&self) -> &str {
        LAYER_KEYWORD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_with(target: &str, phrases: &[&str]) -> KeywordLayer {
        let mut layer = KeywordLayer::new();
        let owned: Vec<String> = phrases.iter().map(|p| p.to_string()).collect();
        layer.add_vocabulary(target, &owned).unwrap();
        layer
    }

    #[tokio::test]
    async fn test_no_match_returns_empty_outcome() {
        let layer = layer_with("development-master", &["fix bug"]);
        let task = Task::new("water the office plants");
        let outcome = layer.attempt(&task).await.unwrap();
        assert_eq!(outcome.confidence(), 0.0);
    }

    #[tokio::test]
    async fn test_multi_word_phrase_is_more_specific_than_single_word() {
        let single = layer_with("development-master", &["fix"]);
        let phrase = layer_with("development-master", &["fix authentication bug"]);

        let task = Task::new("fix authentication bug in login");
        let single_conf = single.attempt(&task).await.unwrap().confidence();
        let phrase_conf = phrase.attempt(&task).await.unwrap().confidence();

        assert!(phrase_conf > single_conf);
    }

    #[tokio::test]
    async fn test_multiple_matches_stack_and_cap() {
        let layer = layer_with(
            "development-master",
            &["fix bug", "authentication", "login"],
        );
        let task = Task::new("fix bug in authentication for login page");
        let outcome = layer.attempt(&task).await.unwrap();
        let confidence = outcome.confidence();
        assert!(confidence > 0.9);
        assert!(confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_matching_is_case_insensitive_and_word_bounded() {
        let layer = layer_with("devops-master", &["deploy"]);

        let matching = Task::new("Deploy the service");
        assert!(layer.attempt(&matching).await.unwrap().confidence() > 0.0);

        // 'deployment' must not match the bare word 'deploy'
        let non_matching = Task::new("redeployment paperwork");
        assert_eq!(layer.attempt(&non_matching).await.unwrap().confidence(), 0.0);
    }

    #[tokio::test]
    async fn test_scores_cover_all_matching_targets() {
        let mut layer = KeywordLayer::new();
        layer
            .add_vocabulary("development-master", &["fix bug".to_string()])
            .unwrap();
        layer
            .add_vocabulary("quality-master", &["fix bug".to_string(), "regression".to_string()])
            .unwrap();

        let task = Task::new("fix bug causing regression");
        let outcome = layer.attempt(&task).await.unwrap();
        assert_eq!(outcome.scores.len(), 2);
        assert_eq!(outcome.best().unwrap().0, "quality-master");
    }
}
