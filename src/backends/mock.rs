use async_trait::async_trait;
use std::collections::HashMap;

use super::{
    BackendResult, ClassPrediction, ClassifierBackend, EmbeddingBackend, RetrievalBackend,
    RetrievedContext,
};

const EMBEDDING_DIM: usize = 64;

/// Deterministic in-process embedder: character trigrams hashed into a
/// fixed-dimension bag, L2-normalized. Similar texts share trigrams and
/// land close in the vector space, which is all the tests and the demo
/// stack need from an embedding model.
pub struct MockEmbeddingBackend;

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self
    }

    fn trigram_bucket(trigram: &[u8]) -> usize {
        // FNV-1a, folded into the embedding dimension
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in trigram {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % EMBEDDING_DIM as u64) as usize
    }
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed(&self, text: &str) -> BackendResult<Vec<f32>> {
        let normalized = text.to_lowercase();
        let bytes = normalized.as_bytes();
        let mut vector = vec![0.0f32; EMBEDDING_DIM];

        if bytes.len() < 3 {
            if !bytes.is_empty() {
                vector[Self::trigram_bucket(bytes)] += 1.0;
            }
        } else {
            for window in bytes.windows(3) {
                vector[Self::trigram_bucket(window)] += 1.0;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn backend_name(&self) -> &'static str {
        "mock-embedding"
    }
}

/// Canned retrieval corpus keyed by target. Documents whose snippet shares a
/// word with the query are returned, best-scored first.
pub struct MockRetrievalBackend {
    documents: Vec<RetrievedContext>,
}

impl MockRetrievalBackend {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
        }
    }

    pub fn with_document(mut self, target: &str, snippet: &str, score: f64) -> Self {
        self.documents.push(RetrievedContext {
            target: target.to_string(),
            snippet: snippet.to_string(),
            score,
        });
        self
    }
}

impl Default for MockRetrievalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetrievalBackend for MockRetrievalBackend {
    async fn retrieve(&self, query: &str, limit: usize) -> BackendResult<Vec<RetrievedContext>> {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();

        let mut hits: Vec<RetrievedContext> = self
            .documents
            .iter()
            .filter(|doc| {
                let snippet = doc.snippet.to_lowercase();
                query_words.iter().any(|w| snippet.contains(w.as_str()))
            })
            .cloned()
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.target.cmp(&b.target))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn backend_name(&self) -> &'static str {
        "mock-retrieval"
    }
}

/// Table-driven classifier: the first rule whose trigger phrase appears in
/// the task description wins; otherwise a uniform distribution over the
/// known classes.
pub struct MockClassifierBackend {
    classes: Vec<String>,
    rules: HashMap<String, Vec<ClassPrediction>>,
}

impl MockClassifierBackend {
    pub fn new(classes: Vec<String>) -> Self {
        Self {
            classes,
            rules: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, trigger: &str, predictions: Vec<(&str, f64)>) -> Self {
        self.rules.insert(
            trigger.to_lowercase(),
            predictions
                .into_iter()
                .map(|(target, probability)| ClassPrediction {
                    target: target.to_string(),
                    probability,
                })
                .collect(),
        );
        self
    }
}

#[async_trait]
impl ClassifierBackend for MockClassifierBackend {
    async fn classify(&self, task_description: &str) -> BackendResult<Vec<ClassPrediction>> {
        let description = task_description.to_lowercase();

        let mut triggers: Vec<&String> = self.rules.keys().collect();
        triggers.sort();
        for trigger in triggers {
            if description.contains(trigger.as_str()) {
                return Ok(self.rules[trigger].clone());
            }
        }

        if self.classes.is_empty() {
            return Ok(Vec::new());
        }

        let uniform = 1.0 / self.classes.len() as f64;
        Ok(self
            .classes
            .iter()
            .map(|target| ClassPrediction {
                target: target.clone(),
                probability: uniform,
            })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "mock-classifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::cosine_similarity;

    #[tokio::test]
    async fn test_embedding_is_deterministic() {
        let backend = MockEmbeddingBackend::new();
        let a = backend.embed("fix the login bug").await.unwrap();
        let b = backend.embed("fix the login bug").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_similar_texts_embed_closer_than_unrelated() {
        let backend = MockEmbeddingBackend::new();
        let base = backend.embed("deploy the api to production").await.unwrap();
        let close = backend.embed("deploy api to production now").await.unwrap();
        let far = backend.embed("quarterly financial review").await.unwrap();

        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn test_retrieval_matches_and_truncates() {
        let backend = MockRetrievalBackend::new()
            .with_document("devops-master", "deploy service to production", 0.9)
            .with_document("devops-master", "production incident rollback", 0.7)
            .with_document("research-master", "compare database engines", 0.8);

        let hits = backend.retrieve("deploy to production", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, "devops-master");
        assert_eq!(hits[0].score, 0.9);
    }

    #[tokio::test]
    async fn test_classifier_rule_beats_uniform() {
        let backend = MockClassifierBackend::new(vec![
            "development-master".to_string(),
            "devops-master".to_string(),
        ])
        .with_rule("deploy", vec![("devops-master", 0.9), ("development-master", 0.1)]);

        let with_rule = backend.classify("deploy the thing").await.unwrap();
        assert_eq!(with_rule[0].target, "devops-master");
        assert_eq!(with_rule[0].probability, 0.9);

        let uniform = backend.classify("something else entirely").await.unwrap();
        assert!(uniform.iter().all(|p| (p.probability - 0.5).abs() < 1e-9));
    }
}
