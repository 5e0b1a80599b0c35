use async_trait::async_trait;

pub mod error;
pub mod mock;

pub use error::{BackendError, BackendResult};
pub use mock::{MockClassifierBackend, MockEmbeddingBackend, MockRetrievalBackend};

/// A piece of supporting evidence pulled from the retrieval index: a prior
/// routing decision or a target capability description that mentions the
/// query, pre-scored by the index.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub target: String,
    pub snippet: String,
    pub score: f64,
}

/// One class probability out of the trained classifier's softmax output.
#[derive(Debug, Clone)]
pub struct ClassPrediction {
    pub target: String,
    pub probability: f64,
}

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> BackendResult<Vec<f32>>;

    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize) -> BackendResult<Vec<RetrievedContext>>;

    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn classify(&self, task_description: &str) -> BackendResult<Vec<ClassPrediction>>;

    fn backend_name(&self) -> &'static str;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
