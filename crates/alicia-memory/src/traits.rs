use async_trait::async_trait;

/// Turns text into a fixed-dimension embedding. An external collaborator
/// per the "out of scope" boundary — only the interface lives here.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
    fn dimension(&self) -> usize;
}

/// Fetches a named, labeled prompt template (e.g. `("memory_filter",
/// "production")`). An external collaborator; callers fall back to a
/// hard-coded constant template on fetch failure.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn get(&self, name: &str, label: &str) -> Result<String, String>;
}

/// Deterministic in-memory `Embedder` for tests.
pub struct MockEmbedder {
    dim: usize,
}

impl MockEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let mut v = vec![0.0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            v[i % self.dim] += byte as f32;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

pub struct StaticPromptProvider {
    template: String,
}

impl StaticPromptProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl PromptProvider for StaticPromptProvider {
    async fn get(&self, _name: &str, _label: &str) -> Result<String, String> {
        Ok(self.template.clone())
    }
}
