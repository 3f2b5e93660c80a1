//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use xtrc::{DomainError, EmbedRole, EmbeddingService, MockEmbedding};

/// Copies the bundled demo application into a scratch directory so index
/// state never lands in the source tree.
pub fn copy_demo_app(dest: &Path) {
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/demo_app");
    copy_dir(&fixture, dest);
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).expect("create dest dir");
    for entry in std::fs::read_dir(from).expect("read fixture dir") {
        let entry = entry.expect("fixture entry");
        let target = to.join(entry.file_name());
        if entry.file_type().expect("file type").is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).expect("copy fixture file");
        }
    }
}

/// Embedding service that counts model invocations and records the exact
/// texts sent to the model; cache hits never reach it.
pub struct CountingEmbedding {
    inner: MockEmbedding,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl CountingEmbedding {
    pub fn new() -> Self {
        Self {
            inner: MockEmbedding::new(),
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn embedded_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.texts.lock().unwrap().clear();
    }

    pub fn embedded_texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingService for CountingEmbedding {
    async fn embed_batch(
        &self,
        texts: &[String],
        role: EmbedRole,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        self.texts.lock().unwrap().extend(texts.iter().cloned());
        self.inner.embed_batch(texts, role).await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}
