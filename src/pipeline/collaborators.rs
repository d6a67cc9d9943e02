//! Collaborator interfaces consumed by the pipeline.
//!
//! The orchestrator only knows these traits. Concrete implementations
//! (arXiv, HTTP, pdftotext, Ollama, SQLite, Markdown) are wired in by
//! the binary at startup; tests substitute fakes.

use crate::error::Fault;
use crate::models::{AnalysisFields, PaperRecord, WorkItem};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Produces candidate items.
#[async_trait]
pub trait Source: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch candidates. Failures are logged by the source and yield an
    /// empty list; they never reach the caller.
    async fn acquire(&self) -> Vec<WorkItem>;
}

/// Fetches the full-text artifact for an item.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn retrieve(&self, item: &WorkItem) -> Result<Option<PathBuf>, Fault>;
}

/// Turns a retrieved artifact into plain text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, artifact: &Path) -> Result<Option<String>, Fault>;
}

/// Produces structured fields from text and an instruction prompt.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, text: &str, prompt: &str) -> Result<Option<AnalysisFields>, Fault>;
}

/// Free-form text generation, used as proposer and evaluator by the
/// prompt optimizer.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, Fault>;
}

/// Persistence for analyzed items.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the generated id, or `None` when nothing was stored.
    async fn insert(&self, item: &WorkItem) -> Result<Option<i64>, Fault>;

    async fn fetch(&self, id: i64) -> Result<Option<PaperRecord>, Fault>;

    async fn count(&self) -> Result<u64, Fault>;
}

/// Produces the summary report from persisted state.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn synthesize(&self) -> Result<Option<PathBuf>, Fault>;
}
