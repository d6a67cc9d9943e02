//! Pipeline orchestration.
//!
//! One run moves items through
//! Acquire → Dedup → Retrieve → Extract → Analyze → Persist and ends with a
//! single Synthesize call. Each stage sees only the survivors of the one
//! before it. Item losses never fail a run; the first stage-level fault
//! skips the remaining stages and marks the run failed.

use crate::error::{Fault, StageError};
use crate::models::{AnalysisFields, PipelineRun, Stage, StageCount, WorkItem};
use crate::optimizer::PromptOptimizer;
use crate::pipeline::collaborators::{
    Analyzer, Downloader, Extractor, Reporter, Source, Store,
};
use crate::pipeline::dedup::dedup_by_title;
use crate::pipeline::stage::{run_stage, Step};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

/// Everything the pipeline talks to.
pub struct Collaborators {
    /// Enabled sources, in configuration order.
    pub sources: Vec<Arc<dyn Source>>,
    pub downloader: Arc<dyn Downloader>,
    pub extractor: Arc<dyn Extractor>,
    pub analyzer: Arc<dyn Analyzer>,
    pub store: Arc<dyn Store>,
    pub reporter: Arc<dyn Reporter>,
}

/// What a run that reached the end produced.
struct Completion {
    persisted: usize,
    report_path: Option<PathBuf>,
}

/// Drives pipeline runs.
pub struct Orchestrator {
    collaborators: Collaborators,
    optimizer: PromptOptimizer,
    initial_prompt: String,
    /// Analysis prompt, computed by the optimizer on first use.
    prompt: OnceCell<String>,
    run_guard: Mutex<()>,
    next_run_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        optimizer: PromptOptimizer,
        initial_prompt: impl Into<String>,
    ) -> Self {
        Self {
            collaborators,
            optimizer,
            initial_prompt: initial_prompt.into(),
            prompt: OnceCell::new(),
            run_guard: Mutex::new(()),
            next_run_id: AtomicU64::new(1),
        }
    }

    /// Execute one run, waiting for any run already in progress.
    pub async fn run(&self) -> PipelineRun {
        let _guard = self.run_guard.lock().await;
        self.execute().await
    }

    /// Execute one run unless another is in progress.
    pub async fn try_run(&self) -> Option<PipelineRun> {
        let _guard = self.run_guard.try_lock().ok()?;
        Some(self.execute().await)
    }

    /// The cached analysis prompt, once the first analysis has resolved it.
    pub fn analysis_prompt(&self) -> Option<&str> {
        self.prompt.get().map(String::as_str)
    }

    async fn execute(&self) -> PipelineRun {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let started_at = Utc::now();
        info!("Pipeline run #{} started", run_id);

        let mut stages = Vec::new();
        let outcome = self.run_stages(&mut stages).await;
        let finished_at = Utc::now();

        match outcome {
            Ok(done) => {
                info!(
                    "Pipeline run #{} completed: {} papers stored",
                    run_id, done.persisted
                );
                match done.report_path {
                    Some(ref path) => info!("Report written to {}", path.display()),
                    None => info!("No report produced"),
                }
                finalize(run_id, started_at, finished_at, stages, Ok(done))
            }
            Err(err) => {
                error!("Pipeline run #{} failed: {}", run_id, err);
                finalize(run_id, started_at, finished_at, stages, Err(err))
            }
        }
    }

    async fn run_stages(&self, counts: &mut Vec<StageCount>) -> Result<Completion, StageError> {
        let acquired = self.acquire().await;
        record(counts, Stage::Acquire, acquired.len(), acquired.len());

        let input = acquired.len();
        let unique = dedup_by_title(acquired);
        record(counts, Stage::Dedup, input, unique.len());

        let retrieve = RetrieveStep {
            downloader: self.collaborators.downloader.as_ref(),
        };
        let retrieved = self.run_step(counts, &retrieve, unique).await?;

        let extract = ExtractStep {
            extractor: self.collaborators.extractor.as_ref(),
        };
        let extracted = self.run_step(counts, &extract, retrieved).await?;

        let analyzed = if extracted.is_empty() {
            record(counts, Stage::Analyze, 0, 0);
            Vec::new()
        } else {
            let prompt = self.resolve_prompt(&extracted).await?;
            let analyze = AnalyzeStep {
                analyzer: self.collaborators.analyzer.as_ref(),
                prompt,
            };
            self.run_step(counts, &analyze, extracted).await?
        };

        let persist = PersistStep {
            store: self.collaborators.store.as_ref(),
        };
        let persisted = self.run_step(counts, &persist, analyzed).await?;

        match self.collaborators.store.count().await {
            Ok(total) => debug!("Store holds {} papers", total),
            Err(err) => warn!("Could not count stored papers: {}", err),
        }

        let report_path = self.synthesize().await?;

        Ok(Completion {
            persisted: persisted.len(),
            report_path,
        })
    }

    async fn acquire(&self) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for source in &self.collaborators.sources {
            let found = source.acquire().await;
            info!("{}: {} candidates", source.name(), found.len());
            items.extend(found);
        }
        items
    }

    async fn run_step<S: Step>(
        &self,
        counts: &mut Vec<StageCount>,
        step: &S,
        items: Vec<WorkItem>,
    ) -> Result<Vec<WorkItem>, StageError> {
        let input = items.len();
        let survivors = run_stage(step, items).await?;
        record(counts, step.stage(), input, survivors.len());
        Ok(survivors)
    }

    /// The analysis prompt, optimizing it against `items` on first use.
    async fn resolve_prompt(&self, items: &[WorkItem]) -> Result<&str, StageError> {
        let prompt = self
            .prompt
            .get_or_try_init(|| async {
                let corpus: Vec<String> =
                    items.iter().filter_map(|item| item.content.clone()).collect();
                let state = self.optimizer.optimize(&self.initial_prompt, &corpus).await?;
                Ok::<_, StageError>(state.best_prompt)
            })
            .await?;
        Ok(prompt.as_str())
    }

    async fn synthesize(&self) -> Result<Option<PathBuf>, StageError> {
        match self.collaborators.reporter.synthesize().await {
            Ok(path) => Ok(path),
            Err(Fault::Item(reason)) => {
                warn!("Report generation failed: {}", reason);
                Ok(None)
            }
            Err(Fault::Unavailable(reason)) => Err(StageError::new(Stage::Synthesize, reason)),
        }
    }
}

fn record(counts: &mut Vec<StageCount>, stage: Stage, input: usize, output: usize) {
    info!("Stage {}: {} in, {} out", stage, input, output);
    counts.push(StageCount {
        stage,
        input,
        output,
    });
}

fn finalize(
    run_id: u64,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stages: Vec<StageCount>,
    outcome: Result<Completion, StageError>,
) -> PipelineRun {
    let (success, persisted, report_path, failure) = match outcome {
        Ok(done) => (true, done.persisted, done.report_path, None),
        Err(err) => (false, 0, None, Some(err.to_string())),
    };
    PipelineRun {
        run_id,
        started_at,
        finished_at,
        stages,
        success,
        persisted,
        report_path,
        failure,
    }
}

struct RetrieveStep<'a> {
    downloader: &'a dyn Downloader,
}

#[async_trait]
impl<'a> Step for RetrieveStep<'a> {
    type Output = PathBuf;

    fn stage(&self) -> Stage {
        Stage::Retrieve
    }

    async fn process(&self, item: &WorkItem) -> Result<Option<PathBuf>, Fault> {
        self.downloader.retrieve(item).await
    }

    fn apply(&self, item: &mut WorkItem, path: PathBuf) {
        item.pdf_path = Some(path);
    }
}

struct ExtractStep<'a> {
    extractor: &'a dyn Extractor,
}

#[async_trait]
impl<'a> Step for ExtractStep<'a> {
    type Output = String;

    fn stage(&self) -> Stage {
        Stage::Extract
    }

    async fn process(&self, item: &WorkItem) -> Result<Option<String>, Fault> {
        let Some(path) = item.pdf_path.as_deref() else {
            return Err(Fault::item("no retrieved artifact"));
        };
        let text = self.extractor.extract(path).await?;
        Ok(text.filter(|t| !t.trim().is_empty()))
    }

    fn apply(&self, item: &mut WorkItem, text: String) {
        item.content = Some(text);
    }
}

struct AnalyzeStep<'a> {
    analyzer: &'a dyn Analyzer,
    prompt: &'a str,
}

#[async_trait]
impl<'a> Step for AnalyzeStep<'a> {
    type Output = AnalysisFields;

    fn stage(&self) -> Stage {
        Stage::Analyze
    }

    async fn process(&self, item: &WorkItem) -> Result<Option<AnalysisFields>, Fault> {
        let Some(text) = item.content.as_deref() else {
            return Err(Fault::item("no extracted text"));
        };
        self.analyzer.analyze(text, self.prompt).await
    }

    fn apply(&self, item: &mut WorkItem, fields: AnalysisFields) {
        item.analysis = Some(fields);
        item.analyzed_at = Some(Utc::now());
    }
}

struct PersistStep<'a> {
    store: &'a dyn Store,
}

#[async_trait]
impl<'a> Step for PersistStep<'a> {
    type Output = i64;

    fn stage(&self) -> Stage {
        Stage::Persist
    }

    async fn process(&self, item: &WorkItem) -> Result<Option<i64>, Fault> {
        self.store.insert(item).await
    }

    fn apply(&self, item: &mut WorkItem, id: i64) {
        item.id = Some(id);
    }
}
