//! In-memory collaborators for tests.

use crate::error::Fault;
use crate::models::{AnalysisFields, PaperRecord, WorkItem};
use crate::optimizer::Sampler;
use crate::pipeline::collaborators::{
    Analyzer, Downloader, Extractor, Generator, Reporter, Source, Store,
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How a fake collaborator should treat a given title.
#[derive(Debug, Clone, Default)]
pub struct Failures {
    pub no_result: Vec<String>,
    pub item_fault: Vec<String>,
    /// Every call reports the collaborator as unavailable.
    pub unavailable: bool,
}

impl Failures {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn item(title: &str) -> Self {
        Self {
            item_fault: vec![title.to_string()],
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    fn check(&self, title: &str) -> Result<bool, Fault> {
        if self.unavailable {
            return Err(Fault::unavailable("fake collaborator down"));
        }
        if self.item_fault.iter().any(|t| t == title) {
            return Err(Fault::item(format!("fake failure for {}", title)));
        }
        Ok(!self.no_result.iter().any(|t| t == title))
    }
}

/// Records the titles a collaborator was called with.
#[derive(Debug, Default)]
pub struct Calls(Mutex<Vec<String>>);

impl Calls {
    fn push(&self, title: &str) {
        self.0.lock().unwrap().push(title.to_string());
    }

    pub fn titles(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

pub struct FakeSource {
    pub name: String,
    pub items: Vec<WorkItem>,
}

impl FakeSource {
    pub fn new(name: &str, titles: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            items: titles.iter().map(|t| WorkItem::new(*t, name)).collect(),
        }
    }
}

#[async_trait]
impl Source for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> Vec<WorkItem> {
        self.items.clone()
    }
}

#[derive(Default)]
pub struct FakeDownloader {
    pub failures: Failures,
    pub calls: Calls,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn retrieve(&self, item: &WorkItem) -> Result<Option<PathBuf>, Fault> {
        self.calls.push(&item.title);
        if !self.failures.check(&item.title)? {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(format!("/pdf/{}.pdf", item.title.trim()))))
    }
}

/// Extracts text from the fake path; titles come from the file stem.
#[derive(Default)]
pub struct FakeExtractor {
    pub failures: Failures,
    pub calls: Calls,
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, artifact: &Path) -> Result<Option<String>, Fault> {
        let title = artifact
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.push(&title);
        if !self.failures.check(&title)? {
            return Ok(None);
        }
        Ok(Some(format!("Full text of {}", title)))
    }
}

#[derive(Default)]
pub struct FakeAnalyzer {
    pub failures: Failures,
    pub calls: Calls,
    pub prompts: Calls,
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, text: &str, prompt: &str) -> Result<Option<AnalysisFields>, Fault> {
        let title = text.trim_start_matches("Full text of ").to_string();
        self.calls.push(&title);
        self.prompts.push(prompt);
        if !self.failures.check(&title)? {
            return Ok(None);
        }
        Ok(Some(AnalysisFields {
            research_problem: format!("Problem studied in {}", title),
            is_open_source: Some(true),
            ..AnalysisFields::default()
        }))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub failures: Failures,
    pub records: Mutex<Vec<PaperRecord>>,
}

impl MemoryStore {
    pub fn all(&self) -> Vec<PaperRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, item: &WorkItem) -> Result<Option<i64>, Fault> {
        if !self.failures.check(&item.title)? {
            return Ok(None);
        }
        let mut records = self.records.lock().unwrap();
        let id = records.len() as i64 + 1;
        records.push(PaperRecord {
            id,
            item: item.clone(),
            created_at: Utc::now(),
        });
        Ok(Some(id))
    }

    async fn fetch(&self, id: i64) -> Result<Option<PaperRecord>, Fault> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn count(&self) -> Result<u64, Fault> {
        Ok(self.records.lock().unwrap().len() as u64)
    }
}

#[derive(Default)]
pub struct FakeReporter {
    pub fault: Option<Fault>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Reporter for FakeReporter {
    async fn synthesize(&self) -> Result<Option<PathBuf>, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fault {
            Some(Fault::Item(reason)) => Err(Fault::item(reason.clone())),
            Some(Fault::Unavailable(reason)) => Err(Fault::unavailable(reason.clone())),
            None => Ok(Some(PathBuf::from("/reports/report.md"))),
        }
    }
}

type Script = Box<dyn Fn(&str) -> Result<String, Fault> + Send + Sync>;

/// Generator answering from a closure.
pub struct ScriptedGenerator {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn from_fn<F>(script: F) -> Self
    where
        F: Fn(&str) -> Result<String, Fault> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn constant(response: &str) -> Self {
        let response = response.to_string();
        Self::from_fn(move |_| Ok(response.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(prompt)
    }
}

/// Deterministic sampler: always the first `amount` indices.
pub struct FirstSamples;

impl Sampler for FirstSamples {
    fn sample(&mut self, population: usize, amount: usize) -> Vec<usize> {
        (0..amount.min(population)).collect()
    }
}
