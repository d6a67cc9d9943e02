//! SQLite paper store.
//!
//! One `papers` table holds the metadata, extracted text and analysis of
//! every persisted paper. List-valued fields are stored as JSON.
//!
//! rusqlite is synchronous, so the async entry points run their queries
//! on tokio's blocking pool.

use crate::error::Fault;
use crate::models::{AnalysisFields, PaperRecord, PaperStatistics, WorkItem};
use crate::pipeline::collaborators::Store;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "id, title, authors, summary, publish_year, source, arxiv_id, \
     pdf_url, html_url, categories, doi, primary_category, venue, citations, pdf_path, \
     content, research_problem, method_summary, innovation, experimental_results, \
     limitations, is_open_source, analyzed_at, created_at";

/// Paper store backed by a single SQLite file.
///
/// Clones share the connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        info!("Database ready: {}", path.display());
        Ok(store)
    }

    /// In-memory database, used by tests.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `op` against this store on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, Fault>
    where
        F: FnOnce(&SqliteStore) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| Fault::unavailable(format!("database task failed: {}", e)))?
            .map_err(to_fault)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS papers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                authors TEXT,
                summary TEXT,
                publish_year INTEGER,
                source TEXT,
                arxiv_id TEXT,
                pdf_url TEXT,
                html_url TEXT,
                categories TEXT,
                doi TEXT,
                primary_category TEXT,
                venue TEXT,
                citations INTEGER,
                pdf_path TEXT,
                content TEXT,
                research_problem TEXT,
                method_summary TEXT,
                innovation TEXT,
                experimental_results TEXT,
                limitations TEXT,
                is_open_source INTEGER,
                analyzed_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_papers_title ON papers(title);
            CREATE INDEX IF NOT EXISTS idx_papers_year ON papers(publish_year);
            CREATE INDEX IF NOT EXISTS idx_papers_source ON papers(source);
            CREATE INDEX IF NOT EXISTS idx_papers_arxiv_id ON papers(arxiv_id);
            CREATE INDEX IF NOT EXISTS idx_papers_doi ON papers(doi);",
        )
        .context("Failed to create papers table")?;
        Ok(())
    }

    /// Insert a paper and return its id.
    pub fn insert_paper(&self, item: &WorkItem) -> rusqlite::Result<i64> {
        let analysis = item.analysis.clone().unwrap_or_default();
        let has_analysis = item.analysis.is_some();
        let text = |value: &str| (has_analysis && !value.is_empty()).then(|| value.to_string());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO papers (
                title, authors, summary, publish_year, source, arxiv_id, pdf_url, html_url,
                categories, doi, primary_category, venue, citations, pdf_path, content,
                research_problem, method_summary, innovation, experimental_results,
                limitations, is_open_source, analyzed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                item.title,
                to_json(&item.authors),
                item.summary,
                item.publish_year,
                item.source,
                item.arxiv_id,
                item.pdf_url,
                item.html_url,
                to_json(&item.categories),
                item.doi,
                item.primary_category,
                item.venue,
                item.citations,
                item.pdf_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                item.content,
                text(&analysis.research_problem),
                text(&analysis.method_summary),
                text(&analysis.innovation),
                text(&analysis.experimental_results),
                text(&analysis.limitations),
                analysis.is_open_source,
                item.analyzed_at,
                Utc::now(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Inserted paper {} with id {}", item.title, id);
        Ok(id)
    }

    pub fn get_paper(&self, id: i64) -> rusqlite::Result<Option<PaperRecord>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM papers WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_record,
            )
            .optional()
    }

    pub fn count_papers(&self) -> rusqlite::Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Every stored paper, oldest first.
    pub fn list_all(&self) -> rusqlite::Result<Vec<PaperRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM papers ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Every stored paper with the statistics over them.
    pub async fn snapshot(&self) -> Result<(Vec<PaperRecord>, PaperStatistics), Fault> {
        self.blocking(|store| {
            let papers = store.list_all()?;
            let statistics = PaperStatistics::from_records(&papers);
            Ok((papers, statistics))
        })
        .await
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(&self, item: &WorkItem) -> Result<Option<i64>, Fault> {
        let item = item.clone();
        self.blocking(move |store| store.insert_paper(&item))
            .await
            .map(Some)
    }

    async fn fetch(&self, id: i64) -> Result<Option<PaperRecord>, Fault> {
        self.blocking(move |store| store.get_paper(id)).await
    }

    async fn count(&self) -> Result<u64, Fault> {
        self.blocking(|store| store.count_papers()).await
    }
}

/// Database-wide failures make the store unavailable; anything else only
/// affects the current paper.
fn to_fault(err: rusqlite::Error) -> Fault {
    match err.sqlite_error_code() {
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::ReadOnly
            | ErrorCode::DiskFull
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure,
        ) => Fault::unavailable(format!("database error: {}", err)),
        _ => Fault::item(format!("database error: {}", err)),
    }
}

fn to_json(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        serde_json::to_string(values).ok()
    }
}

fn from_json(value: Option<String>) -> Vec<String> {
    value
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PaperRecord> {
    let research_problem: Option<String> = row.get(16)?;
    let method_summary: Option<String> = row.get(17)?;
    let innovation: Option<String> = row.get(18)?;
    let experimental_results: Option<String> = row.get(19)?;
    let limitations: Option<String> = row.get(20)?;
    let is_open_source: Option<bool> = row.get(21)?;
    let analyzed_at: Option<DateTime<Utc>> = row.get(22)?;

    let analysis = if analyzed_at.is_some()
        || is_open_source.is_some()
        || research_problem.is_some()
        || method_summary.is_some()
    {
        Some(AnalysisFields {
            research_problem: research_problem.unwrap_or_default(),
            method_summary: method_summary.unwrap_or_default(),
            innovation: innovation.unwrap_or_default(),
            experimental_results: experimental_results.unwrap_or_default(),
            limitations: limitations.unwrap_or_default(),
            is_open_source,
        })
    } else {
        None
    };

    let id: i64 = row.get(0)?;
    let pdf_path: Option<String> = row.get(14)?;

    Ok(PaperRecord {
        id,
        item: WorkItem {
            title: row.get(1)?,
            authors: from_json(row.get(2)?),
            summary: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            publish_year: row.get(4)?,
            source: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            arxiv_id: row.get(6)?,
            pdf_url: row.get(7)?,
            html_url: row.get(8)?,
            categories: from_json(row.get(9)?),
            doi: row.get(10)?,
            primary_category: row.get(11)?,
            venue: row.get(12)?,
            citations: row.get(13)?,
            pdf_path: pdf_path.map(PathBuf::from),
            content: row.get(15)?,
            analysis,
            analyzed_at,
            id: Some(id),
        },
        created_at: row.get(23)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn analyzed(title: &str, year: i32, open: Option<bool>) -> WorkItem {
        let mut item = WorkItem::new(title, "arXiv");
        item.authors = vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()];
        item.summary = "A study of evolving skills.".to_string();
        item.publish_year = Some(year);
        item.arxiv_id = Some("2401.01234v1".to_string());
        item.categories = vec!["cs.AI".to_string()];
        item.pdf_path = Some(PathBuf::from("data/pdfs/2401.01234v1.pdf"));
        item.content = Some("Full text".to_string());
        item.analysis = Some(AnalysisFields {
            research_problem: "How do agents acquire skills?".to_string(),
            method_summary: "Self-play curriculum".to_string(),
            is_open_source: open,
            ..AnalysisFields::default()
        });
        item.analyzed_at = Some(Utc::now());
        item
    }

    #[test]
    fn test_insert_and_fetch_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let item = analyzed("Skill Evolution", 2024, Some(true));

        let id = store.insert_paper(&item).unwrap();
        let record = store.get_paper(id).unwrap().unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.item.title, "Skill Evolution");
        assert_eq!(record.item.authors, item.authors);
        assert_eq!(record.item.categories, vec!["cs.AI"]);
        assert_eq!(record.item.pdf_path, item.pdf_path);
        assert_eq!(record.item.content.as_deref(), Some("Full text"));
        assert_eq!(record.item.analysis, item.analysis);
        assert_eq!(record.item.analyzed_at, item.analyzed_at);
        assert_eq!(record.item.id, Some(id));
    }

    #[test]
    fn test_fetch_missing_is_none() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_paper(42).unwrap().is_none());
    }

    #[test]
    fn test_unanalyzed_paper_has_no_analysis() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert_paper(&WorkItem::new("Bare", "arXiv")).unwrap();

        let record = store.get_paper(id).unwrap().unwrap();
        assert!(record.item.analysis.is_none());
        assert!(record.item.authors.is_empty());
    }

    #[tokio::test]
    async fn test_count_and_statistics() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_paper(&analyzed("A", 2023, Some(true))).unwrap();
        store.insert_paper(&analyzed("B", 2024, Some(false))).unwrap();
        store.insert_paper(&analyzed("C", 2024, None)).unwrap();

        assert_eq!(store.count_papers().unwrap(), 3);

        let (papers, stats) = store.snapshot().await.unwrap();
        assert_eq!(papers.len(), 3);
        assert_eq!(stats.total_papers, 3);
        assert_eq!(stats.with_pdf, 3);
        assert_eq!(stats.with_analysis, 3);
        assert_eq!(stats.open_source, 1);
        assert_eq!(stats.yearly_distribution.get(&2024), Some(&2));
        assert_eq!(stats.source_distribution.get("arXiv"), Some(&3));

        let titles: Vec<String> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|r| r.item.title)
            .collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_store_trait_persists_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("papers.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let id = store.insert(&analyzed("Persisted", 2025, None)).await.unwrap();
            assert_eq!(id, Some(1));
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let record = reopened.fetch(1).await.unwrap().unwrap();
        assert_eq!(record.item.title, "Persisted");
    }

    #[tokio::test]
    async fn test_async_calls_share_one_connection() {
        let store = SqliteStore::in_memory().unwrap();
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert(&WorkItem::new(format!("Paper {}", i), "arXiv"))
                        .await
                })
            })
            .collect();
        for writer in writers {
            assert!(writer.await.unwrap().unwrap().is_some());
        }

        assert_eq!(store.count().await.unwrap(), 8);
        assert_eq!(store.count_papers().unwrap(), 8);
    }

    #[test]
    fn test_fault_classification() {
        let readonly = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
            None,
        );
        assert!(to_fault(readonly).is_unavailable());

        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(!to_fault(constraint).is_unavailable());
    }
}
