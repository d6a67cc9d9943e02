//! PDF download over HTTP.

use crate::error::Fault;
use crate::models::WorkItem;
use crate::pipeline::collaborators::Downloader;
use crate::pipeline::dedup::normalize_title;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Longest file stem derived from a title.
const MAX_STEM_CHARS: usize = 100;

/// Hex digits of the identity digest appended to title-derived names.
const DIGEST_CHARS: usize = 12;

pub const UNPAYWALL_API_URL: &str = "https://api.unpaywall.org/v2";

/// How often a request is attempted, and the first backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed, before jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Where a PDF may come from, in the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
    Url(String),
    /// Open-access location looked up by DOI.
    Unpaywall(String),
}

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    is_oa: bool,
    best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

impl UnpaywallResponse {
    fn pdf_url(self) -> Option<String> {
        if !self.is_oa {
            return None;
        }
        self.best_oa_location
            .and_then(|location| location.url_for_pdf)
            .filter(|url| !url.is_empty())
    }
}

/// Downloads papers into a local directory, one file per paper.
pub struct HttpDownloader {
    pdf_dir: PathBuf,
    client: reqwest::Client,
    show_progress: bool,
    retry: RetryPolicy,
    /// Contact address required by the Unpaywall API; lookups are off without it.
    unpaywall_email: Option<String>,
    unpaywall_api: String,
}

impl HttpDownloader {
    pub fn new(pdf_dir: impl Into<PathBuf>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("litscout/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            pdf_dir: pdf_dir.into(),
            client,
            show_progress: false,
            retry: RetryPolicy::default(),
            unpaywall_email: None,
            unpaywall_api: UNPAYWALL_API_URL.to_string(),
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_unpaywall(mut self, email: Option<String>) -> Self {
        self.unpaywall_email = email.filter(|e| !e.trim().is_empty());
        self
    }

    /// Where the PDF for `item` is stored, if it has an identity to name it by.
    pub fn pdf_path(&self, item: &WorkItem) -> Option<PathBuf> {
        file_name(item).map(|name| self.pdf_dir.join(name))
    }

    fn candidates(&self, item: &WorkItem) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        if let Some(url) = item.pdf_url.as_deref().filter(|u| !u.is_empty()) {
            candidates.push(Candidate::Url(url.to_string()));
        }
        if let Some(doi) = item.doi.as_deref().filter(|d| !d.is_empty()) {
            candidates.push(Candidate::Url(format!("https://doi.org/{}", doi)));
            if self.unpaywall_email.is_some() {
                candidates.push(Candidate::Unpaywall(doi.to_string()));
            }
        }
        candidates
    }

    /// GET `url`, retrying transport and HTTP status failures.
    async fn fetch(&self, url: &str) -> Result<reqwest::Response> {
        let client = &self.client;
        with_retries(self.retry, url, move || async move {
            let response = client
                .get(url)
                .send()
                .await
                .with_context(|| format!("Request to {} failed", url))?
                .error_for_status()?;
            Ok(response)
        })
        .await
    }

    /// Open-access PDF location for `doi`, if Unpaywall knows one.
    async fn unpaywall_pdf_url(&self, doi: &str) -> Result<Option<String>> {
        let Some(ref email) = self.unpaywall_email else {
            return Ok(None);
        };

        let lookup = reqwest::Url::parse_with_params(
            &format!("{}/{}", self.unpaywall_api, doi),
            &[("email", email.as_str())],
        )
        .context("Invalid Unpaywall URL")?;

        info!("Looking up open-access PDF on Unpaywall: {}", doi);
        let response: UnpaywallResponse = self
            .fetch(lookup.as_str())
            .await?
            .json()
            .await
            .context("Invalid Unpaywall response")?;

        let url = response.pdf_url();
        if url.is_none() {
            debug!("Unpaywall has no open-access PDF for {}", doi);
        }
        Ok(url)
    }

    async fn download(&self, url: &str, target: &Path) -> Result<()> {
        info!("Downloading PDF: {}", url);

        let mut response = self.fetch(url).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !content_type.contains("pdf") {
            bail!("Response is not a PDF: {}", content_type);
        }

        let progress = self.progress_bar(response.content_length());
        let partial = target.with_extension("pdf.part");
        let mut file = tokio::fs::File::create(&partial)
            .await
            .with_context(|| format!("Failed to create {}", partial.display()))?;

        while let Some(chunk) = response.chunk().await.context("Download interrupted")? {
            file.write_all(&chunk).await?;
            if let Some(ref pb) = progress {
                pb.inc(chunk.len() as u64);
            }
        }
        file.flush().await?;
        drop(file);

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        tokio::fs::rename(&partial, target)
            .await
            .with_context(|| format!("Failed to move download to {}", target.display()))?;
        info!("PDF saved: {}", target.display());
        Ok(())
    }

    fn progress_bar(&self, length: Option<u64>) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new(length.unwrap_or(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn retrieve(&self, item: &WorkItem) -> Result<Option<PathBuf>, Fault> {
        tokio::fs::create_dir_all(&self.pdf_dir).await.map_err(|e| {
            Fault::unavailable(format!(
                "cannot create PDF directory {}: {}",
                self.pdf_dir.display(),
                e
            ))
        })?;

        let Some(target) = self.pdf_path(item) else {
            debug!("No title, arXiv id, DOI or PDF link to name the download by");
            return Ok(None);
        };
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!("PDF already present: {}", target.display());
            return Ok(Some(target));
        }

        let candidates = self.candidates(item);
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut last_error = String::from("no open-access PDF found");
        for candidate in &candidates {
            let url = match candidate {
                Candidate::Url(url) => url.clone(),
                Candidate::Unpaywall(doi) => match self.unpaywall_pdf_url(doi).await {
                    Ok(Some(url)) => url,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Unpaywall lookup for {} failed: {:#}", doi, e);
                        last_error = format!("{:#}", e);
                        continue;
                    }
                },
            };

            match self.download(&url, &target).await {
                Ok(()) => return Ok(Some(target)),
                Err(e) => {
                    warn!("Download from {} failed: {:#}", url, e);
                    last_error = format!("{:#}", e);
                }
            }
        }

        Err(Fault::item(format!("no PDF downloaded: {}", last_error)))
    }
}

/// Run `op` until it succeeds or `policy.attempts` are used up, sleeping
/// `base * 2^attempt` plus up to a second of jitter between attempts.
async fn with_retries<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < attempts => {
                let backoff = policy.backoff(attempt);
                let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                warn!(
                    "{} failed (attempt {}/{}), retrying in {}s: {:#}",
                    what,
                    attempt + 1,
                    attempts,
                    backoff.as_secs(),
                    e
                );
                tokio::time::sleep(backoff + jitter).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// File name for an item.
///
/// arXiv papers are named by id. Otherwise the sanitized title is suffixed
/// with a digest of the item's identity: its normalized title, or for
/// untitled items its DOI or PDF link. An untitled item with neither
/// has no name and is never matched against files on disk.
pub fn file_name(item: &WorkItem) -> Option<String> {
    if let Some(id) = item.arxiv_id.as_deref().filter(|id| !id.is_empty()) {
        return Some(format!("{}.pdf", id.replace('/', "_")));
    }

    let identity = if item.title.trim().is_empty() {
        let doi = item.doi.as_deref().filter(|d| !d.is_empty());
        let url = item.pdf_url.as_deref().filter(|u| !u.is_empty());
        match (doi, url) {
            (Some(doi), _) => format!("doi\n{}", doi),
            (None, Some(url)) => format!("url\n{}", url),
            (None, None) => return None,
        }
    } else {
        format!("title\n{}", normalize_title(&item.title))
    };
    let digest = short_digest(&identity);

    let stem: String = item
        .title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .take(MAX_STEM_CHARS)
        .collect();
    let stem = stem.trim();

    Some(if stem.is_empty() {
        format!("untitled_{}.pdf", digest)
    } else {
        format!("{}_{}.pdf", stem, digest)
    })
}

fn short_digest(identity: &str) -> String {
    let mut digest = hex::encode(Sha256::digest(identity.as_bytes()));
    digest.truncate(DIGEST_CHARS);
    digest
}
