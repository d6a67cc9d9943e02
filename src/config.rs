//! Configuration file handling.
//!
//! This module handles loading, merging and validating configuration
//! from `.litscout.toml` files.

use crate::cli::PipelineArgs;
use crate::error::ConfigError;
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".litscout.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// What to search for.
    #[serde(default)]
    pub research: ResearchConfig,

    /// Paper sources.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Where papers and the database live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Analysis model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Prompt optimizer settings.
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Recurring run times for `litscout schedule`.
    #[serde(default = "default_schedule")]
    pub schedule: Vec<ScheduleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            research: ResearchConfig::default(),
            sources: SourcesConfig::default(),
            storage: StorageConfig::default(),
            model: ModelConfig::default(),
            optimizer: OptimizerConfig::default(),
            report: ReportConfig::default(),
            schedule: default_schedule(),
        }
    }
}

/// Research focus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Research domain, e.g. "self-evolving agents". Required.
    #[serde(default)]
    pub domain: String,

    /// Search keywords. The domain is searched when empty.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// First publication year to include.
    #[serde(default = "default_start_year")]
    pub start_year: i32,

    /// Last publication year to include (defaults to the current year).
    #[serde(default)]
    pub end_year: Option<i32>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            keywords: Vec::new(),
            start_year: default_start_year(),
            end_year: None,
        }
    }
}

impl ResearchConfig {
    /// The configured end year, or the current year.
    pub fn effective_end_year(&self) -> i32 {
        self.end_year.unwrap_or_else(current_year)
    }
}

fn current_year() -> i32 {
    Local::now().year()
}

fn default_start_year() -> i32 {
    current_year() - 2
}

/// Paper source settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub arxiv: ArxivConfig,

    #[serde(default)]
    pub google_scholar: GoogleScholarConfig,
}

/// arXiv search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum papers per search.
    #[serde(default = "default_arxiv_max_results")]
    pub max_results: usize,

    /// arXiv categories to restrict the search to, e.g. "cs.AI".
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: default_arxiv_max_results(),
            categories: default_categories(),
        }
    }
}

fn default_arxiv_max_results() -> usize {
    100
}

fn default_categories() -> Vec<String> {
    vec!["cs.AI", "cs.LG", "cs.CL"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Google Scholar settings. Accepted for compatibility; not searched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleScholarConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scholar_max_results")]
    pub max_results: usize,
}

impl Default for GoogleScholarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_results: default_scholar_max_results(),
        }
    }
}

fn default_scholar_max_results() -> usize {
    50
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for downloaded PDFs.
    #[serde(default = "default_pdf_dir")]
    pub pdf_dir: PathBuf,

    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Timeout for a single PDF download.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,

    /// Attempts per download request, including the first.
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,

    /// Contact email for Unpaywall open-access lookups by DOI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpaywall_email: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pdf_dir: default_pdf_dir(),
            db_path: default_db_path(),
            download_timeout_seconds: default_download_timeout(),
            download_retries: default_download_retries(),
            unpaywall_email: None,
        }
    }
}

fn default_pdf_dir() -> PathBuf {
    PathBuf::from("data/pdfs")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/db/papers.db")
}

fn default_download_timeout() -> u64 {
    60
}

fn default_download_retries() -> u32 {
    3
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model used for paper analysis.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "qwen3:8b".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout() -> u64 {
    300
}

/// Prompt optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Optimization rounds. Zero keeps the initial prompt.
    #[serde(default = "default_rounds")]
    pub rounds: usize,

    /// Paper texts scored per round.
    #[serde(default = "default_samples_per_round")]
    pub samples_per_round: usize,

    /// Model that rewrites prompts (defaults to the analysis model).
    #[serde(default)]
    pub proposer_model: Option<String>,

    /// Model that answers candidate prompts (defaults to the analysis model).
    #[serde(default)]
    pub evaluator_model: Option<String>,

    /// Initial analysis prompt; must contain `{extracted_text}`.
    #[serde(default)]
    pub prompt_template: Option<PathBuf>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rounds: default_rounds(),
            samples_per_round: default_samples_per_round(),
            proposer_model: None,
            evaluator_model: None,
            prompt_template: None,
        }
    }
}

fn default_rounds() -> usize {
    3
}

fn default_samples_per_round() -> usize {
    3
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory reports are written to.
    #[serde(default = "default_report_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub format: ReportFormat,

    /// Include text bar charts for the distributions.
    #[serde(default = "default_true")]
    pub generate_charts: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_report_dir(),
            format: ReportFormat::Markdown,
            generate_charts: true,
        }
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("data/reports")
}

/// One recurring run time. Weekly when `weekday` is set, daily otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<String>,
}

fn default_schedule() -> Vec<ScheduleConfig> {
    vec![ScheduleConfig {
        hour: 9,
        minute: 0,
        weekday: None,
    }]
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>, ConfigError> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line override the file.
    pub fn merge_with_args(&mut self, args: &PipelineArgs) {
        if let Some(ref domain) = args.domain {
            self.research.domain = domain.clone();
        }
        if let Some(start_year) = args.start_year {
            self.research.start_year = start_year;
        }
        if let Some(end_year) = args.end_year {
            self.research.end_year = Some(end_year);
        }
        if let Some(ref keywords) = args.keywords {
            self.research.keywords = keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
    }

    /// Check that the merged configuration can drive a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.research.domain.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "research.domain must be set (in the config file or with --domain)".to_string(),
            ));
        }

        let end_year = self.research.effective_end_year();
        if self.research.start_year > end_year {
            return Err(ConfigError::Invalid(format!(
                "start year {} is after end year {}",
                self.research.start_year, end_year
            )));
        }

        if !self.model.ollama_url.starts_with("http://")
            && !self.model.ollama_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(
                "model.ollama_url must start with 'http://' or 'https://'".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid(
                "model.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.model.timeout_seconds == 0 || self.storage.download_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least 1 second".to_string(),
            ));
        }

        if self.storage.download_retries == 0 {
            return Err(ConfigError::Invalid(
                "storage.download_retries must be at least 1".to_string(),
            ));
        }

        if self.sources.arxiv.enabled && self.sources.arxiv.max_results == 0 {
            return Err(ConfigError::Invalid(
                "sources.arxiv.max_results must be at least 1".to_string(),
            ));
        }

        if self.optimizer.enabled && self.optimizer.rounds > 0 && self.optimizer.samples_per_round == 0
        {
            return Err(ConfigError::Invalid(
                "optimizer.samples_per_round must be at least 1".to_string(),
            ));
        }

        if self.sources.google_scholar.enabled {
            warn!("Google Scholar is not supported and will be skipped");
        }
        if !self.sources.arxiv.enabled {
            warn!("No paper sources enabled; runs will find nothing");
        }

        Ok(())
    }

    /// Model that rewrites prompts.
    pub fn proposer_model(&self) -> &str {
        self.optimizer
            .proposer_model
            .as_deref()
            .unwrap_or(&self.model.name)
    }

    /// Model that answers candidate prompts.
    pub fn evaluator_model(&self) -> &str {
        self.optimizer
            .evaluator_model
            .as_deref()
            .unwrap_or(&self.model.name)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
