//! Full-text retrieval: download and text extraction.

pub mod downloader;
pub mod extractor;

pub use downloader::{HttpDownloader, RetryPolicy};
pub use extractor::PdftotextExtractor;
