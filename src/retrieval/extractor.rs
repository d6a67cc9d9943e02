//! Text extraction with the `pdftotext` tool.

use crate::error::Fault;
use crate::pipeline::collaborators::Extractor;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Runs `pdftotext -layout <file> -` and returns its output.
pub struct PdftotextExtractor {
    binary: String,
}

impl PdftotextExtractor {
    pub fn new() -> Self {
        Self::with_binary("pdftotext")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PdftotextExtractor {
    async fn extract(&self, artifact: &Path) -> Result<Option<String>, Fault> {
        if !artifact.is_file() {
            return Err(Fault::item(format!("file not found: {}", artifact.display())));
        }

        let output = Command::new(&self.binary)
            .arg("-layout")
            .arg(artifact)
            .arg("-")
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Fault::unavailable(format!(
                    "{} not found. Install poppler-utils to extract PDF text",
                    self.binary
                )),
                _ => Fault::item(format!("failed to run {}: {}", self.binary, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Fault::item(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("Extracted {} chars from {}", text.len(), artifact.display());

        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let file = NamedTempFile::new().unwrap();
        let extractor = PdftotextExtractor::with_binary("litscout-no-such-binary");

        let fault = extractor.extract(file.path()).await.unwrap_err();
        assert!(fault.is_unavailable());
    }

    #[tokio::test]
    async fn test_missing_file_is_item_fault() {
        let extractor = PdftotextExtractor::new();
        let fault = extractor
            .extract(Path::new("/nonexistent/paper.pdf"))
            .await
            .unwrap_err();
        assert!(!fault.is_unavailable());
    }

    #[tokio::test]
    async fn test_failing_tool_is_item_fault() {
        let file = NamedTempFile::new().unwrap();
        let extractor = PdftotextExtractor::with_binary("false");

        let fault = extractor.extract(file.path()).await.unwrap_err();
        assert!(!fault.is_unavailable());
    }

    #[tokio::test]
    async fn test_blank_output_is_no_result() {
        let file = NamedTempFile::new().unwrap();
        let extractor = PdftotextExtractor::with_binary("true");

        assert!(extractor.extract(file.path()).await.unwrap().is_none());
    }
}
