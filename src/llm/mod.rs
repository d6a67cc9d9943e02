//! Language model access.
//!
//! [`OllamaClient`] talks to a local Ollama server and serves as the
//! generator for analysis and prompt optimization. [`LlmAnalyzer`] turns
//! its answers into structured fields.

pub mod analyzer;
pub mod ollama;

pub use analyzer::LlmAnalyzer;
pub use ollama::{OllamaClient, OllamaConfig};
