//! Paper sources.

pub mod arxiv;

pub use arxiv::{ArxivQuery, ArxivSource};
