//! Error types.
//!
//! Collaborators report failures as a [`Fault`], which carries the blast
//! radius of the failure: a single item, or the whole collaborator. The
//! stage runner turns item faults into logged [`ItemError`]s and stage
//! faults into a [`StageError`] that aborts the run.

use crate::models::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a collaborator call.
#[derive(Debug, Error)]
pub enum Fault {
    /// Only the item being processed is affected.
    #[error("{0}")]
    Item(String),

    /// The collaborator itself cannot serve the stage.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl Fault {
    pub fn item(reason: impl Into<String>) -> Self {
        Fault::Item(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Fault::Unavailable(reason.into())
    }

    #[cfg(test)]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Fault::Unavailable(_))
    }
}

/// A single work item failed a stage.
#[derive(Debug, Error)]
#[error("{stage}: '{title}' dropped: {reason}")]
pub struct ItemError {
    pub stage: Stage,
    pub title: String,
    pub reason: String,
}

/// A stage could not run at all; the pipeline run is aborted.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {reason}")]
pub struct StageError {
    pub stage: Stage,
    pub reason: String,
}

impl StageError {
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Configuration is missing or malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A schedule entry could not be added.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("hour must be 0-23, got {0}")]
    Hour(u32),

    #[error("minute must be 0-59, got {0}")]
    Minute(u32),

    #[error("unknown weekday: {0}")]
    Weekday(String),
}
