//! The staged research pipeline.

pub mod collaborators;
pub mod dedup;
pub mod orchestrator;
pub mod stage;

#[cfg(test)]
pub mod testing;

pub use orchestrator::{Collaborators, Orchestrator};
