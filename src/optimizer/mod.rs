//! Self-play prompt optimization.
//!
//! Searches for analysis instructions that make the model produce more
//! complete structured output, without labels. Each round a proposer
//! rewrites the current best prompt and an evaluator scores both prompts
//! against the same fresh sample of paper texts using [`rubric_score`].
//! The candidate replaces the best prompt only if it scores strictly
//! higher. Samples change between rounds, so the search is a noisy
//! hill-climb rather than a monotonic one.

pub mod rubric;

pub use rubric::rubric_score;

use crate::error::{Fault, StageError};
use crate::models::Stage;
use crate::pipeline::collaborators::Generator;
use crate::prompts::{self, MAX_EVALUATION_CHARS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Optimizer parameters.
#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub enabled: bool,
    pub rounds: usize,
    pub samples_per_round: usize,
    /// Research domain, used to steer the proposer.
    pub domain: String,
    pub keywords: Vec<String>,
}

/// Result of an optimization search.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationState {
    pub best_prompt: String,
    /// Round score of the best prompt in the last completed round.
    pub best_score: f64,
    pub rounds_completed: usize,
}

impl OptimizationState {
    fn initial(prompt: &str) -> Self {
        Self {
            best_prompt: prompt.to_string(),
            best_score: 0.0,
            rounds_completed: 0,
        }
    }
}

/// A proposed prompt and its score for one round.
#[derive(Debug, Clone)]
struct PromptCandidate {
    text: String,
    score: f64,
}

/// Source of sample indices.
pub trait Sampler: Send {
    /// `min(amount, population)` distinct indices below `population`.
    fn sample(&mut self, population: usize, amount: usize) -> Vec<usize>;
}

/// Uniform sampling without replacement.
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    #[allow(dead_code)] // Reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, population: usize, amount: usize) -> Vec<usize> {
        let amount = amount.min(population);
        rand::seq::index::sample(&mut self.rng, population, amount).into_vec()
    }
}

/// Prompt optimizer.
pub struct PromptOptimizer {
    proposer: Arc<dyn Generator>,
    evaluator: Arc<dyn Generator>,
    settings: OptimizerSettings,
    sampler: Mutex<Box<dyn Sampler>>,
}

impl PromptOptimizer {
    pub fn new(
        proposer: Arc<dyn Generator>,
        evaluator: Arc<dyn Generator>,
        settings: OptimizerSettings,
        sampler: Box<dyn Sampler>,
    ) -> Self {
        Self {
            proposer,
            evaluator,
            settings,
            sampler: Mutex::new(sampler),
        }
    }

    /// Search for a better prompt than `initial`, scoring against `corpus`.
    pub async fn optimize(
        &self,
        initial: &str,
        corpus: &[String],
    ) -> Result<OptimizationState, StageError> {
        let mut state = OptimizationState::initial(initial);

        if !self.settings.enabled || self.settings.rounds == 0 {
            debug!("Prompt optimization disabled, using initial prompt");
            return Ok(state);
        }
        if corpus.is_empty() {
            warn!("No sample texts for prompt optimization, using initial prompt");
            return Ok(state);
        }

        info!(
            "Optimizing analysis prompt: {} rounds, {} samples per round",
            self.settings.rounds, self.settings.samples_per_round
        );

        for round in 1..=self.settings.rounds {
            info!("Optimization round {}/{}", round, self.settings.rounds);
            state.rounds_completed = round;

            let Some(text) = self.propose(&state.best_prompt).await? else {
                continue;
            };

            let samples = self.draw_samples(corpus);
            let candidate = PromptCandidate {
                score: self.evaluate(&text, &samples).await?,
                text,
            };
            let current_score = self.evaluate(&state.best_prompt, &samples).await?;

            info!(
                "Current best scored {:.3}, candidate scored {:.3}",
                current_score, candidate.score
            );

            if candidate.score > current_score {
                info!("Adopting candidate prompt");
                state.best_prompt = candidate.text;
                state.best_score = candidate.score;
            } else {
                state.best_score = current_score;
            }
        }

        info!(
            "Prompt optimization finished with score {:.3}",
            state.best_score
        );
        Ok(state)
    }

    /// Ask the proposer for a rewrite. `None` skips the round.
    async fn propose(&self, current: &str) -> Result<Option<String>, StageError> {
        let meta = prompts::optimization_prompt(
            current,
            &self.settings.domain,
            &self.settings.keywords,
        );

        match self.proposer.generate(&meta).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    warn!("Proposer returned an empty prompt, skipping round");
                    Ok(None)
                } else {
                    Ok(Some(text.to_string()))
                }
            }
            Err(Fault::Item(reason)) => {
                warn!("Proposer failed, skipping round: {}", reason);
                Ok(None)
            }
            Err(Fault::Unavailable(reason)) => Err(StageError::new(
                Stage::Analyze,
                format!("prompt proposer unavailable: {}", reason),
            )),
        }
    }

    fn draw_samples<'a>(&self, corpus: &'a [String]) -> Vec<&'a str> {
        let indices = match self.sampler.lock() {
            Ok(mut sampler) => sampler.sample(corpus.len(), self.settings.samples_per_round),
            Err(poisoned) => poisoned
                .into_inner()
                .sample(corpus.len(), self.settings.samples_per_round),
        };
        indices
            .into_iter()
            .filter_map(|idx| corpus.get(idx).map(String::as_str))
            .collect()
    }

    /// Mean rubric score of `prompt` over `samples`.
    async fn evaluate(&self, prompt: &str, samples: &[&str]) -> Result<f64, StageError> {
        if samples.is_empty() {
            return Ok(0.0);
        }

        let mut total = 0.0;
        for sample in samples {
            let text = prompts::truncate_chars(sample, MAX_EVALUATION_CHARS);
            let rendered = prompts::render(prompt, text);

            match self.evaluator.generate(&rendered).await {
                Ok(response) => total += rubric_score(&response),
                Err(Fault::Item(reason)) => {
                    debug!("Evaluation failed, scoring sample as 0: {}", reason);
                }
                Err(Fault::Unavailable(reason)) => {
                    return Err(StageError::new(
                        Stage::Analyze,
                        format!("prompt evaluator unavailable: {}", reason),
                    ));
                }
            }
        }

        Ok(total / samples.len() as f64)
    }
}
