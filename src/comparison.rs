use crate::functions;
use crate::model::{FitError, ModelKind, ScoreError};
use crate::split::{self, Split, SplitError, SplitOptions};
use crate::table::Table;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;

/// Configuration of a repeated-holdout model comparison.
#[derive(Debug, Clone)]
pub struct ComparisonOptions {
    split: SplitOptions,
    models: Vec<ModelKind>,
    parallel: bool,
}

impl ComparisonOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn split(mut self, options: SplitOptions) -> Self {
        self.split = options;
        self
    }

    pub fn models(mut self, models: Vec<ModelKind>) -> Self {
        self.models = models;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Fits and scores every model variant on every holdout split.
    ///
    /// Splits are generated once and shared by all variants; each split's
    /// work is a pure function of its own train/test pair, so the parallel
    /// path changes throughput only, never results.
    pub fn run(&self, table: &Table) -> Result<Comparison, ComparisonError> {
        if self.models.is_empty() {
            return Err(ComparisonError::NoModels);
        }

        let splits = split::generate(table, &self.split)?;
        let per_split = if self.parallel {
            splits
                .par_iter()
                .enumerate()
                .map(|(i, split)| evaluate_split(i, split, &self.models))
                .collect::<Result<Vec<_>, _>>()
        } else {
            splits
                .iter()
                .enumerate()
                .map(|(i, split)| evaluate_split(i, split, &self.models))
                .collect::<Result<Vec<_>, _>>()
        }?;

        Ok(Comparison {
            models: self.models.clone(),
            scores: per_split.into_iter().flatten().collect(),
        })
    }
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            split: SplitOptions::default(),
            models: vec![ModelKind::Linear, ModelKind::Smooth, ModelKind::Wiggly],
            parallel: false,
        }
    }
}

fn evaluate_split(
    split_index: usize,
    split: &Split,
    models: &[ModelKind],
) -> Result<Vec<SplitScore>, ComparisonError> {
    models
        .iter()
        .map(|&model| {
            let fitted = model.fit(&split.train).map_err(|source| ComparisonError::Fit {
                split: split_index,
                model,
                source,
            })?;
            let rmse = fitted
                .rmse(&split.test)
                .map_err(|source| ComparisonError::Score {
                    split: split_index,
                    model,
                    source,
                })?;
            Ok(SplitScore {
                split: split_index,
                model,
                rmse,
            })
        })
        .collect()
}

/// One entry of the long-form score collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitScore {
    pub split: usize,
    pub model: ModelKind,
    pub rmse: f64,
}

/// Mean and spread of a variant's scores across all splits.
#[derive(Debug, Clone, Copy)]
pub struct ModelSummary {
    pub model: ModelKind,
    pub mean: f64,
    pub stddev: f64,
}

#[derive(Debug)]
pub struct Comparison {
    models: Vec<ModelKind>,
    scores: Vec<SplitScore>,
}

impl Comparison {
    /// Long-form (split, model, rmse) scores, split-major.
    pub fn scores(&self) -> &[SplitScore] {
        &self.scores
    }

    /// Per-variant aggregates, in the order the variants were configured.
    pub fn summaries(&self) -> Vec<ModelSummary> {
        self.models
            .iter()
            .map(|&model| {
                let rmses = self
                    .scores
                    .iter()
                    .filter(move |s| s.model == model)
                    .map(|s| s.rmse);
                let (mean, stddev) = functions::mean_and_stddev(rmses);
                ModelSummary {
                    model,
                    mean,
                    stddev,
                }
            })
            .collect()
    }
}

#[derive(Debug, Error, Clone)]
pub enum ComparisonError {
    #[error("no model variants to compare")]
    NoModels,

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("fitting the {name} model failed on split {split}: {source}", name = .model.name())]
    Fit {
        split: usize,
        model: ModelKind,
        source: FitError,
    },

    #[error("scoring the {name} model failed on split {split}: {source}", name = .model.name())]
    Score {
        split: usize,
        model: ModelKind,
        source: ScoreError,
    },
}
