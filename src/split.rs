use crate::table::Table;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::num::NonZeroUsize;
use thiserror::Error;

/// Configuration of the repeated holdout split generator.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    splits: NonZeroUsize,
    train_fraction: f64,
    seed: Option<u64>,
}

impl SplitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn splits(mut self, splits: NonZeroUsize) -> Self {
        self.splits = splits;
        self
    }

    /// Fraction of rows sampled into each train subset. Must lie in (0, 1).
    pub fn train_fraction(mut self, fraction: f64) -> Self {
        self.train_fraction = fraction;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn splits_len(&self) -> usize {
        self.splits.get()
    }

    /// One RNG per split, all derived from the master seed so that a seeded
    /// run reproduces every split exactly.
    fn split_rngs(&self) -> impl Iterator<Item = StdRng> {
        let seed_u64 = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut seed = [0u8; 32];
        seed[0..8].copy_from_slice(&seed_u64.to_be_bytes()[..]);
        let mut rng = StdRng::from_seed(seed);
        (0..self.splits.get()).map(move |_| {
            let mut seed = [0u8; 32];
            rng.fill(&mut seed);
            StdRng::from_seed(seed)
        })
    }

    fn train_len(&self, rows_len: usize) -> Result<usize, SplitError> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(SplitError::InvalidTrainFraction(self.train_fraction));
        }

        if rows_len < 2 {
            return Err(SplitError::InsufficientRows { rows: rows_len });
        }

        let train_len = ((rows_len as f64) * self.train_fraction).round() as usize;
        let train_len = train_len.max(1);
        if train_len >= rows_len {
            return Err(SplitError::EmptyTestSubset {
                train_len,
                rows: rows_len,
            });
        }
        Ok(train_len)
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            splits: NonZeroUsize::new(100).expect("never fails"),
            train_fraction: 0.8,
            seed: None,
        }
    }
}

/// One holdout partition: disjoint train and test subsets of the same table.
#[derive(Debug)]
pub struct Split<'a> {
    pub train: Table<'a>,
    pub test: Table<'a>,
}

/// Generates the configured number of independent holdout splits.
pub fn generate<'a>(
    table: &Table<'a>,
    options: &SplitOptions,
) -> Result<Vec<Split<'a>>, SplitError> {
    let train_len = options.train_len(table.rows_len())?;
    Ok(options
        .split_rngs()
        .map(|mut rng| {
            let (train, test) = table.holdout_subsets(&mut rng, train_len);
            Split { train, test }
        })
        .collect())
}

#[derive(Debug, Error, Clone)]
pub enum SplitError {
    #[error("train fraction must lie strictly between 0 and 1, got {0}")]
    InvalidTrainFraction(f64),

    #[error("table has {rows} rows but holdout splitting needs at least 2")]
    InsufficientRows { rows: usize },

    #[error("train subset of {train_len} rows leaves no test rows out of {rows}")]
    EmptyTestSubset { train_len: usize, rows: usize },
}
