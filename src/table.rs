use rand::seq::index;
use rand::Rng;
use thiserror::Error;

/// Columnar view over borrowed data.
///
/// The last column is the response; the columns before it are predictors.
/// Subsets share the parent's column storage and differ only in `row_index`.
#[derive(Debug, Clone)]
pub struct Table<'a> {
    row_index: Vec<usize>,
    columns: Vec<&'a [f64]>,
}

impl<'a> Table<'a> {
    pub fn new(columns: Vec<&'a [f64]>) -> Result<Self, TableError> {
        if columns.len() < 2 || columns[0].is_empty() {
            return Err(TableError::EmptyTable);
        }

        let rows_len = columns[0].len();
        if columns.iter().skip(1).any(|c| c.len() != rows_len) {
            return Err(TableError::RowSizeMismatch);
        }

        if columns[columns.len() - 1].iter().any(|y| !y.is_finite()) {
            return Err(TableError::NonFiniteResponse);
        }

        Ok(Self {
            row_index: (0..rows_len).collect(),
            columns,
        })
    }

    pub fn response(&self) -> impl '_ + Iterator<Item = f64> + Clone {
        self.column(self.columns.len() - 1)
    }

    /// The predictor used by the comparison pipeline (column 0).
    pub fn predictor(&self) -> impl '_ + Iterator<Item = f64> + Clone {
        self.column(0)
    }

    pub fn column(&self, column_index: usize) -> impl '_ + Iterator<Item = f64> + Clone {
        self.rows().map(move |i| self.columns[column_index][i])
    }

    pub fn predictors_len(&self) -> usize {
        self.columns.len() - 1
    }

    pub fn rows_len(&self) -> usize {
        self.row_index.len()
    }

    fn rows(&self) -> impl '_ + Iterator<Item = usize> + Clone {
        self.row_index.iter().copied()
    }

    /// Samples `train_len` rows without replacement and returns the sampled
    /// subset together with its complement.
    ///
    /// The caller keeps the test subset non-empty (see `crate::split`).
    pub(crate) fn holdout_subsets<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        train_len: usize,
    ) -> (Self, Self) {
        debug_assert!(train_len >= 1);
        debug_assert!(train_len <= self.rows_len());

        let mut in_train = vec![false; self.rows_len()];
        for i in index::sample(rng, self.rows_len(), train_len) {
            in_train[i] = true;
        }

        let mut train = Vec::with_capacity(train_len);
        let mut test = Vec::with_capacity(self.rows_len() - train_len);
        for (i, &row) in self.row_index.iter().enumerate() {
            if in_train[i] {
                train.push(row);
            } else {
                test.push(row);
            }
        }

        (
            Self {
                row_index: train,
                columns: self.columns.clone(),
            },
            Self {
                row_index: test,
                columns: self.columns.clone(),
            },
        )
    }
}

#[derive(Debug, Error, Clone)]
pub enum TableError {
    #[error("table must have a predictor column, a response column and at least one row")]
    EmptyTable,

    #[error("some of columns have a different row count from others")]
    RowSizeMismatch,

    #[error("response column contains non finite numbers")]
    NonFiniteResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn new_rejects_degenerate_tables() {
        assert!(matches!(Table::new(vec![]), Err(TableError::EmptyTable)));
        assert!(matches!(
            Table::new(vec![&[1.0][..]]),
            Err(TableError::EmptyTable)
        ));
        assert!(matches!(
            Table::new(vec![&[1.0, 2.0][..], &[1.0][..]]),
            Err(TableError::RowSizeMismatch)
        ));
        assert!(matches!(
            Table::new(vec![&[1.0][..], &[f64::NAN][..]]),
            Err(TableError::NonFiniteResponse)
        ));
    }

    #[test]
    fn holdout_subsets_are_disjoint_and_cover_the_table() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let ys = [9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0];
        let table = Table::new(vec![&xs, &ys]).expect("valid table");

        let mut rng = StdRng::seed_from_u64(0);
        let (train, test) = table.holdout_subsets(&mut rng, 8);
        assert_eq!(train.rows_len(), 8);
        assert_eq!(test.rows_len(), 2);

        let mut seen: Vec<f64> = train.predictor().chain(test.predictor()).collect();
        seen.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
        assert_eq!(seen, xs);
    }

    #[test]
    fn subset_rows_pair_predictor_with_response() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.0, 10.0, 20.0, 30.0];
        let table = Table::new(vec![&xs, &ys]).expect("valid table");

        let mut rng = StdRng::seed_from_u64(7);
        let (train, test) = table.holdout_subsets(&mut rng, 2);
        for subset in [train, test] {
            for (x, y) in subset.predictor().zip(subset.response()) {
                assert_eq!(y, x * 10.0);
            }
        }
    }
}
