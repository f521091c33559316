use crate::functions;
use crate::table::Table;
use itertools::Itertools as _;
use nalgebra::{DMatrix, DVector, SVD};
use ordered_float::OrderedFloat;
use thiserror::Error;

/// The closed set of regression forms under comparison.
///
/// All variants share the same capability: fit on a train subset, predict a
/// response from a predictor value, score against a test subset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelKind {
    /// Ordinary least squares of the response on the predictor.
    Linear,
    /// Penalized cubic spline with an automatically chosen smoothness penalty.
    Smooth,
    /// The spline family with an enlarged basis and a negligible penalty;
    /// deliberately overfits the training subset.
    Wiggly,
    /// Least squares on the predictor plus a hinge term that lets the slope
    /// change at `breakpoint`.
    Piecewise { breakpoint: f64 },
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Smooth => "smooth",
            Self::Wiggly => "wiggly",
            Self::Piecewise { .. } => "piecewise",
        }
    }

    pub fn fit(&self, train: &Table) -> Result<FittedModel, FitError> {
        let xs = train.predictor().collect::<Vec<_>>();
        let ys = train.response().collect::<Vec<_>>();

        let m = functions::mean(xs.iter().copied());
        let variance = functions::mean(xs.iter().map(|x| (x - m).powi(2)));
        if variance <= f64::EPSILON * (1.0 + m * m) {
            return Err(FitError::ConstantPredictor);
        }

        let (basis, penalty) = match *self {
            Self::Linear => (Basis::Linear, Penalty::None),
            Self::Piecewise { breakpoint } => (Basis::Hinge { breakpoint }, Penalty::None),
            Self::Smooth => (
                Basis::spline_from_quantiles(&xs, SMOOTH_KNOTS),
                Penalty::Gcv,
            ),
            Self::Wiggly => (
                Basis::spline_from_quantiles(&xs, WIGGLY_KNOTS),
                Penalty::Fixed(WIGGLY_PENALTY),
            ),
        };

        if xs.len() < basis.len() {
            return Err(FitError::InsufficientRows {
                rows: xs.len(),
                parameters: basis.len(),
            });
        }

        let coefficients = fit_least_squares(&basis, &xs, &ys, penalty)?;
        Ok(FittedModel {
            kind: *self,
            basis,
            coefficients,
        })
    }
}

const SMOOTH_KNOTS: usize = 10;
const WIGGLY_KNOTS: usize = 24;
const WIGGLY_PENALTY: f64 = 1e-9;

/// A fitted regression form: a basis expansion plus its coefficient vector.
#[derive(Debug, Clone)]
pub struct FittedModel {
    kind: ModelKind,
    basis: Basis,
    coefficients: DVector<f64>,
}

impl FittedModel {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.basis
            .evaluate(x)
            .iter()
            .zip(self.coefficients.iter())
            .map(|(b, c)| b * c)
            .sum()
    }

    /// Root-mean-squared prediction error over every row of `test`.
    pub fn rmse(&self, test: &Table) -> Result<f64, ScoreError> {
        if test.rows_len() == 0 {
            return Err(ScoreError::EmptyTestSubset);
        }

        Ok(functions::rmse(
            test.predictor()
                .zip(test.response())
                .map(|(x, y)| y - self.predict(x)),
        ))
    }
}

#[derive(Debug, Clone, Copy)]
enum Penalty {
    None,
    Fixed(f64),
    Gcv,
}

#[derive(Debug, Clone)]
enum Basis {
    /// 1, x
    Linear,
    /// 1, x, max(0, x - breakpoint)
    Hinge { breakpoint: f64 },
    /// 1, x, x^2, x^3, (x - k_1)^3_+ ... (x - k_m)^3_+
    Spline { knots: Vec<f64> },
}

impl Basis {
    /// Interior knots at evenly spaced quantiles of the training predictor.
    /// Ties in the data collapse to a single knot.
    fn spline_from_quantiles(xs: &[f64], count: usize) -> Self {
        let sorted = xs
            .iter()
            .copied()
            .sorted_by_key(|&x| OrderedFloat(x))
            .collect::<Vec<_>>();
        let knots = (1..=count)
            .map(|j| {
                let pos = j as f64 / (count + 1) as f64 * (sorted.len() - 1) as f64;
                let lo = pos.floor() as usize;
                let hi = pos.ceil() as usize;
                let w = pos - lo as f64;
                sorted[lo] * (1.0 - w) + sorted[hi] * w
            })
            .dedup()
            .collect();
        Self::Spline { knots }
    }

    fn len(&self) -> usize {
        match self {
            Self::Linear => 2,
            Self::Hinge { .. } => 3,
            Self::Spline { knots } => 4 + knots.len(),
        }
    }

    /// Number of trailing coefficients subject to the smoothness penalty.
    fn penalized_len(&self) -> usize {
        match self {
            Self::Spline { knots } => knots.len(),
            _ => 0,
        }
    }

    fn evaluate(&self, x: f64) -> Vec<f64> {
        match self {
            Self::Linear => vec![1.0, x],
            Self::Hinge { breakpoint } => vec![1.0, x, (x - breakpoint).max(0.0)],
            Self::Spline { knots } => {
                let mut row = Vec::with_capacity(4 + knots.len());
                row.extend([1.0, x, x * x, x * x * x]);
                row.extend(knots.iter().map(|&k| (x - k).max(0.0).powi(3)));
                row
            }
        }
    }
}

fn design_matrix(basis: &Basis, xs: &[f64]) -> DMatrix<f64> {
    let mut matrix = DMatrix::zeros(xs.len(), basis.len());
    for (i, &x) in xs.iter().enumerate() {
        for (j, value) in basis.evaluate(x).into_iter().enumerate() {
            matrix[(i, j)] = value;
        }
    }
    matrix
}

fn fit_least_squares(
    basis: &Basis,
    xs: &[f64],
    ys: &[f64],
    penalty: Penalty,
) -> Result<DVector<f64>, FitError> {
    let x = design_matrix(basis, xs);
    let y = DVector::from_column_slice(ys);
    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &y;

    let lambda = match penalty {
        Penalty::None => return solve(xtx, &xty),
        Penalty::Fixed(lambda) => lambda,
        Penalty::Gcv => select_penalty_by_gcv(&x, &xtx, &xty, &y, basis.penalized_len())?,
    };
    solve(penalize(&xtx, basis.penalized_len(), lambda), &xty)
}

fn penalize(xtx: &DMatrix<f64>, penalized: usize, lambda: f64) -> DMatrix<f64> {
    let mut out = xtx.clone();
    let k = out.nrows();
    for j in (k - penalized)..k {
        out[(j, j)] += lambda;
    }
    out
}

/// Solves `xtx * b = xty` through an SVD pseudo-inverse with a scaled cutoff.
fn solve(xtx: DMatrix<f64>, xty: &DVector<f64>) -> Result<DVector<f64>, FitError> {
    let k = xtx.nrows();
    let svd = SVD::new(xtx, true, true);
    let epsilon = f64::EPSILON * k as f64 * svd.singular_values.max();
    let coefficients = svd.solve(xty, epsilon).map_err(FitError::Singular)?;
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(FitError::Singular("non finite coefficients"));
    }
    Ok(coefficients)
}

/// Picks the smoothness penalty minimizing generalized cross-validation,
/// `n * rss / (n - edf)^2`, over a log-spaced grid.
fn select_penalty_by_gcv(
    x: &DMatrix<f64>,
    xtx: &DMatrix<f64>,
    xty: &DVector<f64>,
    y: &DVector<f64>,
    penalized: usize,
) -> Result<f64, FitError> {
    let n = y.len() as f64;
    let mut best: Option<(f64, f64)> = None;

    for i in 0..25 {
        let lambda = 10f64.powf(-8.0 + 0.5 * i as f64);
        let regularized = penalize(xtx, penalized, lambda);
        let edf = match effective_dof(regularized.clone(), xtx) {
            Ok(edf) => edf,
            Err(_) => continue,
        };
        if n - edf <= 0.0 {
            continue;
        }

        let coefficients = match solve(regularized, xty) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let rss = (y - x * coefficients).norm_squared();
        let score = n * rss / ((n - edf) * (n - edf));
        if best.map_or(true, |(s, _)| score < s) {
            best = Some((score, lambda));
        }
    }

    best.map(|(_, lambda)| lambda)
        .ok_or(FitError::Singular("no admissible smoothing penalty"))
}

/// Effective degrees of freedom: trace of `(X'X + lambda D)^-1 X'X`.
fn effective_dof(regularized: DMatrix<f64>, xtx: &DMatrix<f64>) -> Result<f64, FitError> {
    let k = regularized.nrows();
    let svd = SVD::new(regularized, true, true);
    let epsilon = f64::EPSILON * k as f64 * svd.singular_values.max();
    let hat = svd.solve(xtx, epsilon).map_err(FitError::Singular)?;
    Ok(hat.trace())
}

#[derive(Debug, Error, Clone)]
pub enum FitError {
    #[error("training subset has {rows} rows but the model has {parameters} free parameters")]
    InsufficientRows { rows: usize, parameters: usize },

    #[error("predictor has near zero variance in the training subset")]
    ConstantPredictor,

    #[error("failed to solve the normal equations: {0}")]
    Singular(&'static str),
}

#[derive(Debug, Error, Clone)]
pub enum ScoreError {
    #[error("test subset is empty")]
    EmptyTestSubset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table<'a>(xs: &'a [f64], ys: &'a [f64]) -> Table<'a> {
        Table::new(vec![xs, ys]).expect("valid table")
    }

    #[test]
    fn linear_fit_recovers_a_line() {
        let xs = (0..20).map(|i| i as f64).collect::<Vec<_>>();
        let ys = xs.iter().map(|x| 3.0 + 2.0 * x).collect::<Vec<_>>();
        let model = ModelKind::Linear.fit(&table(&xs, &ys)).expect("fits");

        assert!((model.predict(0.0) - 3.0).abs() < 1e-8);
        assert!((model.predict(10.0) - 23.0).abs() < 1e-8);
        assert!(model.rmse(&table(&xs, &ys)).expect("non empty") < 1e-8);
    }

    #[test]
    fn piecewise_hinge_activates_only_beyond_the_breakpoint() {
        // Slope 0.5 up to the breakpoint, 2.5 after it.
        let xs = (0..30).map(|i| i as f64 * 0.5).collect::<Vec<_>>();
        let ys = xs
            .iter()
            .map(|x| 1.0 + 0.5 * x + 2.0 * (x - 7.0f64).max(0.0))
            .collect::<Vec<_>>();
        let model = ModelKind::Piecewise { breakpoint: 7.0 }
            .fit(&table(&xs, &ys))
            .expect("fits");

        assert!((model.predict(6.0) - model.predict(5.0) - 0.5).abs() < 1e-6);
        assert!((model.predict(12.0) - model.predict(11.0) - 2.5).abs() < 1e-6);
        assert!(model.rmse(&table(&xs, &ys)).expect("non empty") < 1e-6);

        // A plain linear fit cannot track the slope change.
        let linear = ModelKind::Linear.fit(&table(&xs, &ys)).expect("fits");
        assert!(linear.rmse(&table(&xs, &ys)).expect("non empty") > 0.1);
    }

    #[test]
    fn smooth_fit_tracks_a_quadratic_where_linear_cannot() {
        let xs = (0..100).map(|i| i as f64 / 99.0).collect::<Vec<_>>();
        let ys = xs
            .iter()
            .map(|x| 1.0 - 10.0 * (x - 0.3) * (x - 0.3))
            .collect::<Vec<_>>();
        let data = table(&xs, &ys);

        let smooth = ModelKind::Smooth.fit(&data).expect("fits");
        let linear = ModelKind::Linear.fit(&data).expect("fits");
        assert!(smooth.rmse(&data).expect("non empty") < 1e-2);
        assert!(linear.rmse(&data).expect("non empty") > 0.5);
    }

    #[test]
    fn wiggly_fit_chases_training_noise_harder_than_smooth() {
        let (xs, ys) = crate::dataset::synthetic_quadratic(100, Some(11));
        let data = table(&xs, &ys);

        let smooth = ModelKind::Smooth.fit(&data).expect("fits");
        let wiggly = ModelKind::Wiggly.fit(&data).expect("fits");
        assert!(
            wiggly.rmse(&data).expect("non empty") < smooth.rmse(&data).expect("non empty")
        );
    }

    #[test]
    fn constant_predictor_is_rejected() {
        let xs = [2.0; 10];
        let ys = (0..10).map(|i| i as f64).collect::<Vec<_>>();
        assert!(matches!(
            ModelKind::Linear.fit(&table(&xs, &ys)),
            Err(FitError::ConstantPredictor)
        ));
    }

    #[test]
    fn too_few_rows_for_the_parameters_is_rejected() {
        let xs = [0.0, 1.0];
        let ys = [0.0, 1.0];
        assert!(matches!(
            ModelKind::Piecewise { breakpoint: 0.5 }.fit(&table(&xs, &ys)),
            Err(FitError::InsufficientRows {
                rows: 2,
                parameters: 3,
            })
        ));
    }

    #[test]
    fn scoring_is_deterministic_and_rejects_an_empty_test_subset() {
        let xs = (0..10).map(|i| i as f64).collect::<Vec<_>>();
        let ys = xs.iter().map(|x| x + 1.0).collect::<Vec<_>>();
        let data = table(&xs, &ys);
        let model = ModelKind::Linear.fit(&data).expect("fits");

        let first = model.rmse(&data).expect("non empty");
        let second = model.rmse(&data).expect("non empty");
        assert_eq!(first, second);

        let mut rng = StdRng::seed_from_u64(0);
        let (_, empty) = data.holdout_subsets(&mut rng, 10);
        assert!(matches!(
            model.rmse(&empty),
            Err(ScoreError::EmptyTestSubset)
        ));
    }
}
