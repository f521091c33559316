//! The three data sources of the comparison pipeline: a synthetic nonlinear
//! table, the child-growth measurement table, and the housing listings table
//! (wrangling only, no modeling).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::io::Read;
use thiserror::Error;

/// Synthetic table with a quadratic signal: x ~ U(0, 1) and
/// y = 1 - 10 (x - 0.3)^2 + e with e ~ N(0, 0.3).
pub fn synthetic_quadratic(rows: usize, seed: Option<u64>) -> (Vec<f64>, Vec<f64>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = Normal::new(0.0, 0.3).expect("never fails");

    let mut xs = Vec::with_capacity(rows);
    let mut ys = Vec::with_capacity(rows);
    for _ in 0..rows {
        let x = rng.gen::<f64>();
        xs.push(x);
        ys.push(1.0 - 10.0 * (x - 0.3) * (x - 0.3) + noise.sample(&mut rng));
    }
    (xs, ys)
}

/// One child measurement row.
#[derive(Debug, Clone, Deserialize)]
pub struct GrowthRecord {
    pub age: f64,
    pub sex: f64,
    pub weight: f64,
    pub height: f64,
    pub armc: f64,
}

/// Loads the growth measurement table from headered delimited text.
pub fn load_growth<R: Read>(reader: R) -> Result<Vec<GrowthRecord>, DatasetError> {
    let mut rows = Vec::new();
    for record in csv::Reader::from_reader(reader).deserialize() {
        rows.push(record?);
    }
    if rows.is_empty() {
        return Err(DatasetError::EmptyTable);
    }
    Ok(rows)
}

/// The (weight, height) predictor/response pair the piecewise growth
/// analysis regresses on. The hinge term is derived inside the piecewise
/// fitter, never stored as a table column.
pub fn growth_columns(records: &[GrowthRecord]) -> (Vec<f64>, Vec<f64>) {
    (
        records.iter().map(|r| r.weight).collect(),
        records.iter().map(|r| r.height).collect(),
    )
}

/// One housing listing, subsetted to the columns of interest; any other
/// columns in the input are dropped during decoding.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    pub price: f64,
    pub rating: f64,
    pub borough: String,
    pub neighbourhood: String,
    pub room_type: String,
}

/// Loads listings, dropping every row whose borough equals `drop_borough`.
pub fn load_listings<R: Read>(
    reader: R,
    drop_borough: &str,
) -> Result<Vec<Listing>, DatasetError> {
    let mut rows = Vec::new();
    for record in csv::Reader::from_reader(reader).deserialize::<Listing>() {
        let record = record?;
        if record.borough != drop_borough {
            rows.push(record);
        }
    }
    Ok(rows)
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("input table has no rows")]
    EmptyTable,

    #[error("malformed delimited text input")]
    Csv(#[from] csv::Error),
}
