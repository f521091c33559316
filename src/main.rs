use anyhow::{anyhow, ensure};
use holdout::{ComparisonOptions, ModelKind, SplitOptions, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use structopt::StructOpt;

/// Reads a headered delimited-text table from stdin, runs the repeated
/// holdout comparison, and writes per-variant mean/stddev RMSE as JSON.
#[derive(Debug, StructOpt)]
struct Opt {
    /// Name of the predictor column.
    #[structopt(long, default_value = "x")]
    predictor: String,

    /// Name of the response column.
    #[structopt(long, default_value = "y")]
    response: String,

    /// Number of holdout splits.
    #[structopt(long, default_value = "100")]
    splits: NonZeroUsize,

    /// Fraction of rows in each train subset.
    #[structopt(long, default_value = "0.8")]
    train_fraction: f64,

    /// Master seed for reproducible splits.
    #[structopt(long)]
    seed: Option<u64>,

    /// Evaluate splits in parallel.
    #[structopt(long)]
    parallel: bool,

    /// Model variants to compare: linear, smooth, wiggly, piecewise.
    #[structopt(long, use_delimiter = true, default_value = "linear,smooth,wiggly")]
    models: Vec<String>,

    /// Breakpoint for the piecewise variant, in predictor units.
    #[structopt(long)]
    breakpoint: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Summary {
    mean: f64,
    stddev: f64,
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    let models = opt
        .models
        .iter()
        .map(|name| match name.as_str() {
            "linear" => Ok(ModelKind::Linear),
            "smooth" => Ok(ModelKind::Smooth),
            "wiggly" => Ok(ModelKind::Wiggly),
            "piecewise" => opt
                .breakpoint
                .map(|breakpoint| ModelKind::Piecewise { breakpoint })
                .ok_or_else(|| anyhow!("the piecewise model needs --breakpoint")),
            _ => Err(anyhow!("unknown model {:?}", name)),
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut reader = csv::Reader::from_reader(std::io::stdin().lock());
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("no column named {:?}", name))
    };
    let predictor = column(&opt.predictor)?;
    let response = column(&opt.response)?;

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for record in reader.records() {
        let record = record?;
        xs.push(record[predictor].parse::<f64>()?);
        ys.push(record[response].parse::<f64>()?);
    }
    ensure!(!xs.is_empty(), "input table has no rows");

    let mut split = SplitOptions::new()
        .splits(opt.splits)
        .train_fraction(opt.train_fraction);
    if let Some(seed) = opt.seed {
        split = split.seed(seed);
    }

    let table = Table::new(vec![&xs, &ys])?;
    let comparison = ComparisonOptions::new()
        .split(split)
        .models(models)
        .parallel(opt.parallel)
        .run(&table)?;

    let result = comparison
        .summaries()
        .into_iter()
        .map(|s| {
            (
                s.model.name(),
                Summary {
                    mean: s.mean,
                    stddev: s.stddev,
                },
            )
        })
        .collect::<BTreeMap<_, _>>();
    serde_json::to_writer_pretty(std::io::stdout().lock(), &result)?;

    Ok(())
}
