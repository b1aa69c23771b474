//! Synthetic URL-feature datasets
//!
//! Ternary features (`-1`, `0`, `1`) over the phishing feature set with a
//! balanced label. Malicious rows lean towards `-1`, safe rows towards `1`;
//! how strongly depends on the column.

use crate::data::{Dataset, Label, Value};
use crate::error::{Result, SentinelError};
use crate::schema::{SchemaVersion, URL_FEATURES};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Probability of a row's leaning value for feature `j`
fn lean_probability(j: usize) -> f64 {
    0.5 + 0.1 * (j % 3) as f64
}

const ZERO_PROBABILITY: f64 = 0.1;

fn sample_value(rng: &mut ChaCha8Rng, lean: i64, p_lean: f64) -> i64 {
    let u: f64 = rng.gen();
    if u < p_lean {
        lean
    } else if u < p_lean + ZERO_PROBABILITY {
        0
    } else {
        -lean
    }
}

/// Generate `n_rows` labelled records.
///
/// Even rows are malicious and odd rows safe, so labels are balanced to
/// within one row. Each cell is replaced by a null with probability
/// `missing_rate`.
pub fn url_feature_dataset(n_rows: usize, seed: u64, missing_rate: f64) -> Result<Dataset> {
    if !(0.0..1.0).contains(&missing_rate) {
        return Err(SentinelError::invalid_parameter(
            "missing_rate",
            missing_rate,
            "must be in [0, 1)",
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let labels: Vec<Label> = (0..n_rows)
        .map(|i| if i % 2 == 0 { Label::Malicious } else { Label::Safe })
        .collect();

    let mut values: Vec<Vec<Value>> = (0..URL_FEATURES.len())
        .map(|_| Vec::with_capacity(n_rows))
        .collect();
    for label in &labels {
        let lean = match label {
            Label::Malicious => -1,
            Label::Safe => 1,
        };
        for (j, column) in values.iter_mut().enumerate() {
            let v = sample_value(&mut rng, lean, lean_probability(j));
            if missing_rate > 0.0 && rng.gen::<f64>() < missing_rate {
                column.push(Value::Null);
            } else {
                column.push(Value::Int(v));
            }
        }
    }

    Dataset::from_columns(
        URL_FEATURES.iter().map(|s| s.to_string()).collect(),
        values,
        Some(labels),
        SchemaVersion(1),
        format!("synthetic(seed={})", seed),
    )
}
