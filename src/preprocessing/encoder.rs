//! Ordinal encoding for categorical columns

use crate::data::Value;
use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maps each training level to its index in sorted level order.
///
/// Unknown and missing levels encode as the most frequent training level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    levels: Vec<String>,
    most_frequent: usize,
}

impl OrdinalEncoder {
    /// Build the encoding table from the observed values of one column
    pub fn fit(column: &str, values: &[Value]) -> Result<Self> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for v in values.iter().filter(|v| !v.is_null()) {
            *counts.entry(v.to_string()).or_insert(0) += 1;
        }
        if counts.is_empty() {
            return Err(SentinelError::TransformError(format!(
                "Categorical column '{}' has no observed levels in the training split",
                column
            )));
        }

        let levels: Vec<String> = counts.keys().cloned().collect();
        // Highest count wins; ties go to the first level in sorted order
        let most_frequent = counts
            .values()
            .enumerate()
            .fold((0usize, 0usize), |(best, best_count), (i, &c)| {
                if c > best_count {
                    (i, c)
                } else {
                    (best, best_count)
                }
            })
            .0;

        Ok(Self {
            levels,
            most_frequent,
        })
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn encode(&self, value: &Value) -> f64 {
        if value.is_null() {
            return self.most_frequent as f64;
        }
        let key = value.to_string();
        self.levels
            .binary_search(&key)
            .unwrap_or(self.most_frequent) as f64
    }
}
