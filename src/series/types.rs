//! Core series type
//!
//! A `Series` is a regular grid of samples: `values[i]` is the sample at
//! `start_time + i * step_time`, and NaN marks a missing sample. Every
//! constructor keeps `values.len() * step_time == stop_time - start_time`.

use super::tags::{extract_tags, NAME_TAG};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default consolidation function for fetched series
pub const DEFAULT_CONSOLIDATION: &str = "average";

fn default_consolidation() -> String {
    DEFAULT_CONSOLIDATION.to_string()
}

/// A named, tagged time series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    /// Display name, rewritten by most functions
    pub name: String,
    /// Tag set; `name` always holds the metric path
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Samples, NaN for missing (serialized as null)
    #[serde(with = "nullable")]
    pub values: Vec<f64>,
    /// Timestamp of the first sample, epoch seconds
    pub start_time: i64,
    /// End of the covered window (exclusive)
    pub stop_time: i64,
    /// Seconds between samples
    pub step_time: i64,
    /// Minimum ratio of present samples for a consolidated bucket
    #[serde(default)]
    pub x_files_factor: f32,
    /// Reducer used when this series is downsampled
    #[serde(default = "default_consolidation")]
    pub consolidation_func: String,
    /// Pattern that fetched this series
    #[serde(default)]
    pub path_expression: String,
}

impl Series {
    /// Create a series, extracting tags from the name
    pub fn new(name: impl Into<String>, values: Vec<f64>, step_time: i64, start_time: i64) -> Self {
        let name = name.into();
        let stop_time = start_time + values.len() as i64 * step_time;
        Self {
            tags: extract_tags(&name),
            path_expression: name.clone(),
            name,
            values,
            start_time,
            stop_time,
            step_time,
            x_files_factor: 0.0,
            consolidation_func: default_consolidation(),
        }
    }

    /// Copy metadata and tags under a new name, with no values
    pub fn clone_shell(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: self.tags.clone(),
            values: Vec::new(),
            start_time: self.start_time,
            stop_time: self.start_time,
            step_time: self.step_time,
            x_files_factor: self.x_files_factor,
            consolidation_func: self.consolidation_func.clone(),
            path_expression: self.path_expression.clone(),
        }
    }

    /// Full copy under a new name with extra tags merged in
    pub fn clone_with_tags<K, V>(&self, name: impl Into<String>, extra: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut series = self.clone_shell(name).with_values(self.values.clone());
        series
            .tags
            .extend(extra.into_iter().map(|(k, v)| (k.into(), v.into())));
        series
    }

    /// Replace the values, recomputing `stop_time`
    pub fn with_values(mut self, values: Vec<f64>) -> Self {
        self.stop_time = self.start_time + values.len() as i64 * self.step_time;
        self.values = values;
        self
    }

    /// Move the grid to a new start, keeping the length
    pub fn with_start(mut self, start_time: i64) -> Self {
        self.start_time = start_time;
        self.stop_time = start_time + self.values.len() as i64 * self.step_time;
        self
    }

    /// Builder method: add a tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The `name` tag, falling back to the display name
    pub fn name_tag(&self) -> &str {
        self.tags.get(NAME_TAG).map(String::as_str).unwrap_or(&self.name)
    }

    /// Timestamp of sample `index`
    pub fn timestamp(&self, index: usize) -> i64 {
        self.start_time + index as i64 * self.step_time
    }

    /// Last non-missing sample
    pub fn last_value(&self) -> Option<f64> {
        self.values.iter().rev().copied().find(|v| !v.is_nan())
    }

    /// Whether the grid invariant holds
    pub fn is_consistent(&self) -> bool {
        self.step_time > 0 && self.values.len() as i64 * self.step_time == self.stop_time - self.start_time
    }

    /// Samples with timestamps in `[from, until)`
    ///
    /// Returns `None` when nothing overlaps.
    pub fn slice(&self, from: i64, until: i64) -> Option<Series> {
        if self.step_time <= 0 {
            return None;
        }
        let first = ceil_div(from.saturating_sub(self.start_time), self.step_time).clamp(0, self.len() as i64) as usize;
        let last = ceil_div(until.saturating_sub(self.start_time), self.step_time).clamp(0, self.len() as i64) as usize;
        if first >= last {
            return None;
        }
        let start = self.timestamp(first);
        Some(
            self.clone_shell(self.name.clone())
                .with_start(start)
                .with_values(self.values[first..last].to_vec()),
        )
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    let q = a.div_euclid(b);
    if a.rem_euclid(b) == 0 {
        q
    } else {
        q + 1
    }
}

/// NaN on the inside, JSON null on the outside
mod nullable {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| if v.is_nan() { None } else { Some(*v) }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}
