//! Fetch seam
//!
//! The evaluator never talks to storage. It hands a batch of
//! [`MetricRequest`]s to a [`Fetcher`] and reads the answers back out of a
//! [`MetricMap`]. [`StaticFetcher`] serves fixtures from memory.

use crate::parser::MetricRequest;
use crate::series::{Series, DEFAULT_CONSOLIDATION};
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Fetched series keyed by the request that produced them
pub type MetricMap = HashMap<MetricRequest, Vec<Series>>;

/// Backend capability: resolve patterns over windows to raw series
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Must return an entry, possibly empty, for every request
    async fn fetch(&self, requests: &[MetricRequest]) -> anyhow::Result<MetricMap>;
}

/// Compile a Graphite glob into an anchored regex
///
/// `*` and `?` never cross a `.`; `{a,b}` is alternation and `[...]`
/// passes through as a character class.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    let mut in_class = false;
    let mut depth = 0usize;
    for c in pattern.chars() {
        match c {
            _ if in_class => {
                if c == ']' {
                    in_class = false;
                }
                if c == '\\' {
                    re.push_str("\\\\");
                } else {
                    re.push(c);
                }
            }
            '[' => {
                in_class = true;
                re.push('[');
            }
            '*' => re.push_str("[^.]*"),
            '?' => re.push_str("[^.]"),
            '{' => {
                depth += 1;
                re.push_str("(?:");
            }
            '}' if depth > 0 => {
                depth -= 1;
                re.push(')');
            }
            ',' if depth > 0 => re.push('|'),
            _ => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
}

/// On-disk fixture format, one object per series
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesFixture {
    name: String,
    start: i64,
    step: i64,
    values: Vec<Option<f64>>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    x_files_factor: Option<f32>,
    consolidation_func: Option<String>,
}

impl SeriesFixture {
    /// Build the series, filling unset metadata from the given defaults
    fn into_series(self, consolidation_func: &str, xff: f32) -> Series {
        let values = self.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        let mut series = Series::new(self.name, values, self.step, self.start);
        series.tags.extend(self.tags);
        series.x_files_factor = self.x_files_factor.unwrap_or(xff);
        series.consolidation_func = self
            .consolidation_func
            .unwrap_or_else(|| consolidation_func.to_string());
        series
    }
}

fn read_fixtures(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read fixtures from {}", path.display()))
}

/// In-memory fetcher over a fixed set of series
///
/// Series are matched by their `name` tag and sliced to the requested
/// window.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    series: Vec<Series>,
}

impl StaticFetcher {
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    /// Load fixtures from a JSON array of `{name, start, step, values}`
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Self::from_json_with_defaults(json, DEFAULT_CONSOLIDATION, 0.0)
    }

    /// Like [`StaticFetcher::from_json`], with the consolidation function
    /// and xFilesFactor used where a fixture sets none
    pub fn from_json_with_defaults(json: &str, consolidation_func: &str, xff: f32) -> anyhow::Result<Self> {
        let fixtures: Vec<SeriesFixture> = serde_json::from_str(json).context("invalid fixture JSON")?;
        for f in &fixtures {
            if f.step <= 0 {
                anyhow::bail!("fixture '{}' has non-positive step {}", f.name, f.step);
            }
        }
        Ok(Self::new(
            fixtures
                .into_iter()
                .map(|f| f.into_series(consolidation_func, xff))
                .collect(),
        ))
    }

    /// Load fixtures from a file
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::from_json(&read_fixtures(path.as_ref())?)
    }

    /// Load fixtures from a file with metadata defaults
    pub fn from_path_with_defaults(path: impl AsRef<Path>, consolidation_func: &str, xff: f32) -> anyhow::Result<Self> {
        Self::from_json_with_defaults(&read_fixtures(path.as_ref())?, consolidation_func, xff)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    fn lookup(&self, request: &MetricRequest) -> anyhow::Result<Vec<Series>> {
        let pattern = glob_to_regex(&request.metric)
            .with_context(|| format!("invalid metric pattern '{}'", request.metric))?;
        Ok(self
            .series
            .iter()
            .filter(|s| pattern.is_match(s.name_tag()))
            .filter_map(|s| s.slice(request.from, request.until))
            .map(|mut s| {
                s.path_expression = request.metric.clone();
                s
            })
            .collect())
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, requests: &[MetricRequest]) -> anyhow::Result<MetricMap> {
        let mut out = MetricMap::with_capacity(requests.len());
        for request in requests {
            let series = self.lookup(request)?;
            tracing::debug!(request = %request, matched = series.len(), "static fetch");
            out.insert(request.clone(), series);
        }
        Ok(out)
    }
}
