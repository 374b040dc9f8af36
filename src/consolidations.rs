//! Consolidation functions
//!
//! Pure reducers turning a window of samples into one value. Missing samples
//! are NaN; they are dropped before reduction but still count towards the
//! xFilesFactor ratio.

use std::fmt;

/// Reducer names accepted by `aggregate`, `consolidateBy` and friends
pub const SUMMARIZER_NAMES: &[&str] = &[
    "sum", "total", "avg", "average", "min", "max", "last", "current", "range", "rangeOf",
    "median", "multiply", "diff", "count", "stddev",
];

/// A named reducer over a window of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsolidationFunc {
    Sum,
    Average,
    Min,
    Max,
    Last,
    Range,
    Median,
    Multiply,
    Diff,
    Count,
    Stddev,
    /// Nearest-rank percentile, `pN` or `pN.f`
    Percentile(f64),
}

impl ConsolidationFunc {
    /// Parse a reducer name or alias
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "sum" | "total" => Self::Sum,
            "avg" | "average" => Self::Average,
            "min" => Self::Min,
            "max" => Self::Max,
            "last" | "current" => Self::Last,
            "range" | "rangeOf" => Self::Range,
            "median" => Self::Median,
            "multiply" => Self::Multiply,
            "diff" => Self::Diff,
            "count" => Self::Count,
            "stddev" => Self::Stddev,
            _ => {
                let p: f64 = name.strip_prefix('p')?.parse().ok()?;
                if !(0.0..=100.0).contains(&p) {
                    return None;
                }
                Self::Percentile(p)
            }
        })
    }

    /// Reduce values that are already free of NaN; empty input gives NaN
    pub fn apply(&self, present: &[f64]) -> f64 {
        let (first, rest) = match present.split_first() {
            Some(split) => split,
            None => return f64::NAN,
        };

        match self {
            Self::Sum => present.iter().sum(),
            Self::Average => present.iter().sum::<f64>() / present.len() as f64,
            Self::Min => present.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Last => present[present.len() - 1],
            Self::Range => {
                let min = present.iter().copied().fold(f64::INFINITY, f64::min);
                let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                max - min
            }
            Self::Median => percentile(present, 50.0, false),
            Self::Multiply => present.iter().product(),
            Self::Diff => first - rest.iter().sum::<f64>(),
            Self::Count => present.len() as f64,
            Self::Stddev => {
                let n = present.len() as f64;
                let mean = present.iter().sum::<f64>() / n;
                let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                variance.sqrt()
            }
            Self::Percentile(p) => percentile(present, *p, false),
        }
    }

    /// Drop NaN, apply the xFilesFactor gate, then reduce
    pub fn reduce(&self, values: &[f64], xff: f32) -> f64 {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if !x_files_factor(present.len(), values.len(), xff) {
            return f64::NAN;
        }
        self.apply(&present)
    }
}

impl fmt::Display for ConsolidationFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
            Self::Average => write!(f, "average"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Last => write!(f, "last"),
            Self::Range => write!(f, "range"),
            Self::Median => write!(f, "median"),
            Self::Multiply => write!(f, "multiply"),
            Self::Diff => write!(f, "diff"),
            Self::Count => write!(f, "count"),
            Self::Stddev => write!(f, "stddev"),
            Self::Percentile(p) => write!(f, "p{}", p),
        }
    }
}

/// Reduce `values` with the named function; unknown names give NaN
pub fn summarize(func: &str, values: &[f64], xff: f32) -> f64 {
    match ConsolidationFunc::parse(func) {
        Some(f) => f.reduce(values, xff),
        None => f64::NAN,
    }
}

/// Whether `name` is a reducer, an alias, or a valid percentile spec
pub fn is_valid_consolidation_func(name: &str) -> bool {
    ConsolidationFunc::parse(name).is_some()
}

/// Whether `non_null` of `total` samples meet the xFilesFactor threshold
///
/// A factor of zero (or NaN) only requires one present sample.
pub fn x_files_factor(non_null: usize, total: usize, xff: f32) -> bool {
    if non_null == 0 || total == 0 {
        return false;
    }
    if xff.is_nan() || xff <= 0.0 {
        return true;
    }
    non_null as f32 / total as f32 >= xff
}

/// Percentile of the non-missing values
///
/// Without interpolation this is nearest-rank with ceiling selection, so
/// the median of an even-sized set is the lower middle value. With
/// interpolation the value is linear between the two bracketing ranks.
pub fn percentile(values: &[f64], p: f64, interpolate: bool) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() || !(0.0..=100.0).contains(&p) {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();

    if interpolate {
        let position = p / 100.0 * (n - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let fraction = position - lower as f64;
        return sorted[lower] + (sorted[upper] - sorted[lower]) * fraction;
    }

    let rank = (p * n as f64 / 100.0).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_summarize_basic() {
        assert!(summarize("sum", &[], 0.0).is_nan());
        assert_eq!(summarize("sum", &[1.0, 2.0, 3.0], 0.0), 6.0);
        assert_eq!(summarize("total", &[1.0, NAN, 3.0], 0.0), 4.0);
        assert_eq!(summarize("avg", &[1.0, 2.0, 3.0, 4.0], 0.0), 2.5);
        assert_eq!(summarize("min", &[4.0, NAN, 2.0], 0.0), 2.0);
        assert_eq!(summarize("max", &[4.0, NAN, 2.0], 0.0), 4.0);
        assert_eq!(summarize("last", &[4.0, 2.0, NAN], 0.0), 2.0);
        assert_eq!(summarize("rangeOf", &[4.0, 1.0, 9.0], 0.0), 8.0);
        assert_eq!(summarize("multiply", &[2.0, 3.0, NAN, 4.0], 0.0), 24.0);
        assert_eq!(summarize("count", &[2.0, NAN, NAN, 4.0], 0.0), 2.0);
    }

    #[test]
    fn test_summarize_median() {
        assert_eq!(summarize("median", &[1.0, 2.0, 3.0, 10.0, 11.0], 0.0), 3.0);
        assert_eq!(summarize("median", &[11.0, 3.0, 1.0, 10.0, 2.0], 0.0), 3.0);
        assert_eq!(summarize("median", &[1.0, 2.0, 3.0, 4.0], 0.0), 2.0);
    }

    #[test]
    fn test_summarize_stddev_is_population() {
        let v = summarize("stddev", &[1.0, 2.0, 3.0, 4.0], 0.0);
        assert!((v - 1.118_033_988_749_89).abs() < 1e-12);
    }

    #[test]
    fn test_summarize_diff() {
        assert_eq!(summarize("diff", &[1.0, 2.0, 3.0, 4.0], 0.0), -8.0);
    }

    #[test]
    fn test_xff_gate() {
        assert!(summarize("avg", &[1.0, 2.0, 3.0, 4.0, NAN], 0.9).is_nan());
        assert_eq!(summarize("avg", &[1.0, 2.0, 3.0, 4.0, NAN], 0.8), 2.5);
        assert_eq!(summarize("avg", &[1.0, NAN, NAN, NAN], f32::NAN), 1.0);
        assert!(summarize("sum", &[NAN, NAN], 0.0).is_nan());
    }

    #[test]
    fn test_percentiles() {
        let values = [5.0, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(summarize("p50", &values, 0.0), 3.0);
        assert_eq!(summarize("p0", &values, 0.0), 1.0);
        assert_eq!(summarize("p100", &values, 0.0), 5.0);
        assert_eq!(summarize("p99.9", &values, 0.0), 5.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0, true), 2.5);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0, 5.0], 25.0, true), 2.0);
        assert!(percentile(&[NAN], 50.0, false).is_nan());
    }

    #[test]
    fn test_is_valid_consolidation_func() {
        for name in ["sum", "avg", "average", "current", "rangeOf", "p50", "p99.9", "p0"] {
            assert!(is_valid_consolidation_func(name), "{}", name);
        }
        for name in ["test", "p", "pfoo", "p101", "Sum", ""] {
            assert!(!is_valid_consolidation_func(name), "{}", name);
        }
        for name in SUMMARIZER_NAMES {
            assert!(is_valid_consolidation_func(name), "{}", name);
        }
    }

    #[test]
    fn test_display_round_trips() {
        for name in ["sum", "average", "p99.9", "median"] {
            let f = ConsolidationFunc::parse(name).unwrap();
            assert_eq!(ConsolidationFunc::parse(&f.to_string()), Some(f));
        }
    }
}
