//! Mass tolerance windows.
//!
//! Convention: a window is the half-open interval `[min_bound, max_bound)`
//! around a nominal mass. Relative (ppm) tolerances are computed against a
//! separate reference mass so that, for instance, a beta-peptide window can
//! be sized by the precursor it was derived from.

use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MassTolerance {
    #[serde(rename = "da")]
    Absolute(f64),
    #[serde(rename = "ppm")]
    Ppm(f64),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unable to parse tolerance '{input}', expected something like '10ppm' or '0.02 da'")]
pub struct ToleranceParseError {
    pub input: String,
}

impl Default for MassTolerance {
    fn default() -> Self {
        MassTolerance::Ppm(10.0)
    }
}

impl MassTolerance {
    /// Half-width of the window for a given reference mass.
    pub fn delta(&self, reference: f64) -> f64 {
        match self {
            MassTolerance::Absolute(x) => *x,
            MassTolerance::Ppm(x) => reference * x * 1e-6,
        }
    }

    pub fn min_bound(&self, mass: f64, reference: f64) -> f64 {
        mass - self.delta(reference)
    }

    pub fn max_bound(&self, mass: f64, reference: f64) -> f64 {
        mass + self.delta(reference)
    }

    /// `(min_bound, max_bound)` for `mass`, sized by `reference`.
    ///
    /// ```
    /// use xlseek::MassTolerance;
    ///
    /// let tol = MassTolerance::Ppm(10.0);
    /// let (lo, hi) = tol.window(1000.0, 1000.0);
    /// assert!((lo - 999.99).abs() < 1e-9);
    /// assert!((hi - 1000.01).abs() < 1e-9);
    /// ```
    pub fn window(&self, mass: f64, reference: f64) -> (f64, f64) {
        (self.min_bound(mass, reference), self.max_bound(mass, reference))
    }

    /// Orders `value` against `reference`, treating anything inside the
    /// tolerance as equal. Relative tolerances use the larger of the two
    /// values to size the window so the comparison is symmetric.
    pub fn compare(&self, value: f64, reference: f64) -> Ordering {
        let delta = match self {
            MassTolerance::Absolute(x) => *x,
            MassTolerance::Ppm(x) => value.max(reference) * x * 1e-6,
        };
        if value + delta < reference {
            Ordering::Less
        } else if value - delta > reference {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            MassTolerance::Absolute(x) | MassTolerance::Ppm(x) => *x == 0.0,
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, MassTolerance::Ppm(_))
    }
}

impl std::fmt::Display for MassTolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MassTolerance::Absolute(x) => write!(f, "{} da", x),
            MassTolerance::Ppm(x) => write!(f, "{} ppm", x),
        }
    }
}

impl std::str::FromStr for MassTolerance {
    type Err = ToleranceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ToleranceParseError {
            input: s.to_string(),
        };
        let re = Regex::new(r"(?i)^\s*([0-9]*\.?[0-9]+(?:e[+-]?[0-9]+)?)\s*(ppm|da|m/z|mz|th)\s*$")
            .map_err(|_| err())?;
        let caps = re.captures(s).ok_or_else(err)?;
        let value: f64 = caps[1].parse().map_err(|_| err())?;
        match caps[2].to_lowercase().as_str() {
            "ppm" => Ok(MassTolerance::Ppm(value)),
            _ => Ok(MassTolerance::Absolute(value)),
        }
    }
}
