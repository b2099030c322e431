//! Rolling window statistics.
//!
//! STD is the population standard deviation over the window:
//! sqrt(sum((x - mean)^2) / n)

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollingStat {
    Mean,
    Std,
    Min,
    Max,
}

impl RollingStat {
    pub fn parse(input: &str) -> Option<RollingStat> {
        match input.trim().to_lowercase().as_str() {
            "mean" | "avg" => Some(RollingStat::Mean),
            "std" | "stddev" => Some(RollingStat::Std),
            "min" => Some(RollingStat::Min),
            "max" => Some(RollingStat::Max),
            _ => None,
        }
    }

    /// Smallest window for which the statistic is informative.
    pub fn min_window(self) -> usize {
        match self {
            RollingStat::Std => 2,
            _ => 1,
        }
    }

    pub fn apply(self, window: &[f64]) -> f64 {
        if window.is_empty() {
            return f64::NAN;
        }
        let n = window.len() as f64;
        match self {
            RollingStat::Mean => window.iter().sum::<f64>() / n,
            RollingStat::Std => {
                let mean = window.iter().sum::<f64>() / n;
                let variance = window
                    .iter()
                    .map(|v| {
                        let diff = v - mean;
                        diff * diff
                    })
                    .sum::<f64>()
                    / n;
                variance.sqrt()
            }
            RollingStat::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
            RollingStat::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl fmt::Display for RollingStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollingStat::Mean => write!(f, "MEAN"),
            RollingStat::Std => write!(f, "STD"),
            RollingStat::Min => write!(f, "MIN"),
            RollingStat::Max => write!(f, "MAX"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_min_max() {
        let w = [3.0, 1.0, 2.0];
        assert!((RollingStat::Mean.apply(&w) - 2.0).abs() < f64::EPSILON);
        assert_eq!(RollingStat::Min.apply(&w), 1.0);
        assert_eq!(RollingStat::Max.apply(&w), 3.0);
    }

    #[test]
    fn std_known_values() {
        let w = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((RollingStat::Std.apply(&w) - 2.0).abs() < 1e-10);
    }

    #[test]
    fn std_constant_is_zero() {
        assert!(RollingStat::Std.apply(&[5.0, 5.0, 5.0]).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_window_is_nan() {
        assert!(RollingStat::Mean.apply(&[]).is_nan());
    }

    #[test]
    fn parse_names() {
        assert_eq!(RollingStat::parse("Mean"), Some(RollingStat::Mean));
        assert_eq!(RollingStat::parse(" stddev "), Some(RollingStat::Std));
        assert_eq!(RollingStat::parse("median"), None);
    }
}
