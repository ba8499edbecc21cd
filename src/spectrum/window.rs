//! Window functions for spectral estimation

use std::f64::consts::PI;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// No tapering
    Rectangular,
    /// Hann window (default)
    #[default]
    Hann,
    Hamming,
    /// Lower sidelobes than Hann at the cost of a wider main lobe
    Blackman,
}

impl WindowFunction {
    /// Periodic window coefficients of length `size`
    pub fn generate(&self, size: usize) -> Vec<f64> {
        let n = |i: usize| i as f64 / size as f64;
        match self {
            WindowFunction::Rectangular => vec![1.0; size],
            WindowFunction::Hann => (0..size)
                .map(|i| 0.5 * (1.0 - (2.0 * PI * n(i)).cos()))
                .collect(),
            WindowFunction::Hamming => (0..size)
                .map(|i| 0.54 - 0.46 * (2.0 * PI * n(i)).cos())
                .collect(),
            WindowFunction::Blackman => (0..size)
                .map(|i| 0.42 - 0.5 * (2.0 * PI * n(i)).cos() + 0.08 * (4.0 * PI * n(i)).cos())
                .collect(),
        }
    }
}

impl FromStr for WindowFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rectangular" | "rect" | "none" => Ok(WindowFunction::Rectangular),
            "hann" | "hanning" => Ok(WindowFunction::Hann),
            "hamming" => Ok(WindowFunction::Hamming),
            "blackman" => Ok(WindowFunction::Blackman),
            other => Err(format!("unknown window '{}'", other)),
        }
    }
}

impl std::fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WindowFunction::Rectangular => "rectangular",
            WindowFunction::Hann => "hann",
            WindowFunction::Hamming => "hamming",
            WindowFunction::Blackman => "blackman",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_shape() {
        let w = WindowFunction::Hann.generate(8);
        assert_eq!(w.len(), 8);
        assert!(w[0].abs() < 1e-12);
        assert!((w[4] - 1.0).abs() < 1e-12);
        // Periodic: symmetric around the peak, excluding the first sample
        assert!((w[1] - w[7]).abs() < 1e-12);
    }

    #[test]
    fn test_parse_window() {
        assert_eq!("Hann".parse::<WindowFunction>(), Ok(WindowFunction::Hann));
        assert_eq!("rect".parse::<WindowFunction>(), Ok(WindowFunction::Rectangular));
        assert!("kaiser".parse::<WindowFunction>().is_err());
        assert_eq!(WindowFunction::Blackman.to_string(), "blackman");
    }
}
