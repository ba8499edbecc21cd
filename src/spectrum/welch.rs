//! Welch power spectral density estimate
//!
//! The sample stream is cut into overlapping segments of `L` samples,
//! advancing `round(L * (1 - overlap))` samples each time. Every segment is
//! windowed and transformed, the squared magnitudes are averaged, and the
//! average is normalised by the window energy `sum(w^2)`.

use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use thiserror::Error;
use tracing::debug;

use super::window::WindowFunction;

/// Floor added before taking the logarithm so empty bins stay finite
pub const DB_FLOOR_EPSILON: f64 = 1e-15;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimateError {
    #[error("insufficient samples: {available} available, segment length is {segment_length}")]
    InsufficientSamples {
        available: usize,
        segment_length: usize,
    },
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

/// Segmentation settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchParams {
    pub segment_length: usize,
    pub overlap: f64,
    pub window: WindowFunction,
}

impl Default for WelchParams {
    fn default() -> Self {
        Self {
            segment_length: 4096,
            overlap: 0.75,
            window: WindowFunction::Hann,
        }
    }
}

impl WelchParams {
    pub fn validate(&self) -> Result<(), EstimateError> {
        if self.segment_length == 0 || self.segment_length % 2 != 0 {
            return Err(EstimateError::InvalidParameters(format!(
                "segment length must be even and non-zero, got {}",
                self.segment_length
            )));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(EstimateError::InvalidParameters(format!(
                "overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }
        Ok(())
    }

    /// Samples between the starts of consecutive segments
    pub fn step(&self) -> usize {
        ((self.segment_length as f64 * (1.0 - self.overlap)).round() as usize).max(1)
    }

    /// Segments that fit in `samples` samples (0 when fewer than one segment)
    pub fn segment_count(&self, samples: usize) -> usize {
        if samples < self.segment_length {
            return 0;
        }
        (samples - self.segment_length) / self.step() + 1
    }
}

/// Parallel frequency / power arrays, both `segment_length` long
#[derive(Debug, Clone, PartialEq)]
pub struct PsdResult {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
    /// Segments averaged into `power`
    pub segments: usize,
}

impl PsdResult {
    pub fn len(&self) -> usize {
        self.power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    pub fn to_db(&self) -> Vec<f64> {
        power_to_db(&self.power)
    }

    /// Frequency and power of the strongest bin
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &p)| (self.frequencies[i], p))
    }
}

/// Subtract the complex mean in place
pub fn remove_dc(samples: &mut [Complex64]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<Complex64>() / samples.len() as f64;
    for s in samples.iter_mut() {
        *s -= mean;
    }
}

/// Swap the two halves so zero frequency sits in the middle
pub fn fft_shift<T>(data: &mut [T]) {
    let half = data.len() / 2;
    if data.len() % 2 == 0 {
        let (low, high) = data.split_at_mut(half);
        low.swap_with_slice(high);
    } else {
        data.rotate_right(half);
    }
}

pub fn power_to_db(power: &[f64]) -> Vec<f64> {
    power
        .iter()
        .map(|&p| 10.0 * (p + DB_FLOOR_EPSILON).log10())
        .collect()
}

pub struct SpectralEstimator {
    params: WelchParams,
    window: Vec<f64>,
    window_energy: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl SpectralEstimator {
    pub fn new(params: WelchParams) -> Result<Self, EstimateError> {
        params.validate()?;
        let window = params.window.generate(params.segment_length);
        let window_energy: f64 = window.iter().map(|w| w * w).sum();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(params.segment_length);
        Ok(Self {
            params,
            window,
            window_energy,
            fft,
        })
    }

    /// Averaged periodogram in natural FFT order (DC at index 0)
    pub fn welch(&self, samples: &[Complex64], sample_rate: f64) -> Result<PsdResult, EstimateError> {
        let len = self.params.segment_length;
        let segments = self.params.segment_count(samples.len());
        if segments == 0 {
            return Err(EstimateError::InsufficientSamples {
                available: samples.len(),
                segment_length: len,
            });
        }
        let step = self.params.step();

        let mut accum = vec![0.0f64; len];
        let mut buffer = vec![Complex64::default(); len];
        let mut scratch = vec![Complex64::default(); self.fft.get_inplace_scratch_len()];

        for k in 0..segments {
            let segment = &samples[k * step..k * step + len];
            for ((dst, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *dst = x * w;
            }
            self.fft.process_with_scratch(&mut buffer, &mut scratch);
            for (acc, bin) in accum.iter_mut().zip(&buffer) {
                *acc += bin.norm_sqr();
            }
        }

        let scale = segments as f64 * self.window_energy;
        let power = accum.into_iter().map(|p| p / scale).collect();
        let frequencies = (0..len)
            .map(|i| {
                let bin = if i < len / 2 {
                    i as f64
                } else {
                    i as f64 - len as f64
                };
                bin * sample_rate / len as f64
            })
            .collect();

        debug!(
            "Welch: {} samples, {} segments of {} (step {})",
            samples.len(),
            segments,
            len,
            step
        );

        Ok(PsdResult {
            frequencies,
            power,
            segments,
        })
    }

    /// DC removal, Welch average and centering. `samples` is left DC-free.
    pub fn estimate(
        &self,
        samples: &mut [Complex64],
        sample_rate: f64,
    ) -> Result<PsdResult, EstimateError> {
        if samples.len() < self.params.segment_length {
            return Err(EstimateError::InsufficientSamples {
                available: samples.len(),
                segment_length: self.params.segment_length,
            });
        }
        remove_dc(samples);
        let mut psd = self.welch(samples, sample_rate)?;
        fft_shift(&mut psd.frequencies);
        fft_shift(&mut psd.power);
        Ok(psd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::f64::consts::PI;

    fn tone(n: usize, cycles_per_sample: f64, dc: Complex64) -> Vec<Complex64> {
        (0..n)
            .map(|i| Complex64::from_polar(1.0, 2.0 * PI * cycles_per_sample * i as f64) + dc)
            .collect()
    }

    #[test]
    fn test_segment_arithmetic() {
        let params = WelchParams::default();
        assert_eq!(params.step(), 1024);
        assert_eq!(params.segment_count(20_000_000), 19_528);
        assert_eq!(params.segment_count(4096), 1);
        assert_eq!(params.segment_count(4095), 0);
    }

    #[test]
    fn test_output_length() {
        let estimator = SpectralEstimator::new(WelchParams::default()).unwrap();
        let mut samples = tone(4096 * 3, 0.1, Complex64::new(0.0, 0.0));
        let psd = estimator.estimate(&mut samples, 20e6).unwrap();
        assert_eq!(psd.len(), 4096);
        assert_eq!(psd.frequencies.len(), 4096);
        assert_eq!(psd.segments, 9);
        assert_eq!(psd.to_db().len(), 4096);
    }

    #[test]
    fn test_insufficient_samples() {
        let estimator = SpectralEstimator::new(WelchParams::default()).unwrap();
        let mut samples = vec![Complex64::default(); 100];
        assert_eq!(
            estimator.estimate(&mut samples, 20e6),
            Err(EstimateError::InsufficientSamples {
                available: 100,
                segment_length: 4096
            })
        );
    }

    #[test]
    fn test_invalid_parameters() {
        for (segment_length, overlap) in [(0, 0.5), (1023, 0.5), (1024, 1.0), (1024, -0.1)] {
            let params = WelchParams {
                segment_length,
                overlap,
                ..WelchParams::default()
            };
            assert!(matches!(
                SpectralEstimator::new(params),
                Err(EstimateError::InvalidParameters(_))
            ));
        }
    }

    #[test]
    fn test_unit_magnitude_mean_power() {
        // |x| = 1 everywhere: Parseval gives a mean bin power of exactly 1
        let mut rng = rand::thread_rng();
        let samples: Vec<Complex64> = (0..2048)
            .map(|_| Complex64::from_polar(1.0, rng.gen_range(0.0..2.0 * PI)))
            .collect();
        let estimator = SpectralEstimator::new(WelchParams {
            segment_length: 256,
            ..WelchParams::default()
        })
        .unwrap();
        let psd = estimator.welch(&samples, 1.0).unwrap();
        let mean = psd.power.iter().sum::<f64>() / psd.len() as f64;
        assert!((mean - 1.0).abs() < 1e-9, "mean power {}", mean);
    }

    #[test]
    fn test_tone_peak_and_axis() {
        let fs = 2e6;
        let estimator = SpectralEstimator::new(WelchParams {
            segment_length: 256,
            overlap: 0.5,
            window: WindowFunction::Hann,
        })
        .unwrap();
        // 250 kHz tone sits exactly on bin 32, with a DC offset to remove
        let mut samples = tone(4096, 0.125, Complex64::new(0.3, -0.2));
        let psd = estimator.estimate(&mut samples, fs).unwrap();

        assert_eq!(psd.frequencies[0], -1e6);
        assert_eq!(psd.frequencies[128], 0.0);
        assert!(psd.frequencies.windows(2).all(|w| w[1] > w[0]));

        let (freq, _) = psd.peak().unwrap();
        assert_eq!(freq, 250_000.0);
        assert!(psd.power[128] < 1e-12);
    }

    #[test]
    fn test_fft_shift_twice_is_identity() {
        let original: Vec<u32> = (0..16).collect();
        let mut data = original.clone();
        fft_shift(&mut data);
        assert_eq!(data[0], 8);
        assert_eq!(data[8], 0);
        fft_shift(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_db_floor() {
        let db = power_to_db(&[0.0, 1.0, 100.0]);
        assert!(db[0].is_finite());
        assert!((db[0] - 10.0 * DB_FLOOR_EPSILON.log10()).abs() < 1e-9);
        assert!((db[0] + 150.0).abs() < 1e-9);
        assert!(db[1].abs() < 1e-9);
        assert!((db[2] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_remove_dc() {
        let mut samples = vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, 4.0)];
        remove_dc(&mut samples);
        assert_eq!(samples[0], Complex64::new(-1.0, -1.0));
        assert_eq!(samples[1], Complex64::new(1.0, 1.0));
    }
}
