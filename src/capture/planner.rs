//! Frequency planning
//!
//! A swept capture tiles `[lo, hi)` into acquisition windows one sample-rate
//! wide. The first window is centered half a bandwidth above `lo`, the rest
//! follow every full bandwidth.

use thiserror::Error;

use crate::sdr::RfPath;

/// Half of the span captured around a requested center frequency
pub const HALF_SPAN_HZ: u64 = 10_000_000;

/// Offset applied to the span for the second, gap-filling capture
pub const SECOND_SAMPLE_SHIFT_HZ: u64 = 2_000_000;

/// One acquisition window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyBand {
    pub index: usize,
    pub center_hz: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("frequency {mhz} MHz is out of range")]
    FrequencyOutOfRange { mhz: u64 },
    #[error("center frequency {center_mhz} MHz is below the {} MHz half-span", HALF_SPAN_HZ / 1_000_000)]
    CenterTooLow { center_mhz: u64 },
    #[error("band width must be non-zero")]
    ZeroBandWidth,
    #[error("span {lo_hz}..{hi_hz} Hz is narrower than one {band_width_hz} Hz band")]
    SpanTooNarrow {
        lo_hz: u64,
        hi_hz: u64,
        band_width_hz: u64,
    },
}

/// What to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyPlan {
    /// Exactly one pass at an absolute frequency
    Narrowband { freq_hz: u64 },
    /// Contiguous windows of `band_width_hz` covering `[lo_hz, hi_hz)`
    Swept {
        lo_hz: u64,
        hi_hz: u64,
        band_width_hz: u64,
    },
}

impl FrequencyPlan {
    /// Span of ±10 MHz around `center_mhz`, shifted up 2 MHz for a second sample
    pub fn swept_around(
        center_mhz: u64,
        second_sample: bool,
        band_width_hz: u64,
    ) -> Result<Self, PlanError> {
        let center_hz = mhz_to_hz(center_mhz)?;
        if center_hz < HALF_SPAN_HZ {
            return Err(PlanError::CenterTooLow { center_mhz });
        }
        let shift = if second_sample { SECOND_SAMPLE_SHIFT_HZ } else { 0 };
        let lo_hz = center_hz - HALF_SPAN_HZ + shift;
        let hi_hz = center_hz
            .checked_add(HALF_SPAN_HZ + shift)
            .ok_or(PlanError::FrequencyOutOfRange { mhz: center_mhz })?;
        Ok(FrequencyPlan::Swept {
            lo_hz,
            hi_hz,
            band_width_hz,
        })
    }

    pub fn narrowband_mhz(freq_mhz: u64) -> Result<Self, PlanError> {
        Ok(FrequencyPlan::Narrowband {
            freq_hz: mhz_to_hz(freq_mhz)?,
        })
    }

    /// Lowest frequency of the plan; drives the antenna path
    pub fn low_edge_hz(&self) -> u64 {
        match self {
            FrequencyPlan::Narrowband { freq_hz } => *freq_hz,
            FrequencyPlan::Swept { lo_hz, .. } => *lo_hz,
        }
    }

    pub fn rf_path(&self) -> RfPath {
        RfPath::for_low_edge(self.low_edge_hz())
    }

    /// Compute the acquisition windows
    pub fn bands(&self) -> Result<Vec<FrequencyBand>, PlanError> {
        match *self {
            FrequencyPlan::Narrowband { freq_hz } => Ok(vec![FrequencyBand {
                index: 0,
                center_hz: freq_hz,
            }]),
            FrequencyPlan::Swept {
                lo_hz,
                hi_hz,
                band_width_hz,
            } => {
                if band_width_hz == 0 {
                    return Err(PlanError::ZeroBandWidth);
                }
                let count = hi_hz.saturating_sub(lo_hz) / band_width_hz;
                if count == 0 {
                    return Err(PlanError::SpanTooNarrow {
                        lo_hz,
                        hi_hz,
                        band_width_hz,
                    });
                }
                Ok((0..count)
                    .map(|i| FrequencyBand {
                        index: i as usize,
                        center_hz: lo_hz + band_width_hz / 2 + i * band_width_hz,
                    })
                    .collect())
            }
        }
    }
}

fn mhz_to_hz(mhz: u64) -> Result<u64, PlanError> {
    mhz.checked_mul(1_000_000)
        .ok_or(PlanError::FrequencyOutOfRange { mhz })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RATE: u64 = 20_000_000;

    #[test]
    fn test_single_band_scenario() {
        // span 20 MHz at 20 MHz rate -> 1 band centered at lo + 10 MHz
        let plan = FrequencyPlan::swept_around(200, false, RATE).unwrap();
        let bands = plan.bands().unwrap();
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].center_hz, 190_000_000 + 10_000_000);
        assert_eq!(plan.rf_path(), RfPath::Rf2);
    }

    #[test]
    fn test_second_sample_shift() {
        let plan = FrequencyPlan::swept_around(200, true, RATE).unwrap();
        assert_eq!(
            plan,
            FrequencyPlan::Swept {
                lo_hz: 192_000_000,
                hi_hz: 212_000_000,
                band_width_hz: RATE
            }
        );
        assert_eq!(plan.bands().unwrap()[0].center_hz, 202_000_000);
    }

    #[test]
    fn test_narrowband_single_band() {
        let plan = FrequencyPlan::narrowband_mhz(1090).unwrap();
        let bands = plan.bands().unwrap();
        assert_eq!(
            bands,
            vec![FrequencyBand {
                index: 0,
                center_hz: 1_090_000_000
            }]
        );
        assert_eq!(plan.rf_path(), RfPath::Rf1);
    }

    #[test]
    fn test_multi_band_spacing() {
        let plan = FrequencyPlan::Swept {
            lo_hz: 100_000_000,
            hi_hz: 165_000_000,
            band_width_hz: RATE,
        };
        let centers: Vec<u64> = plan.bands().unwrap().iter().map(|b| b.center_hz).collect();
        assert_eq!(centers, vec![110_000_000, 130_000_000, 150_000_000]);
    }

    #[test]
    fn test_plan_errors() {
        assert_eq!(
            FrequencyPlan::swept_around(5, false, RATE),
            Err(PlanError::CenterTooLow { center_mhz: 5 })
        );
        let narrow = FrequencyPlan::swept_around(200, false, 40_000_000).unwrap();
        assert!(matches!(narrow.bands(), Err(PlanError::SpanTooNarrow { .. })));
        let zero = FrequencyPlan::swept_around(200, false, 0).unwrap();
        assert_eq!(zero.bands(), Err(PlanError::ZeroBandWidth));
    }

    #[test]
    fn test_frequency_out_of_range() {
        let mhz = u64::MAX / 1_000_000 + 1;
        assert_eq!(
            FrequencyPlan::swept_around(mhz, false, RATE),
            Err(PlanError::FrequencyOutOfRange { mhz })
        );
        assert_eq!(
            FrequencyPlan::narrowband_mhz(mhz),
            Err(PlanError::FrequencyOutOfRange { mhz })
        );

        // Converts to Hz but the upper edge of the span does not fit
        let edge = u64::MAX / 1_000_000;
        assert_eq!(
            FrequencyPlan::swept_around(edge, true, RATE),
            Err(PlanError::FrequencyOutOfRange { mhz: edge })
        );
    }

    proptest! {
        #[test]
        fn prop_bands_tile_span(
            lo in 1_000_000u64..3_000_000_000,
            span in 1u64..400_000_000,
            rate in 2_000_000u64..20_000_001,
        ) {
            let plan = FrequencyPlan::Swept { lo_hz: lo, hi_hz: lo + span, band_width_hz: rate };
            match plan.bands() {
                Ok(bands) => {
                    prop_assert_eq!(bands.len() as u64, span / rate);
                    prop_assert_eq!(bands[0].center_hz, lo + rate / 2);
                    for pair in bands.windows(2) {
                        prop_assert_eq!(pair[1].center_hz - pair[0].center_hz, rate);
                        prop_assert_eq!(pair[1].index, pair[0].index + 1);
                    }
                }
                Err(e) => {
                    prop_assert!(span < rate);
                    prop_assert!(matches!(e, PlanError::SpanTooNarrow { .. }), "unexpected error: {:?}", e);
                }
            }
        }
    }
}
