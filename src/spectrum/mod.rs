//! Post-capture spectral estimation
//!
//! Capture files are decoded from signed 8-bit IQ, DC-corrected, averaged
//! with Welch's method, centered and exported as CSV.

pub mod cs8;
pub mod export;
pub mod welch;
pub mod window;

pub use cs8::{load_cs8, DecodeError};
pub use export::{export_band, ExportedPsd};
pub use welch::{
    fft_shift, power_to_db, remove_dc, EstimateError, PsdResult, SpectralEstimator, WelchParams,
    DB_FLOOR_EPSILON,
};
pub use window::WindowFunction;
