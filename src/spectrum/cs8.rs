//! Decoder for raw capture files (signed 8-bit interleaved IQ)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustfft::num_complex::Complex64;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("capture file {} not found", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("capture file {} is truncated ({len} bytes, odd length)", path.display())]
    Truncated { path: PathBuf, len: usize },
}

/// Convert interleaved I/Q bytes to complex samples scaled into [-1, 1)
pub fn decode_cs8(bytes: &[u8]) -> Vec<Complex64> {
    bytes
        .chunks_exact(2)
        .map(|iq| Complex64::new(iq[0] as i8 as f64 / 128.0, iq[1] as i8 as f64 / 128.0))
        .collect()
}

pub fn load_cs8(path: &Path) -> Result<Vec<Complex64>, DecodeError> {
    let bytes = fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            DecodeError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            DecodeError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::Truncated {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }
    Ok(decode_cs8(&bytes))
}
