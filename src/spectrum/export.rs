//! PSD export as `frequency,power` CSV

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::welch::PsdResult;

#[derive(Debug, Serialize)]
struct PsdRow {
    frequency: f64,
    power: f64,
}

/// Write one row per frequency bin
pub fn write_psd(path: &Path, frequencies: &[f64], power: &[f64]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (&frequency, &power) in frequencies.iter().zip(power) {
        writer.serialize(PsdRow { frequency, power })?;
    }
    writer.flush()?;
    Ok(())
}

/// Files written for one band
#[derive(Debug, Clone)]
pub struct ExportedPsd {
    pub linear: PathBuf,
    pub db: PathBuf,
}

/// Write `psd_<index>.csv` (linear) and `psd_<index>_db.csv` into `dir`
pub fn export_band(dir: &Path, index: usize, psd: &PsdResult) -> csv::Result<ExportedPsd> {
    let linear = dir.join(format!("psd_{}.csv", index));
    let db = dir.join(format!("psd_{}_db.csv", index));
    write_psd(&linear, &psd.frequencies, &psd.power)?;
    write_psd(&db, &psd.frequencies, &psd.to_db())?;
    Ok(ExportedPsd { linear, db })
}
