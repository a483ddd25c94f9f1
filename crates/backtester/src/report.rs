use crate::error::BacktestError;
use analytics::PerformanceReport;
use std::path::Path;

/// Writes `report` as pretty-printed JSON, creating parent directories as needed.
///
/// The file is written beside its destination and renamed into place.
pub fn write_report(report: &PerformanceReport, path: &Path) -> Result<(), BacktestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(report)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    tracing::info!(path = %path.display(), "Performance report written.");
    Ok(())
}

/// Reads a report previously written by `write_report`.
pub fn read_report(path: &Path) -> Result<PerformanceReport, BacktestError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
