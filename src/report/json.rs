//! JSON summary file

use crate::account::BatchSummary;
use crate::error::Result;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

/// `profit_loss_summary_<YYYYMMDD_HHMMSS>.json`
pub fn output_file_name(at: DateTime<Local>) -> String {
    format!("profit_loss_summary_{}.json", at.format("%Y%m%d_%H%M%S"))
}

pub fn to_json(summary: &BatchSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Write the summary under `output_dir`, creating it if needed
pub fn save_json_output(summary: &BatchSummary, output_dir: &Path, at: DateTime<Local>) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(output_file_name(at));
    std::fs::write(&path, to_json(summary)?)?;
    info!("JSON output saved to: {}", path.display());
    Ok(path)
}
