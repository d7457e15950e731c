use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use super::ImportSummary;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportReportFile<'a> {
    generated_at: String,
    source_path: String,
    #[serde(flatten)]
    summary: &'a ImportSummary,
}

pub fn write_import_report(
    reports_dir: &Path,
    source_path: &Path,
    summary: &ImportSummary,
) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports directory {}", reports_dir.display()))?;

    let stamp = Utc::now().format("import-%Y%m%d-%H%M%S").to_string();
    let mut path = reports_dir.join(format!("{stamp}.json"));
    let mut counter = 1;
    while path.exists() {
        path = reports_dir.join(format!("{stamp}-{counter}.json"));
        counter += 1;
    }

    let payload = ImportReportFile {
        generated_at: Utc::now().to_rfc3339(),
        source_path: source_path.display().to_string(),
        summary,
    };
    let json = serde_json::to_string_pretty(&payload).context("serialize import report")?;
    fs::write(&path, json).with_context(|| format!("write import report {}", path.display()))?;
    Ok(path)
}
