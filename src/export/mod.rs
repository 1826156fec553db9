use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::decisions::DecisionStore;
use crate::library::resource::decode_file_size;
use crate::library::{PhotoLibrary, ResourceKey, ResourceValue};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    /// Guess from the output file's extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::parse)
            .unwrap_or(ExportFormat::Json)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }
}

/// One decision with whatever the library can still tell about the photo.
#[derive(Debug, Serialize)]
pub struct ExportedDecision {
    pub photo_id: String,
    pub state: String,
    pub decided_at: Option<String>,
    pub filename: Option<String>,
    pub file_size: Option<u64>,
}

/// Write every decision to a file. Returns how many were written.
pub fn export_decisions(
    decisions: &DecisionStore,
    library: &dyn PhotoLibrary,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    let rows = collect_rows(decisions, library);
    let count = rows.len();

    match format {
        ExportFormat::Json => export_json(&rows, output_path)?,
        ExportFormat::Csv => export_csv(&rows, output_path)?,
    }

    Ok(count)
}

fn collect_rows(decisions: &DecisionStore, library: &dyn PhotoLibrary) -> Vec<ExportedDecision> {
    decisions
        .records()
        .into_iter()
        .map(|record| {
            let filename = match library.resource_value(&record.photo_id, ResourceKey::OriginalFilename) {
                Some(ResourceValue::Text(name)) => Some(name),
                _ => None,
            };
            let file_size = decode_file_size(
                library
                    .resource_value(&record.photo_id, ResourceKey::FileSize)
                    .as_ref(),
            );
            ExportedDecision {
                photo_id: record.photo_id.to_string(),
                state: record.decision.to_string(),
                decided_at: record.decided_at.map(|dt| dt.to_rfc3339()),
                filename,
                file_size,
            }
        })
        .collect()
}

fn export_json(rows: &[ExportedDecision], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(rows)?;
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(rows: &[ExportedDecision], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    wtr.write_record(["photo_id", "state", "decided_at", "filename", "file_size"])?;

    for row in rows {
        wtr.write_record([
            row.photo_id.as_str(),
            row.state.as_str(),
            row.decided_at.as_deref().unwrap_or(""),
            row.filename.as_deref().unwrap_or(""),
            &row.file_size.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
