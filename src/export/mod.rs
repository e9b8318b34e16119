//! Manifest export: CSV and JSON.

pub mod csv;
pub mod json;

use std::path::Path;

use crate::manifest::Manifest;

/// Output format for `attachsort export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// Write `manifest` to `output_path` in the given format.
pub fn export(manifest: &Manifest, format: ExportFormat, output_path: &Path) -> anyhow::Result<()> {
    match format {
        ExportFormat::Csv => csv::export_csv(manifest, output_path),
        ExportFormat::Json => json::export_json(manifest, output_path),
    }
}
