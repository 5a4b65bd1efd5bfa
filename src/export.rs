//! CSV, text and JSON renderings of a resolution.

use crate::harvest::{PackageAnalysis, Resolution};
use crate::model::{CanonicalRow, UpgradeGroup};
use serde::Serialize;
use std::fmt::Write as _;
use std::io;
use thiserror::Error;

pub const CSV_HEADER: [&str; 5] = [
    "Vulnerable Package",
    "Version",
    "Parent Chain",
    "Severity",
    "Advisory URL",
];

pub const LATEST_VERSION_HEADER: &str = "Latest Version";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error during export: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes one quoted CSV record per row; `with_latest` adds the last column.
pub fn write_csv<W: io::Write>(
    writer: W,
    rows: &[CanonicalRow],
    with_latest: bool,
) -> Result<(), ExportError> {
    let mut csv = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    let mut header: Vec<&str> = CSV_HEADER.to_vec();
    if with_latest {
        header.push(LATEST_VERSION_HEADER);
    }
    csv.write_record(&header)?;

    for row in rows {
        let chain = row.display_chain();
        let mut record = vec![
            row.package.as_str(),
            row.version.as_str(),
            chain.as_str(),
            row.severity.as_str(),
            row.advisory_url.as_str(),
        ];
        if with_latest {
            record.push(row.latest_version.as_str());
        }
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

/// Human-readable upgrade recommendation.
pub fn upgrade_summary(groups: &[UpgradeGroup]) -> String {
    if groups.is_empty() {
        return "No actionable parent upgrades detected.".to_string();
    }

    let mut summary = String::from("Upgrade the following parent libraries to fix vulnerabilities:");
    for group in groups {
        let _ = write!(
            summary,
            "\n- {} (affects: {})",
            group.parent,
            group.packages.join(", ")
        );
    }
    summary
}

/// Column-aligned table of rows for terminal output.
pub fn render_table(rows: &[CanonicalRow], with_latest: bool) -> String {
    let mut header: Vec<&str> = CSV_HEADER.to_vec();
    if with_latest {
        header.push(LATEST_VERSION_HEADER);
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.package.clone(),
                row.version.clone(),
                row.display_chain(),
                row.severity.clone(),
                row.advisory_url.clone(),
            ];
            if with_latest {
                cells.push(row.latest_version.clone());
            }
            cells
        })
        .collect();

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|c| c[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut out = String::new();
    let line = |out: &mut String, values: &[&str]| {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect();
        out.push_str(padded.join("  ").trim_end());
        out.push('\n');
    };

    line(&mut out, &header);
    for row in &cells {
        let values: Vec<&str> = row.iter().map(String::as_str).collect();
        line(&mut out, &values);
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    rows: &'a [CanonicalRow],
    upgrades: &'a [UpgradeGroup],
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a [PackageAnalysis]>,
}

pub fn to_json(
    resolution: &Resolution,
    analysis: Option<&[PackageAnalysis]>,
) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&JsonReport {
        rows: &resolution.rows,
        upgrades: &resolution.upgrades,
        analysis,
    })?)
}
