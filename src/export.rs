//! Snapshot exports for the presentation layer.
//!
//! Files are timestamped and written on demand; nothing here is read back.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::ValueEnum;
use log::info;

use crate::error::Result;
use crate::projection;
use crate::store::{ClusterQuery, ClusterStore, SortKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Txt,
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }
}

/// Neutralize cells that spreadsheet software would run as a formula.
///
/// Cells starting with `=`, `+`, `-`, `@`, tab or carriage return get a
/// leading `'`. Cells already starting with `'` are left alone.
pub fn csv_safe_cell(cell: String) -> String {
    match cell.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{cell}"),
        _ => cell,
    }
}

fn stamped_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{stem}_{stamp}.{ext}"))
}

/// Human-readable listing of the clusters selected by `query`.
pub fn render_summary(store: &ClusterStore, query: &ClusterQuery) -> String {
    let mut out = String::new();
    if store.is_empty() {
        out.push_str("No clusters yet.\n");
        return out;
    }
    let shown = store.query(query);
    if shown.is_empty() {
        let _ = writeln!(out, "No clusters match ({} hidden).", store.len());
        return out;
    }
    for c in shown {
        let _ = writeln!(
            out,
            "{} [{}] support={} score={:.2} civility={:.2}\n    {}",
            c.id, c.keyword, c.support_count, c.score, c.civility, c.representative_text
        );
        if let Some(latest) = c.original_samples.last() {
            let _ = writeln!(out, "    latest: {latest}");
        }
    }
    out
}

/// Write all clusters to `dir` as `opinion_clusters_<timestamp>.<ext>`.
pub fn export_clusters(store: &ClusterStore, dir: &Path, format: ExportFormat) -> Result<PathBuf> {
    let path = stamped_path(dir, "opinion_clusters", format.extension());
    let file = File::create(&path)?;

    match format {
        ExportFormat::Txt => {
            let mut w = BufWriter::new(file);
            let everything = ClusterQuery::sorted_by(SortKey::SupportCount);
            w.write_all(render_summary(store, &everything).as_bytes())?;
            w.flush()?;
        }
        ExportFormat::Json => {
            let clusters: Vec<_> = store.iter().collect();
            let mut w = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut w, &clusters)?;
            w.flush()?;
        }
        ExportFormat::Csv | ExportFormat::Tsv => {
            let delimiter = if format == ExportFormat::Tsv { b'\t' } else { b',' };
            let mut wtr = csv::WriterBuilder::new()
                .delimiter(delimiter)
                .from_writer(file);
            wtr.write_record([
                "id",
                "keyword",
                "support_count",
                "score",
                "civility",
                "representative_text",
                "latest_sample",
            ])?;
            for c in store.iter() {
                wtr.write_record([
                    c.id.0.to_string(),
                    csv_safe_cell(c.keyword.clone()),
                    c.support_count.to_string(),
                    format!("{:.4}", c.score),
                    format!("{:.4}", c.civility),
                    csv_safe_cell(c.representative_text.clone()),
                    csv_safe_cell(c.original_samples.last().cloned().unwrap_or_default()),
                ])?;
            }
            wtr.flush()?;
        }
    }

    info!("exported {} clusters to {}", store.len(), path.display());
    Ok(path)
}

/// Write the projected deliberation map to `dir` as `deliberation_map_<timestamp>.json`.
pub fn export_map(store: &ClusterStore, dir: &Path, title: &str) -> Result<PathBuf> {
    let path = stamped_path(dir, "deliberation_map", "json");
    let mut w = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut w, &projection::project(store, title))?;
    w.flush()?;
    info!("exported deliberation map to {}", path.display());
    Ok(path)
}
