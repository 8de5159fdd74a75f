//! Export artifact writing: per-group CSVs, the flat concatenated CSV, and
//! the multi-sheet XLSX workbook.
//!
//! Every artifact is written to a temporary file in the destination
//! directory and atomically persisted, so a re-run fully replaces the prior
//! contents and a crash never leaves a half-written file behind.

use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::Writer;
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::AppError;
use crate::export::rows::CourseRow;
use crate::notion::text::{sanitize_sheet_name, slugify};

/// Filename of the combined workbook.
pub const WORKBOOK_FILENAME: &str = "osszes_kurzus.xlsx";

/// Filename of the flat concatenated CSV.
pub const FLAT_CSV_FILENAME: &str = "osszes_kurzus.csv";

/// Subdirectory holding one CSV artifact per group.
const GROUPS_SUBDIR: &str = "groups";

/// A flat-CSV row: the group name followed by the course fields.
#[derive(Debug, Serialize)]
struct FlatRow<'a> {
    csoport: &'a str,
    oldal_cime: &'a str,
    szakasz: &'a str,
    sorszam: &'a str,
    tartalom: &'a str,
}

/// Paths of the export directory tree.
#[derive(Debug, Clone)]
pub struct ExportLayout {
    root: PathBuf,
}

impl ExportLayout {
    /// Creates the layout, making sure the directories exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        std::fs::create_dir_all(root.join(GROUPS_SUBDIR))
            .map_err(|e| AppError::WriteError(format!("Failed to create export dir: {}", e)))?;
        Ok(Self { root })
    }

    pub fn workbook_path(&self) -> PathBuf {
        self.root.join(WORKBOOK_FILENAME)
    }

    pub fn flat_csv_path(&self) -> PathBuf {
        self.root.join(FLAT_CSV_FILENAME)
    }

    /// Artifact path for one group, derived from its display name.
    pub fn group_csv_path(&self, display_name: &str) -> PathBuf {
        let slug = slugify(display_name);
        let stem: &str = if slug.is_empty() { "export" } else { &slug };
        self.root.join(GROUPS_SUBDIR).join(format!("{}.csv", stem))
    }
}

/// An atomic CSV writer that ensures artifact integrity.
///
/// Writes to a temporary file and atomically persists to the final path on
/// `finish()`. If dropped without calling `finish()`, the temporary file is
/// automatically deleted.
pub struct AtomicCsvWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
}

impl AtomicCsvWriter {
    /// Creates a new atomic CSV writer targeting the specified path.
    ///
    /// The temporary file is created in the same directory as `final_path`
    /// to keep the persist step on one filesystem.
    pub fn new(final_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let final_path = final_path.as_ref().to_path_buf();

        let parent_dir = final_path.parent().ok_or_else(|| {
            AppError::WriteError(format!(
                "Cannot determine parent directory for: {}",
                final_path.display()
            ))
        })?;

        let temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| AppError::WriteError(format!("Failed to create temporary file: {}", e)))?;

        Ok(Self {
            writer: Writer::from_writer(BufWriter::new(temp_file)),
            final_path,
        })
    }

    /// Returns a mutable reference to the underlying CSV writer.
    pub fn writer_mut(&mut self) -> &mut Writer<BufWriter<NamedTempFile>> {
        &mut self.writer
    }

    /// Flushes all buffers and atomically persists the file to the final
    /// path. Returns the final path on success.
    pub fn finish(self) -> Result<PathBuf, AppError> {
        let buf_writer = self
            .writer
            .into_inner()
            .map_err(|e| AppError::WriteError(format!("Failed to flush CSV writer: {}", e.error())))?;

        let named_temp = buf_writer
            .into_inner()
            .map_err(|e| AppError::WriteError(format!("Failed to flush buffer: {}", e.error())))?;

        named_temp.persist(&self.final_path).map_err(|e| {
            AppError::WriteError(format!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            ))
        })?;

        Ok(self.final_path)
    }
}

/// Writes one group's rows to its CSV artifact, replacing prior contents.
pub fn write_group_csv(
    layout: &ExportLayout,
    display_name: &str,
    rows: &[CourseRow],
) -> Result<PathBuf, AppError> {
    let path = layout.group_csv_path(display_name);
    let mut writer = AtomicCsvWriter::new(&path)?;
    for row in rows {
        writer
            .writer_mut()
            .serialize(row)
            .map_err(|e| AppError::WriteError(format!("Failed to write CSV row: {}", e)))?;
    }
    if rows.is_empty() {
        // serde-derived headers are only emitted with the first record.
        writer
            .writer_mut()
            .write_record(crate::export::rows::CSV_FIELDNAMES)
            .map_err(|e| AppError::WriteError(format!("Failed to write CSV header: {}", e)))?;
    }
    writer.finish()
}

/// Reads a group's rows back from its CSV artifact.
pub fn read_group_csv(layout: &ExportLayout, display_name: &str) -> Result<Vec<CourseRow>, AppError> {
    let path = layout.group_csv_path(display_name);
    let mut reader = csv::Reader::from_path(&path).map_err(|e| {
        AppError::WriteError(format!("Failed to read artifact {}: {}", path.display(), e))
    })?;
    reader
        .deserialize()
        .collect::<Result<Vec<CourseRow>, _>>()
        .map_err(|e| {
            AppError::WriteError(format!(
                "Failed to parse artifact {}: {}",
                path.display(),
                e
            ))
        })
}

/// Serializes one group's rows to CSV bytes for an on-demand download.
pub fn group_csv_bytes(rows: &[CourseRow]) -> Result<Vec<u8>, AppError> {
    let mut writer = Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::WriteError(format!("Failed to serialize CSV row: {}", e)))?;
    }
    if rows.is_empty() {
        writer
            .write_record(crate::export::rows::CSV_FIELDNAMES)
            .map_err(|e| AppError::WriteError(format!("Failed to write CSV header: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::WriteError(format!("Failed to flush CSV buffer: {}", e)))
}

/// Writes the flat concatenated CSV: all groups' rows in group order, each
/// prefixed with its group name.
pub fn write_flat_csv(
    layout: &ExportLayout,
    groups: &[(String, Vec<CourseRow>)],
) -> Result<PathBuf, AppError> {
    let mut writer = AtomicCsvWriter::new(layout.flat_csv_path())?;

    let mut wrote_any = false;
    for (display_name, rows) in groups {
        for row in rows {
            writer
                .writer_mut()
                .serialize(FlatRow {
                    csoport: display_name,
                    oldal_cime: &row.oldal_cime,
                    szakasz: &row.szakasz,
                    sorszam: &row.sorszam,
                    tartalom: &row.tartalom,
                })
                .map_err(|e| AppError::WriteError(format!("Failed to write flat row: {}", e)))?;
            wrote_any = true;
        }
    }
    if !wrote_any {
        let mut header = vec!["csoport"];
        header.extend(crate::export::rows::CSV_FIELDNAMES);
        writer
            .writer_mut()
            .write_record(header)
            .map_err(|e| AppError::WriteError(format!("Failed to write flat header: {}", e)))?;
    }
    writer.finish()
}

/// Picks a sheet name that Excel accepts and that no earlier sheet took.
fn unique_sheet_name(used: &mut HashSet<String>, display_name: &str) -> String {
    let base = {
        let sanitized = sanitize_sheet_name(display_name);
        if sanitized.is_empty() {
            "lap".to_string()
        } else {
            sanitized
        }
    };

    let mut candidate = base.clone();
    let mut i = 1;
    while used.contains(&candidate) {
        i += 1;
        let suffix = format!("_{}", i);
        // Trim the base so the suffix survives the 31-char cap.
        let trimmed: String = base.chars().take(31 - suffix.chars().count()).collect();
        candidate = sanitize_sheet_name(&format!("{}{}", trimmed, suffix));
    }
    used.insert(candidate.clone());
    candidate
}

/// Writes the multi-sheet workbook: one sheet per group, in group order,
/// each with a header row followed by the group's rows.
pub fn write_workbook(
    layout: &ExportLayout,
    groups: &[(String, Vec<CourseRow>)],
) -> Result<PathBuf, AppError> {
    let mut workbook = Workbook::new();
    let mut used_names = HashSet::new();

    for (display_name, rows) in groups {
        let sheet_name = unique_sheet_name(&mut used_names, display_name);
        let sheet = workbook.add_worksheet();
        sheet
            .set_name(&sheet_name)
            .map_err(|e| AppError::WriteError(format!("Invalid sheet name: {}", e)))?;

        for (col, header) in crate::export::rows::CSV_FIELDNAMES.iter().enumerate() {
            sheet
                .write_string(0, col as u16, *header)
                .map_err(|e| AppError::WriteError(format!("Failed to write header: {}", e)))?;
        }
        for (row_idx, row) in rows.iter().enumerate() {
            let r = (row_idx + 1) as u32;
            let cells = [
                &row.oldal_cime,
                &row.szakasz,
                &row.sorszam,
                &row.tartalom,
            ];
            for (col, cell) in cells.iter().enumerate() {
                sheet
                    .write_string(r, col as u16, cell.as_str())
                    .map_err(|e| AppError::WriteError(format!("Failed to write cell: {}", e)))?;
            }
        }
    }

    let bytes = workbook
        .save_to_buffer()
        .map_err(|e| AppError::WriteError(format!("Failed to render workbook: {}", e)))?;

    let final_path = layout.workbook_path();
    let parent = final_path
        .parent()
        .ok_or_else(|| AppError::WriteError("Workbook path has no parent".to_string()))?;
    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|e| AppError::WriteError(format!("Failed to create temporary file: {}", e)))?;
    temp.write_all(&bytes)
        .map_err(|e| AppError::WriteError(format!("Failed to write workbook: {}", e)))?;
    temp.persist(&final_path).map_err(|e| {
        AppError::WriteError(format!(
            "Failed to persist workbook to {}: {}",
            final_path.display(),
            e.error
        ))
    })?;

    Ok(final_path)
}
