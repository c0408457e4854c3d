use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, open_workbook_auto};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::model::SourceRow;

const TITLE_COLUMN: &str = "title";
const SUBTITLE_COLUMN: &str = "subtitle";
const CONTENT_COLUMN: &str = "content";
const URL_COLUMN: &str = "url";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceFormat {
    Jsonl,
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    pub(crate) fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            "csv" => Ok(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(Self::Spreadsheet),
            other => bail!(
                "unsupported input extension `{}` for {}",
                other,
                path.display()
            ),
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
            Self::Spreadsheet => "excel",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RowBatch {
    pub rows: Vec<SourceRow>,
    pub skipped_malformed: usize,
    pub warnings: Vec<String>,
}

impl RowBatch {
    fn skip(&mut self, message: String) {
        warn!(reason = %message, "skipping input row");
        self.skipped_malformed += 1;
        self.warnings.push(message);
    }
}

pub(crate) fn read_rows(path: &Path) -> Result<(SourceFormat, RowBatch)> {
    let format = SourceFormat::from_path(path)?;
    let batch = match format {
        SourceFormat::Jsonl => read_jsonl_rows(path)?,
        SourceFormat::Csv => read_csv_rows(path)?,
        SourceFormat::Spreadsheet => read_spreadsheet_rows(path)?,
    };

    info!(
        path = %path.display(),
        format = format.as_str(),
        rows = batch.rows.len(),
        skipped = batch.skipped_malformed,
        "read input rows"
    );
    Ok((format, batch))
}

pub(crate) fn read_jsonl_rows(path: &Path) -> Result<RowBatch> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut batch = RowBatch::default();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                batch.skip(format!("line {line_no}: unreadable ({err})"));
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Map<String, Value>>(&line) {
            Ok(object) => batch.rows.push(SourceRow {
                line: line_no,
                title: json_field(&object, TITLE_COLUMN),
                subtitle: json_field(&object, SUBTITLE_COLUMN),
                content: json_field(&object, CONTENT_COLUMN),
                url: json_field(&object, URL_COLUMN),
            }),
            Err(err) => batch.skip(format!("line {line_no}: invalid JSON object ({err})")),
        }
    }

    Ok(batch)
}

pub(crate) fn read_csv_rows(path: &Path) -> Result<RowBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read CSV header of {}", path.display()))?
        .clone();
    let columns = ColumnMap::from_headers(headers.iter())
        .with_context(|| format!("no `Title` column in {}", path.display()))?;

    let mut batch = RowBatch::default();
    for (index, record) in reader.records().enumerate() {
        // header is line 1
        let line_no = index + 2;
        match record {
            Ok(record) => {
                let cell = |column: Option<usize>| {
                    column
                        .and_then(|position| record.get(position))
                        .and_then(non_empty)
                };
                batch.rows.push(SourceRow {
                    line: line_no,
                    title: cell(Some(columns.title)),
                    subtitle: cell(columns.subtitle),
                    content: cell(columns.content),
                    url: cell(columns.url),
                });
            }
            Err(err) => batch.skip(format!("row {line_no}: malformed CSV record ({err})")),
        }
    }

    Ok(batch)
}

/// First sheet only; the header is the first row holding a `Title` cell.
pub(crate) fn read_spreadsheet_rows(path: &Path) -> Result<RowBatch> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("workbook {} has no sheets", path.display()))?
        .with_context(|| format!("failed to read first sheet of {}", path.display()))?;

    // the range starts at the first used cell, not at A1
    let first_line = range
        .start()
        .map(|(row, _)| row as usize + 1)
        .unwrap_or(1);
    let grid: Vec<Vec<Option<String>>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    grid_rows(&grid, first_line)
        .with_context(|| format!("no `Title` header cell in first sheet of {}", path.display()))
}

/// Rows below the header of a sheet grid. `first_line` is the 1-based sheet
/// row of `grid[0]`.
pub(crate) fn grid_rows(grid: &[Vec<Option<String>>], first_line: usize) -> Option<RowBatch> {
    let (header_index, columns) = locate_header(grid)?;

    let mut batch = RowBatch::default();
    for (index, row) in grid.iter().enumerate().skip(header_index + 1) {
        let cell = |column: Option<usize>| {
            column
                .and_then(|position| row.get(position))
                .and_then(|value| value.clone())
        };
        batch.rows.push(SourceRow {
            line: first_line + index,
            title: cell(Some(columns.title)),
            subtitle: cell(columns.subtitle),
            content: cell(columns.content),
            url: cell(columns.url),
        });
    }

    Some(batch)
}

fn locate_header(grid: &[Vec<Option<String>>]) -> Option<(usize, ColumnMap)> {
    grid.iter().enumerate().find_map(|(index, row)| {
        let labels = row.iter().map(|cell| cell.as_deref().unwrap_or_default());
        ColumnMap::from_headers(labels).map(|columns| (index, columns))
    })
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    title: usize,
    subtitle: Option<usize>,
    content: Option<usize>,
    url: Option<usize>,
}

impl ColumnMap {
    fn from_headers<'h>(headers: impl Iterator<Item = &'h str>) -> Option<Self> {
        let labels: Vec<String> = headers
            .map(|label| label.trim().to_ascii_lowercase())
            .collect();
        let position = |name: &str| labels.iter().position(|label| label == name);

        Some(Self {
            title: position(TITLE_COLUMN)?,
            subtitle: position(SUBTITLE_COLUMN),
            content: position(CONTENT_COLUMN),
            url: position(URL_COLUMN),
        })
    }
}

fn json_field(object: &Map<String, Value>, name: &str) -> Option<String> {
    let value = object
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)?;

    match value {
        Value::Null => None,
        Value::String(text) => non_empty(text),
        other => non_empty(&other.to_string()),
    }
}

pub(crate) fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(text) => non_empty(text),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            Some(format!("{}", *value as i64))
        }
        other => non_empty(&other.to_string()),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
