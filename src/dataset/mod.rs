//! Tabular dataset loading.
//!
//! Spreadsheets (xlsx, xlsm, xlsb, xls, ods) are read through `calamine`, CSV
//! files through `csv`. The first row supplies the column names.


use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, open_workbook_auto};
use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{debug, info};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Integral floats below this magnitude print without a fractional part
const INTEGRAL_DISPLAY_LIMIT: f64 = 1e15;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset file not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported dataset format: {0:?} (expected xlsx, xlsm, xlsb, xls, ods or csv)")]
    UnsupportedFormat(String),
    #[error("Worksheet not found: {0}")]
    SheetNotFound(String),
    #[error("Dataset has no header row")]
    MissingHeader,
    #[error("Dataset must have at least one column")]
    NoColumns,
    #[error("Row {row} has {actual} values but the dataset has {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A single scalar cell.
///
/// `Display` renders the cell on its own: integral floats drop the fractional
/// part. Inside a dataset, [`CellValue::display_in`] applies the column's
/// numeric kind so float columns keep `3.0`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Type a raw CSV field
    #[inline]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Int(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return Self::Float(value);
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        Self::Text(raw.to_string())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Render as part of a column that is float-typed when `float_column` is set
    #[inline]
    pub fn display_in(&self, float_column: bool) -> CellDisplay<'_> {
        CellDisplay {
            value: self,
            float_column,
        }
    }
}

/// A cell rendered with its column's numeric kind
#[derive(Debug, Clone, Copy)]
pub struct CellDisplay<'a> {
    value: &'a CellValue,
    float_column: bool,
}

impl fmt::Display for CellDisplay<'_> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.float_column {
            return fmt::Display::fmt(self.value, f);
        }
        match self.value {
            CellValue::Int(value) => write!(f, "{}.0", value),
            CellValue::Float(value)
                if value.fract() == 0.0 && value.abs() < INTEGRAL_DISPLAY_LIMIT =>
            {
                write!(f, "{:.1}", value)
            }
            other => fmt::Display::fmt(other, f),
        }
    }
}

impl fmt::Display for CellValue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("nan"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) if value.is_nan() => f.write_str("nan"),
            Self::Float(value) if value.fract() == 0.0 && value.abs() < INTEGRAL_DISPLAY_LIMIT => {
                write!(f, "{:.0}", value)
            }
            Self::Float(value) => write!(f, "{}", value),
            Self::Text(text) => f.write_str(text),
            Self::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&Data> for CellValue {
    #[inline]
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => Self::Empty,
            Data::Bool(value) => Self::Bool(*value),
            Data::Int(value) => Self::Int(*value),
            Data::Float(value) => Self::Float(*value),
            Data::String(text) => Self::Text(text.clone()),
            Data::DateTime(value) => value
                .as_datetime()
                .map_or_else(|| Self::Float(value.as_f64()), Self::DateTime),
            Data::DateTimeIso(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
                .map_or_else(|_| Self::Text(text.clone()), Self::DateTime),
            Data::DurationIso(text) => Self::Text(text.clone()),
            Data::Error(error) => Self::Text(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<CellValue>,
}

impl Row {
    /// Values aligned with [`Dataset::columns`]
    #[inline]
    pub fn values(&self) -> &[CellValue] {
        &self.values
    }
}

/// Ordered columns plus rows of cells; immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
    float_columns: Vec<bool>,
}

impl Dataset {
    /// Build a dataset, checking that every row has one value per column.
    #[inline]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self, DatasetError> {
        if columns.is_empty() {
            return Err(DatasetError::NoColumns);
        }

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(row, values)| {
                if values.len() == columns.len() {
                    Ok(Row { values })
                } else {
                    Err(DatasetError::RowWidth {
                        row,
                        expected: columns.len(),
                        actual: values.len(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let float_columns = (0..columns.len())
            .map(|column| infer_float_column(&rows, column))
            .collect();

        Ok(Self {
            columns,
            rows,
            float_columns,
        })
    }

    /// Whether the column at `position` holds numbers stored as floats.
    ///
    /// A numeric column becomes float-typed once it has a missing or a
    /// fractional value; its integral values then render as `3.0`.
    #[inline]
    pub fn is_float_column(&self, position: usize) -> bool {
        self.float_columns.get(position).copied().unwrap_or(false)
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a cell by row position and column name
    #[inline]
    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let position = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.values.get(position)
    }
}

fn infer_float_column(rows: &[Row], column: usize) -> bool {
    let mut numeric = false;
    let mut widened = false;

    for value in rows.iter().filter_map(|row| row.values.get(column)) {
        match value {
            CellValue::Int(_) => numeric = true,
            CellValue::Float(number) => {
                numeric = true;
                widened |= number.fract() != 0.0 || !number.is_finite();
            }
            CellValue::Empty => widened = true,
            CellValue::Bool(_) | CellValue::Text(_) | CellValue::DateTime(_) => return false,
        }
    }

    numeric && widened
}

/// Load the dataset at `path`, picking the reader from the file extension.
#[inline]
pub fn load_dataset(path: &Path, sheet: Option<&str>) -> Result<Dataset, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let dataset = if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        load_spreadsheet(path, sheet)?
    } else if extension == "csv" {
        load_csv(path)?
    } else {
        return Err(DatasetError::UnsupportedFormat(extension));
    };

    info!(
        "Loaded {} rows x {} columns from {}",
        dataset.len(),
        dataset.columns().len(),
        path.display()
    );

    Ok(dataset)
}

fn load_spreadsheet(path: &Path, sheet: Option<&str>) -> Result<Dataset, DatasetError> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names();

    let sheet_name = match sheet {
        Some(name) if sheet_names.iter().any(|s| s == name) => name.to_string(),
        Some(name) => return Err(DatasetError::SheetNotFound(name.to_string())),
        None => sheet_names
            .first()
            .cloned()
            .ok_or(DatasetError::MissingHeader)?,
    };

    debug!("Reading worksheet {:?} from {}", sheet_name, path.display());

    let range = workbook.worksheet_range(&sheet_name)?;
    dataset_from_range(&range)
}

/// Convert a worksheet range whose first row holds the headers.
///
/// Rows where every cell is empty are skipped.
#[inline]
pub fn dataset_from_range(range: &Range<Data>) -> Result<Dataset, DatasetError> {
    let mut rows = range.rows();
    let header = rows.next().ok_or(DatasetError::MissingHeader)?;

    let columns = normalize_columns(header.iter().map(|cell| match cell {
        Data::Empty => None,
        other => Some(CellValue::from(other).to_string()),
    }));

    let records = rows
        .filter(|cells| cells.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|cells| cells.iter().map(CellValue::from).collect())
        .collect();

    Dataset::new(columns, records)
}

fn load_csv(path: &Path) -> Result<Dataset, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(DatasetError::MissingHeader);
    }

    let columns = normalize_columns(headers.iter().map(|h| Some(h.to_string())));

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(CellValue::parse).collect());
    }

    Dataset::new(columns, records)
}

/// Name blank headers `Unnamed: <i>` and suffix repeats with `.1`, `.2`, ...
pub(crate) fn normalize_columns<I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut used = HashSet::new();
    let mut repeats: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::new();

    for (position, header) in headers.into_iter().enumerate() {
        let base = header
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| format!("Unnamed: {}", position));

        let mut name = base.clone();
        while used.contains(&name) {
            let count = repeats.entry(base.clone()).or_insert(0);
            *count += 1;
            name = format!("{}.{}", base, count);
        }

        used.insert(name.clone());
        columns.push(name);
    }

    columns
}
