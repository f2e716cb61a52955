//! Normalized tables and the CSV writer.
//!
//! Every collector produces one [`Table`]: a fixed, ordered header plus rows
//! whose cells line up with it. The schema invariant (one cell per header
//! column, in header order) is enforced when a row is pushed, so a table that
//! exists is always writable.
//!
//! # File format
//!
//! - UTF-8 with a leading BOM so spreadsheet tools detect the encoding
//! - `,` delimiter, `\n` line endings
//! - fields containing `,`, `"`, CR or LF are quoted, inner quotes doubled
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never observes a half-written table.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{AuditError, Result};

const UTF8_BOM: &str = "\u{feff}";

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Empty text cell, used where a source had no value.
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    /// Parse a numeric-looking token as `Float`, otherwise keep it as text.
    pub fn parse_numeric(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Float(v),
            _ => Self::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// A named table with a fixed header.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table.
    ///
    /// # Panics
    ///
    /// If `headers` is empty. Every table in this crate has at least one
    /// column, so this is a programming error.
    pub fn new<I, S>(name: impl Into<String>, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        assert!(!headers.is_empty(), "table header must not be empty");
        Self {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. Rejects rows whose width differs from the header.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.headers.len() {
            let rendered: Vec<String> = row.iter().map(ToString::to_string).collect();
            return Err(AuditError::malformed(
                &self.name,
                format!(
                    "row has {} cells, header has {}",
                    row.len(),
                    self.headers.len()
                ),
                &rendered.join(","),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Index of a column by header name.
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Cell at `row` under `header`.
    pub fn get(&self, row: usize, header: &str) -> Option<&Value> {
        let col = self.column(header)?;
        self.rows.get(row)?.get(col)
    }

    /// Render the table as CSV text (without the BOM).
    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        push_csv_line(&mut out, self.headers.iter().map(String::as_str));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            push_csv_line(&mut out, cells.iter().map(String::as_str));
        }
        out
    }

    /// Write the table to `path`, replacing any existing file atomically.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            writer.write_all(UTF8_BOM.as_bytes())?;
            writer.write_all(self.to_csv_string().as_bytes())?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| AuditError::Io(e.error))?;
        Ok(())
    }
}

fn push_csv_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

fn escape_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        std::borrow::Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        std::borrow::Cow::Borrowed(field)
    }
}
