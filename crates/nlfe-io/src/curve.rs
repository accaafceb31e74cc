//! Load-displacement tables.
//!
//! A table holds one `(prescribed displacement, reaction force)` row per load
//! step. The text format is whitespace delimited with a single leading
//! comment line:
//!
//! ```text
//! #load-disp for mises plasticity
//! 0.2 20
//! 0.4 40
//! ```
//!
//! The same format is used for reporting and for regression comparison
//! against stored reference curves.

use crate::error::{IoError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Load-displacement curve, one row per load step
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadDisplacementCurve {
    /// Comment written on the first line (without the leading `#`)
    pub header: String,
    rows: Vec<(f64, f64)>,
}

impl LoadDisplacementCurve {
    /// Create an empty curve with the given comment header
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            rows: Vec::new(),
        }
    }

    /// Append a `(displacement, force)` row
    pub fn push(&mut self, displacement: f64, force: f64) {
        self.rows.push((displacement, force));
    }

    pub fn rows(&self) -> &[(f64, f64)] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table to any writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        if self.header.contains('\n') {
            return Err(IoError::InvalidData(
                "curve header must be a single line".to_string(),
            ));
        }
        writeln!(writer, "#{}", self.header)?;
        for (displacement, force) in &self.rows {
            writeln!(writer, "{} {}", displacement, force)?;
        }
        Ok(())
    }

    /// Write the table to a file, replacing any existing content
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Parse a table from a reader
    ///
    /// The first comment line becomes the header, later comment lines and
    /// blank lines are skipped. Every data line must hold exactly two numbers.
    pub fn read_from<R: BufRead>(reader: R) -> Result<Self> {
        let mut curve = Self::default();
        let mut seen_header = false;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = index + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }
            if let Some(comment) = trimmed.strip_prefix('#') {
                if !seen_header {
                    curve.header = comment.to_string();
                    seen_header = true;
                }
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(IoError::Parse {
                    line: line_number,
                    message: format!("expected 2 columns, found {}", fields.len()),
                });
            }

            let parse = |field: &str| {
                field.parse::<f64>().map_err(|_| IoError::Parse {
                    line: line_number,
                    message: format!("invalid number: {}", field),
                })
            };
            curve.push(parse(fields[0])?, parse(fields[1])?);
        }

        Ok(curve)
    }

    /// Parse a table from a file
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }

    /// Largest absolute difference between matching entries of two curves
    ///
    /// Both curves must have the same number of rows.
    pub fn max_deviation(&self, other: &Self) -> Result<f64> {
        if self.rows.len() != other.rows.len() {
            return Err(IoError::InvalidData(format!(
                "row count mismatch: {} vs {}",
                self.rows.len(),
                other.rows.len()
            )));
        }

        let deviation = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(a, b)| (a.0 - b.0).abs().max((a.1 - b.1).abs()))
            .fold(0.0, f64::max);

        Ok(deviation)
    }
}
