use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::util::require_file;

/// One non-blank line of a tab-separated artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub line: usize,
    pub fields: Vec<String>,
}

impl Row {
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn number(&self, index: usize) -> Option<f64> {
        self.field(index).and_then(parse_finite)
    }
}

pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    require_file(path, "input file")?;
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .with_context(|| format!("failed to read {} line {}", path.display(), index + 1))?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            continue;
        }

        rows.push(Row {
            line: index + 1,
            fields: trimmed.split('\t').map(|field| field.trim().to_string()).collect(),
        });
    }

    Ok(rows)
}

/// Parses a finite float; `NaN` and infinities are rejected.
pub fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Drops the first row when its `column` does not parse as a number. `NaN`
/// and infinities parse, so such a row stays and is rejected downstream.
/// Only the first row is ever treated as a header.
pub fn strip_header(rows: &mut Vec<Row>, column: usize) -> Option<Row> {
    let is_header = rows.first().is_some_and(|row| {
        row.field(column)
            .is_none_or(|raw| raw.trim().parse::<f64>().is_err())
    });
    if !is_header {
        return None;
    }

    let header = rows.remove(0);
    debug!(line = header.line, "skipping header row");
    Some(header)
}
