use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::PipelineError;
use crate::model::Triplet;
use crate::tsv::{read_rows, strip_header};
use crate::util::create_output_file;

pub const TRIPLET_HEADER: &str = "query_id\ttarget_id\tscore";

/// Triplets read back from a combined or sorted file.
#[derive(Debug, Clone)]
pub struct TripletFile {
    pub triplets: Vec<Triplet>,
    pub had_header: bool,
}

/// Reads a triplet file. A non-numeric score on the first row marks a
/// header; anywhere else it is fatal.
pub fn read_triplets(path: &Path) -> Result<TripletFile> {
    let mut rows = read_rows(path)?;
    let had_header = strip_header(&mut rows, 2).is_some();

    let mut triplets = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(query), Some(target), Some(raw_score)) = (row.field(0), row.field(1), row.field(2))
        else {
            return Err(PipelineError::Parse(format!(
                "{} line {}: expected query, target and score columns",
                path.display(),
                row.line
            ))
            .into());
        };

        let Some(score) = row.number(2) else {
            return Err(PipelineError::Parse(format!(
                "{} line {}: invalid score {raw_score:?}",
                path.display(),
                row.line
            ))
            .into());
        };

        triplets.push(Triplet {
            query: query.to_string(),
            target: target.to_string(),
            score,
        });
    }

    if triplets.is_empty() {
        return Err(PipelineError::EmptyResult(format!(
            "no triplets in {}",
            path.display()
        ))
        .into());
    }

    Ok(TripletFile {
        triplets,
        had_header,
    })
}

pub fn write_triplets(path: &Path, triplets: &[Triplet], header: bool) -> Result<()> {
    let mut out = create_output_file(path)?;
    if header {
        writeln!(out, "{TRIPLET_HEADER}")
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    for triplet in triplets {
        writeln!(out, "{}\t{}\t{}", triplet.query, triplet.target, triplet.score)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}
