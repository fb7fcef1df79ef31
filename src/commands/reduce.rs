use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::ReduceArgs;
use crate::error::PipelineError;
use crate::model::{Level, PrCurveRow};
use crate::tsv::{Row, read_rows, strip_header};
use crate::util::{create_output_file, fixed6};

/// First-hit columns holding the family/superfamily/fold flags.
const FIRST_HIT_FLAG_COLUMNS: [usize; 3] = [2, 3, 4];

pub fn run_top1(args: ReduceArgs) -> Result<()> {
    let flags = read_first_hit_flags(&args.input)?;
    let means = top1_means(&flags)?;
    write_metrics(&args.output, &top1_metrics(means))?;
    info!(
        queries = flags.len(),
        family = means[0],
        superfamily = means[1],
        fold = means[2],
        "top-1 reduction complete"
    );
    Ok(())
}

pub fn run_pr_auc(args: ReduceArgs) -> Result<()> {
    let rows = read_pr_curve(&args.input)?;
    let areas = pr_auc(&rows)?;
    write_metrics(&args.output, &pr_auc_metrics(areas))?;
    info!(
        rows = rows.len(),
        family = areas[0],
        superfamily = areas[1],
        fold = areas[2],
        "PR-AUC reduction complete"
    );
    Ok(())
}

pub fn top1_metrics(means: [f64; 3]) -> Vec<(String, f64)> {
    Level::ALL
        .iter()
        .map(|level| (format!("{}_Top1", level.metric_prefix()), means[level.index()]))
        .collect()
}

pub fn pr_auc_metrics(areas: [f64; 3]) -> Vec<(String, f64)> {
    Level::ALL
        .iter()
        .map(|level| (format!("{}_PR_AUC", level.metric_prefix()), areas[level.index()]))
        .collect()
}

/// Mean of each match flag over the covered queries.
pub fn top1_means(flags: &[[bool; 3]]) -> Result<[f64; 3]> {
    if flags.is_empty() {
        return Err(PipelineError::EmptyResult("no first-hit records to reduce".to_string()).into());
    }

    let count = flags.len() as f64;
    Ok(Level::ALL.map(|level| {
        let hits = flags.iter().filter(|row| row[level.index()]).count();
        hits as f64 / count
    }))
}

/// Trapezoidal area between consecutive rows, taken in the order given.
/// Rows are never re-sorted by recall.
pub fn pr_auc(rows: &[PrCurveRow]) -> Result<[f64; 3]> {
    if rows.is_empty() {
        return Err(PipelineError::EmptyResult("no PR-curve rows to integrate".to_string()).into());
    }

    let mut areas = [0.0_f64; 3];
    for pair in rows.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        for level in Level::ALL {
            let i = level.index();
            areas[i] += (current.recall[i] - previous.recall[i])
                * (current.precision[i] + previous.precision[i])
                / 2.0;
        }
    }
    Ok(areas)
}

pub fn read_first_hit_flags(path: &Path) -> Result<Vec<[bool; 3]>> {
    let mut rows = read_rows(path)?;
    strip_header(&mut rows, FIRST_HIT_FLAG_COLUMNS[0]);

    let flags = collect_numeric(path, &rows, |row| {
        let values = FIRST_HIT_FLAG_COLUMNS.map(|column| row.number(column));
        match values {
            [Some(fam), Some(sfam), Some(fold)] => Some([fam > 0.0, sfam > 0.0, fold > 0.0]),
            _ => None,
        }
    });

    if flags.is_empty() {
        return Err(PipelineError::EmptyResult(format!(
            "no numeric first-hit rows in {}",
            path.display()
        ))
        .into());
    }
    Ok(flags)
}

pub fn read_pr_curve(path: &Path) -> Result<Vec<PrCurveRow>> {
    let mut rows = read_rows(path)?;
    strip_header(&mut rows, 0);

    let curve = collect_numeric(path, &rows, |row| {
        let values: Vec<f64> = (0..6).map_while(|column| row.number(column)).collect();
        if values.len() < 6 {
            return None;
        }
        Some(PrCurveRow {
            precision: [values[0], values[1], values[2]],
            recall: [values[3], values[4], values[5]],
            tp_family: row.number(6).map_or(0, |value| value as u64),
        })
    });

    if curve.is_empty() {
        return Err(PipelineError::EmptyResult(format!(
            "no numeric PR-curve rows in {}",
            path.display()
        ))
        .into());
    }
    Ok(curve)
}

fn collect_numeric<T>(path: &Path, rows: &[Row], parse: impl Fn(&Row) -> Option<T>) -> Vec<T> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        match parse(row) {
            Some(value) => values.push(value),
            None => warn!(path = %path.display(), line = row.line, "skipping non-numeric row"),
        }
    }
    values
}

pub fn write_metrics(path: &Path, metrics: &[(String, f64)]) -> Result<()> {
    let mut out = create_output_file(path)?;
    for (name, value) in metrics {
        writeln!(out, "{name}\t{}", fixed6(*value))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

pub fn read_metrics(path: &Path) -> Result<Vec<(String, f64)>> {
    let rows = read_rows(path)?;
    let mut metrics = Vec::with_capacity(rows.len());
    for row in &rows {
        let (Some(name), Some(value)) = (row.field(0), row.number(1)) else {
            warn!(path = %path.display(), line = row.line, "skipping malformed metric row");
            continue;
        };
        metrics.push((name.to_string(), value));
    }
    Ok(metrics)
}
