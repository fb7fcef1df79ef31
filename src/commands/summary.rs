use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::SummarizeArgs;
use crate::commands::reduce::read_metrics;
use crate::error::PipelineError;
use crate::model::MetricScalars;
use crate::util::{create_output_file, fixed6};

pub const SUMMARY_HEADER: &str =
    "label\tfamily_top1\tsuperfamily_top1\tfold_top1\tfamily_pr_auc\tsuperfamily_pr_auc\tfold_pr_auc";

const METRIC_KEYS: [&str; 6] = [
    "Family_Top1",
    "Superfamily_Top1",
    "Fold_Top1",
    "Family_PR_AUC",
    "Superfamily_PR_AUC",
    "Fold_PR_AUC",
];

pub fn run(args: SummarizeArgs) -> Result<()> {
    let mut metrics = read_metrics(&args.top1)?;
    metrics.extend(read_metrics(&args.pr_auc)?);

    let scalars = assemble(&metrics)?;
    write_summary(&args.output, &args.label, &scalars)?;
    info!(label = %args.label, path = %args.output.display(), "wrote summary");
    Ok(())
}

/// Collects the six named scalars; the last value wins for a repeated name.
pub fn assemble(metrics: &[(String, f64)]) -> Result<MetricScalars> {
    let by_name: HashMap<&str, f64> = metrics
        .iter()
        .map(|(name, value)| (name.as_str(), *value))
        .collect();

    let mut values = [0.0_f64; 6];
    for (slot, key) in values.iter_mut().zip(METRIC_KEYS) {
        *slot = *by_name.get(key).ok_or_else(|| {
            PipelineError::EmptyResult(format!("metric {key} missing from inputs"))
        })?;
    }

    Ok(MetricScalars::from_levels(
        [values[0], values[1], values[2]],
        [values[3], values[4], values[5]],
    ))
}

pub fn summary_lines(label: &str, scalars: &MetricScalars) -> [String; 2] {
    let values: Vec<String> = scalars.values().into_iter().map(fixed6).collect();
    [SUMMARY_HEADER.to_string(), format!("{label}\t{}", values.join("\t"))]
}

pub fn write_summary(path: &Path, label: &str, scalars: &MetricScalars) -> Result<()> {
    let mut out = create_output_file(path)?;
    for line in summary_lines(label, scalars) {
        writeln!(out, "{line}").with_context(|| format!("failed to write {}", path.display()))?;
    }
    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{assemble, summary_lines};
    use crate::commands::reduce::{pr_auc_metrics, top1_metrics};

    #[test]
    fn summary_row_orders_top1_before_auc() {
        let mut metrics = top1_metrics([1.0, 0.5, 0.25]);
        metrics.extend(pr_auc_metrics([0.5, 0.125, 0.0]));

        let scalars = assemble(&metrics).unwrap();
        let [header, row] = summary_lines("pct_10", &scalars);
        assert_eq!(header.split('\t').count(), 7);
        assert_eq!(
            row,
            "pct_10\t1.000000\t0.500000\t0.250000\t0.500000\t0.125000\t0.000000"
        );
    }

    #[test]
    fn missing_metric_is_reported() {
        let metrics = top1_metrics([1.0, 1.0, 1.0]);
        assert!(assemble(&metrics).is_err());
    }
}
