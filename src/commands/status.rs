use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::RunLogEntry;

pub fn run(args: StatusArgs) -> Result<()> {
    info!(run_log = %args.run_log.display(), "status requested");

    if !args.run_log.exists() {
        warn!(path = %args.run_log.display(), "run log missing");
        return Ok(());
    }

    let entries = read_run_log(&args.run_log)?;
    let skip = args
        .last
        .map_or(0, |last| entries.len().saturating_sub(last));

    for entry in entries.iter().skip(skip) {
        info!(
            run_id = %entry.run_id,
            label = %entry.label,
            finished_at = %entry.finished_at,
            output_dir = %entry.output_dir,
            triplets = entry.triplets,
            covered_queries = entry.covered_queries,
            family_top1 = entry.metrics.family_top1,
            superfamily_top1 = entry.metrics.superfamily_top1,
            fold_top1 = entry.metrics.fold_top1,
            family_pr_auc = entry.metrics.family_pr_auc,
            superfamily_pr_auc = entry.metrics.superfamily_pr_auc,
            fold_pr_auc = entry.metrics.fold_pr_auc,
            "recorded run"
        );
    }
    info!(runs = entries.len(), "run log loaded");

    Ok(())
}

/// Parses the run log; lines that fail to parse are reported and skipped.
pub fn read_run_log(path: &Path) -> Result<Vec<RunLogEntry>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    let mut entries = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RunLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %err,
                "skipping unreadable run log line"
            ),
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::read_run_log;
    use crate::model::{MetricScalars, RunLogEntry};
    use crate::util::append_json_line;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn read_run_log_skips_torn_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run_log.jsonl");

        let entry = RunLogEntry {
            run_id: "run-20260101T000000Z".to_string(),
            label: "pct_5".to_string(),
            finished_at: "2026-01-01T00:00:00Z".to_string(),
            output_dir: "out/5".to_string(),
            lookup_sha256: "0".repeat(64),
            triplets: 10,
            covered_queries: 3,
            metrics: MetricScalars::from_levels([1.0, 1.0, 1.0], [0.5, 0.5, 0.5]),
        };
        append_json_line(&path, &entry).unwrap();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{\"run_id\": \n")
            .unwrap();
        append_json_line(&path, &entry).unwrap();

        let entries = read_run_log(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].label, "pct_5");
        assert_eq!(entries[0].metrics.family_pr_auc, 0.5);
    }
}
