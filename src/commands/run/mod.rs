use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::cli::RunArgs;
use crate::commands::combine::{CombineOptions, combine};
use crate::commands::first_hit::{classify_first_hits, write_first_hits};
use crate::commands::pr_curve::{build_pr_curve, write_pr_curve};
use crate::commands::rank::rank_triplets;
use crate::commands::reduce::{pr_auc, pr_auc_metrics, top1_means, top1_metrics, write_metrics};
use crate::commands::summary::write_summary;
use crate::commands::triplet_io::write_triplets;
use crate::lookup::Lookup;
use crate::model::{
    CombineCounts, MetricScalars, RunCounts, RunLogEntry, RunManifest, RunPaths,
};
use crate::util::{
    append_json_line, ensure_directory, now_utc_string, require_directory, require_file,
    sha256_file, utc_compact_string, write_json_pretty,
};


/// Artifact locations inside one run's output directory.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub combined: PathBuf,
    pub sorted: PathBuf,
    pub first_hit: PathBuf,
    pub pr_curve: PathBuf,
    pub top1_metrics: PathBuf,
    pub pr_auc_metrics: PathBuf,
    pub summary: PathBuf,
    pub manifest: PathBuf,
}

impl RunArtifacts {
    pub fn in_dir(output_dir: &Path) -> Self {
        Self {
            combined: output_dir.join("combined.tsv"),
            sorted: output_dir.join("combined.sorted.tsv"),
            first_hit: output_dir.join("first_hit.tsv"),
            pr_curve: output_dir.join("pr_curve.tsv"),
            top1_metrics: output_dir.join("top1_metrics.tsv"),
            pr_auc_metrics: output_dir.join("pr_auc_metrics.tsv"),
            summary: output_dir.join("summary.tsv"),
            manifest: output_dir.join("run_manifest.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkOutcome {
    pub combine: CombineCounts,
    pub first_hit_records: usize,
    pub uncovered_queries: usize,
    pub pr_curve_rows: usize,
    pub metrics: MetricScalars,
}

pub fn run(args: RunArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    require_directory(&args.motif_dir, "motif directory")?;
    require_file(&args.scop_lookup, "lookup file")?;
    ensure_directory(&args.output_dir)?;

    let run_log_path = args
        .run_log
        .clone()
        .unwrap_or_else(|| default_run_log_path(&args.output_dir));

    info!(
        run_id = %run_id,
        label = %args.label,
        motif_dir = %args.motif_dir.display(),
        output_dir = %args.output_dir.display(),
        "starting benchmark run"
    );

    let options = CombineOptions::from(&args.filter);
    let lookup = Lookup::load(&args.scop_lookup, options.lowercase)?;
    let lookup_sha256 = sha256_file(&args.scop_lookup)?;

    let artifacts = RunArtifacts::in_dir(&args.output_dir);
    let outcome = execute(
        &args.motif_dir,
        &lookup,
        &options,
        args.filter.add_header,
        &artifacts,
    )?;
    write_summary(&artifacts.summary, &args.label, &outcome.metrics)?;

    let finished_at = now_utc_string();
    let manifest = RunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        label: args.label.clone(),
        started_at,
        finished_at: finished_at.clone(),
        command: render_run_command(&args),
        lookup_sha256: lookup_sha256.clone(),
        paths: RunPaths {
            motif_dir: args.motif_dir.display().to_string(),
            lookup_path: args.scop_lookup.display().to_string(),
            output_dir: args.output_dir.display().to_string(),
            run_log_path: run_log_path.display().to_string(),
        },
        counts: RunCounts {
            lookup_entries: lookup.len(),
            combine: outcome.combine.clone(),
            first_hit_records: outcome.first_hit_records,
            uncovered_queries: outcome.uncovered_queries,
            pr_curve_rows: outcome.pr_curve_rows,
        },
        metrics: outcome.metrics,
    };
    write_json_pretty(&artifacts.manifest, &manifest)?;
    info!(path = %artifacts.manifest.display(), "wrote run manifest");

    let entry = RunLogEntry {
        run_id,
        label: args.label.clone(),
        finished_at,
        output_dir: args.output_dir.display().to_string(),
        lookup_sha256,
        triplets: outcome.combine.triplets_written,
        covered_queries: outcome.first_hit_records,
        metrics: outcome.metrics,
    };
    append_json_line(&run_log_path, &entry)?;

    info!(
        label = %args.label,
        family_top1 = outcome.metrics.family_top1,
        family_pr_auc = outcome.metrics.family_pr_auc,
        summary = %artifacts.summary.display(),
        "benchmark run completed"
    );

    Ok(())
}

/// Runs every stage in data-flow order, writing each intermediate artifact.
pub fn execute(
    motif_dir: &Path,
    lookup: &Lookup,
    options: &CombineOptions,
    add_header: bool,
    artifacts: &RunArtifacts,
) -> Result<BenchmarkOutcome> {
    let mut combined = combine(motif_dir, Some(lookup), options)?;
    write_triplets(&artifacts.combined, &combined.triplets, add_header)?;
    info!(rows = combined.triplets.len(), path = %artifacts.combined.display(), "combine stage done");

    rank_triplets(&mut combined.triplets);
    let triplets = &combined.triplets;
    write_triplets(&artifacts.sorted, triplets, add_header)?;
    info!(path = %artifacts.sorted.display(), "rank stage done");

    let first_hits = classify_first_hits(triplets, lookup);
    write_first_hits(&artifacts.first_hit, &first_hits.records)?;
    info!(
        records = first_hits.records.len(),
        uncovered = first_hits.uncovered.len(),
        "first-hit stage done"
    );

    let curve = build_pr_curve(triplets, lookup);
    write_pr_curve(&artifacts.pr_curve, &curve)?;
    info!(rows = curve.len(), "PR-curve stage done");

    let flags: Vec<[bool; 3]> = first_hits.records.iter().map(|record| record.matches).collect();
    let top1 = top1_means(&flags)?;
    write_metrics(&artifacts.top1_metrics, &top1_metrics(top1))?;

    let areas = pr_auc(&curve)?;
    write_metrics(&artifacts.pr_auc_metrics, &pr_auc_metrics(areas))?;

    Ok(BenchmarkOutcome {
        combine: combined.counts,
        first_hit_records: first_hits.records.len(),
        uncovered_queries: first_hits.uncovered.len() + first_hits.unlabeled.len(),
        pr_curve_rows: curve.len(),
        metrics: MetricScalars::from_levels(top1, areas),
    })
}

fn default_run_log_path(output_dir: &Path) -> PathBuf {
    output_dir
        .parent()
        .map(|parent| parent.join("run_log.jsonl"))
        .unwrap_or_else(|| PathBuf::from("run_log.jsonl"))
}

fn render_run_command(args: &RunArgs) -> String {
    let filter = &args.filter;
    let mut command = vec![
        "scopbench".to_string(),
        "run".to_string(),
        "--motif-dir".to_string(),
        args.motif_dir.display().to_string(),
        "--scop-lookup".to_string(),
        args.scop_lookup.display().to_string(),
        "--output-dir".to_string(),
        args.output_dir.display().to_string(),
        "--label".to_string(),
        args.label.clone(),
        "--pattern".to_string(),
        filter.pattern.clone(),
        "--score-col".to_string(),
        filter.score_col.to_string(),
        "--target-col".to_string(),
        filter.target_col.to_string(),
        "--min-fields".to_string(),
        filter.min_fields.to_string(),
    ];

    if let Some(path) = &args.run_log {
        command.push("--run-log".to_string());
        command.push(path.display().to_string());
    }
    if let Some(max_files) = filter.max_files {
        command.push("--max-files".to_string());
        command.push(max_files.to_string());
    }

    let switches = [
        (filter.recursive, "--recursive"),
        (filter.whitespace, "--whitespace"),
        (filter.keep_nonlookup, "--keep-nonlookup"),
        (filter.keep_selfhits, "--keep-selfhits"),
        (filter.keep_duplicates, "--keep-duplicates"),
        (filter.no_lower, "--no-lower"),
        (filter.add_header, "--add-header"),
    ];
    command.extend(
        switches
            .into_iter()
            .filter(|(enabled, _)| *enabled)
            .map(|(_, flag)| flag.to_string()),
    );

    command.join(" ")
}
