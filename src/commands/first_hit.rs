use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::ClassifyArgs;
use crate::commands::rank::is_ranked;
use crate::commands::triplet_io::read_triplets;
use crate::error::PipelineError;
use crate::lookup::Lookup;
use crate::model::{FirstHitRecord, Triplet};
use crate::util::create_output_file;

pub const FIRST_HIT_HEADER: &str = "NAME\tSCOP\tFAM\tSFAM\tFOLD\tFP\tFAMCNT\tSFAMCNT\tFOLDCNT";

#[derive(Debug, Clone, Default)]
pub struct FirstHitOutput {
    pub records: Vec<FirstHitRecord>,
    /// Queries seen in the stream without any valid hit.
    pub uncovered: Vec<String>,
    /// Queries absent from the lookup; they cannot be judged.
    pub unlabeled: Vec<String>,
}

pub fn run(args: ClassifyArgs) -> Result<()> {
    let lookup = Lookup::load(&args.scop_lookup, !args.no_lower)?;
    let input = read_triplets(&args.input)?;
    ensure_ranked(&args.input, &input.triplets)?;

    let output = classify_first_hits(&input.triplets, &lookup);
    write_first_hits(&args.output, &output.records)?;
    info!(
        records = output.records.len(),
        path = %args.output.display(),
        "wrote first-hit records"
    );
    Ok(())
}

pub(crate) fn ensure_ranked(path: &Path, triplets: &[Triplet]) -> Result<()> {
    if !is_ranked(triplets) {
        return Err(PipelineError::Configuration(format!(
            "{} is not in rank order; run `rank` first",
            path.display()
        ))
        .into());
    }
    Ok(())
}

enum Scan {
    Pending { skipped: usize },
    Done(FirstHitRecord),
    Unlabeled,
}

/// Picks, for each query in order of first appearance, its highest-ranked
/// hit whose target is in the lookup and is not the query itself.
pub fn classify_first_hits(sorted: &[Triplet], lookup: &Lookup) -> FirstHitOutput {
    let mut order = Vec::<&str>::new();
    let mut scans = HashMap::<&str, Scan>::new();

    for triplet in sorted {
        let query = triplet.query.as_str();
        let scan = scans.entry(query).or_insert_with(|| {
            order.push(query);
            if lookup.contains(query) {
                Scan::Pending { skipped: 0 }
            } else {
                Scan::Unlabeled
            }
        });

        let Scan::Pending { skipped } = &mut *scan else {
            continue;
        };
        if triplet.is_self_hit() {
            continue;
        }

        let (Some(query_labels), Some(target_labels)) =
            (lookup.get(query), lookup.get(&triplet.target))
        else {
            // A target outside the lookup can never share a family.
            *skipped += 1;
            continue;
        };

        let record = FirstHitRecord {
            name: query.to_string(),
            scop: query_labels.scop.clone(),
            matches: query_labels.matches(target_labels),
            false_positives: *skipped,
            class_sizes: lookup.peers(query_labels),
        };
        *scan = Scan::Done(record);
    }

    // Records follow the order in which queries first appear in the stream.
    let mut output = FirstHitOutput::default();
    for query in order {
        match scans.remove(query) {
            Some(Scan::Done(record)) => output.records.push(record),
            Some(Scan::Pending { .. }) => output.uncovered.push(query.to_string()),
            Some(Scan::Unlabeled) => output.unlabeled.push(query.to_string()),
            None => {}
        }
    }

    if !output.uncovered.is_empty() {
        warn!(
            queries = output.uncovered.len(),
            "queries without a valid hit are excluded from Top-1"
        );
    }
    if !output.unlabeled.is_empty() {
        warn!(
            queries = output.unlabeled.len(),
            "queries missing from the lookup are excluded from Top-1"
        );
    }

    output
}

pub fn write_first_hits(path: &Path, records: &[FirstHitRecord]) -> Result<()> {
    let mut out = create_output_file(path)?;
    writeln!(out, "{FIRST_HIT_HEADER}")
        .with_context(|| format!("failed to write {}", path.display()))?;

    for record in records {
        let [fam, sfam, fold] = record.matches.map(u8::from);
        let [fam_count, sfam_count, fold_count] = record.class_sizes;
        writeln!(
            out,
            "{}\t{}\t{fam}\t{sfam}\t{fold}\t{}\t{fam_count}\t{sfam_count}\t{fold_count}",
            record.name, record.scop, record.false_positives
        )
        .with_context(|| format!("failed to write {}", path.display()))?;
    }

    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}
