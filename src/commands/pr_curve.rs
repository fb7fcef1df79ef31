use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::ClassifyArgs;
use crate::commands::first_hit::ensure_ranked;
use crate::commands::triplet_io::read_triplets;
use crate::lookup::Lookup;
use crate::model::{Level, PrCurveRow, Triplet};
use crate::util::create_output_file;

pub fn run(args: ClassifyArgs) -> Result<()> {
    let lookup = Lookup::load(&args.scop_lookup, !args.no_lower)?;
    let input = read_triplets(&args.input)?;
    ensure_ranked(&args.input, &input.triplets)?;

    let rows = build_pr_curve(&input.triplets, &lookup);
    write_pr_curve(&args.output, &rows)?;
    info!(rows = rows.len(), path = %args.output.display(), "wrote PR curve");
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LevelCounts {
    tp: u64,
    fp: u64,
}

impl LevelCounts {
    fn record(self, hit: bool) -> Self {
        if hit {
            Self {
                tp: self.tp + 1,
                ..self
            }
        } else {
            Self {
                fp: self.fp + 1,
                ..self
            }
        }
    }

    fn precision(self) -> f64 {
        let seen = self.tp + self.fp;
        if seen == 0 {
            return 0.0;
        }
        self.tp as f64 / seen as f64
    }

    fn recall(self, positives: u64) -> f64 {
        if positives == 0 {
            return 0.0;
        }
        self.tp as f64 / positives as f64
    }
}

/// Running true/false positive counts for every level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CurveState {
    levels: [LevelCounts; 3],
}

impl CurveState {
    fn advance(self, matches: [bool; 3]) -> Self {
        let mut levels = self.levels;
        for level in Level::ALL {
            let index = level.index();
            levels[index] = levels[index].record(matches[index]);
        }
        Self { levels }
    }

    fn row(&self, positives: &[u64; 3]) -> PrCurveRow {
        PrCurveRow {
            precision: self.levels.map(LevelCounts::precision),
            recall: Level::ALL.map(|level| {
                self.levels[level.index()].recall(positives[level.index()])
            }),
            tp_family: self.levels[Level::Family.index()].tp,
        }
    }
}

/// Walks the ranked stream once, emitting one cumulative row per hit.
/// Self-hits carry no row since self-pairs are not counted as positives.
/// A (query, target) pair repeated later in the stream carries no row either,
/// so each positive pair is counted at most once.
pub fn build_pr_curve(sorted: &[Triplet], lookup: &Lookup) -> Vec<PrCurveRow> {
    let positives = Level::ALL.map(|level| lookup.same_class_pairs(level));
    for level in Level::ALL {
        if positives[level.index()] == 0 {
            warn!(
                level = level.as_str(),
                "lookup has no same-class pairs; recall reported as 0"
            );
        }
    }

    let mut seen = HashSet::<(&str, &str)>::new();
    sorted
        .iter()
        .filter(|triplet| !triplet.is_self_hit())
        .filter(|triplet| seen.insert((triplet.query.as_str(), triplet.target.as_str())))
        .scan(CurveState::default(), |state, triplet| {
            *state = state.advance(hit_matches(triplet, lookup));
            Some(state.row(&positives))
        })
        .collect()
}

fn hit_matches(triplet: &Triplet, lookup: &Lookup) -> [bool; 3] {
    match (lookup.get(&triplet.query), lookup.get(&triplet.target)) {
        (Some(query), Some(target)) => query.matches(target),
        _ => [false; 3],
    }
}

/// Writes the curve without a header: the first field of every row is numeric.
pub fn write_pr_curve(path: &Path, rows: &[PrCurveRow]) -> Result<()> {
    let mut out = create_output_file(path)?;
    for row in rows {
        let [prec_fam, prec_sfam, prec_fold] = row.precision;
        let [recall_fam, recall_sfam, recall_fold] = row.recall;
        writeln!(
            out,
            "{prec_fam}\t{prec_sfam}\t{prec_fold}\t{recall_fam}\t{recall_sfam}\t{recall_fold}\t{}",
            row.tp_family
        )
        .with_context(|| format!("failed to write {}", path.display()))?;
    }

    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}
