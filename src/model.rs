use serde::{Deserialize, Serialize};

/// Taxonomic granularity at which a hit is judged.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Level {
    Family,
    Superfamily,
    Fold,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Family, Level::Superfamily, Level::Fold];

    pub fn index(self) -> usize {
        match self {
            Self::Family => 0,
            Self::Superfamily => 1,
            Self::Fold => 2,
        }
    }

    /// Capitalized name used in metric keys (`Family_Top1`).
    pub fn metric_prefix(self) -> &'static str {
        match self {
            Self::Family => "Family",
            Self::Superfamily => "Superfamily",
            Self::Fold => "Fold",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Superfamily => "superfamily",
            Self::Fold => "fold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonLabels {
    /// Classification string as it appears in the lookup.
    pub scop: String,
    pub family: String,
    pub superfamily: String,
    pub fold: String,
}

impl TaxonLabels {
    pub fn label(&self, level: Level) -> &str {
        match level {
            Level::Family => &self.family,
            Level::Superfamily => &self.superfamily,
            Level::Fold => &self.fold,
        }
    }

    pub fn matches(&self, other: &TaxonLabels) -> [bool; 3] {
        Level::ALL.map(|level| self.label(level) == other.label(level))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Triplet {
    pub query: String,
    pub target: String,
    pub score: f64,
}

impl Triplet {
    pub fn is_self_hit(&self) -> bool {
        self.query == self.target
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstHitRecord {
    pub name: String,
    pub scop: String,
    /// Family, superfamily, fold match flags of the top-ranked valid hit.
    pub matches: [bool; 3],
    /// Hits for this query ranked above the selected one that could not match.
    pub false_positives: usize,
    /// Lookup population of the query's classes, excluding the query.
    pub class_sizes: [usize; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrCurveRow {
    pub precision: [f64; 3],
    pub recall: [f64; 3],
    pub tp_family: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricScalars {
    pub family_top1: f64,
    pub superfamily_top1: f64,
    pub fold_top1: f64,
    pub family_pr_auc: f64,
    pub superfamily_pr_auc: f64,
    pub fold_pr_auc: f64,
}

impl MetricScalars {
    pub fn from_levels(top1: [f64; 3], pr_auc: [f64; 3]) -> Self {
        Self {
            family_top1: top1[0],
            superfamily_top1: top1[1],
            fold_top1: top1[2],
            family_pr_auc: pr_auc[0],
            superfamily_pr_auc: pr_auc[1],
            fold_pr_auc: pr_auc[2],
        }
    }

    pub fn values(&self) -> [f64; 6] {
        [
            self.family_top1,
            self.superfamily_top1,
            self.fold_top1,
            self.family_pr_auc,
            self.superfamily_pr_auc,
            self.fold_pr_auc,
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombineCounts {
    pub files_processed: usize,
    pub queries_skipped: usize,
    pub raw_lines: usize,
    pub malformed_lines: usize,
    pub invalid_scores: usize,
    pub self_hits_dropped: usize,
    pub missing_lookup_ids: usize,
    pub duplicates_merged: usize,
    pub triplets_written: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPaths {
    pub motif_dir: String,
    pub lookup_path: String,
    pub output_dir: String,
    pub run_log_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCounts {
    pub lookup_entries: usize,
    pub combine: CombineCounts,
    pub first_hit_records: usize,
    pub uncovered_queries: usize,
    pub pr_curve_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub label: String,
    pub started_at: String,
    pub finished_at: String,
    pub command: String,
    pub lookup_sha256: String,
    pub paths: RunPaths,
    pub counts: RunCounts,
    pub metrics: MetricScalars,
}

/// One line of the shared, append-only run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub run_id: String,
    pub label: String,
    pub finished_at: String,
    pub output_dir: String,
    pub lookup_sha256: String,
    pub triplets: usize,
    pub covered_queries: usize,
    pub metrics: MetricScalars,
}
