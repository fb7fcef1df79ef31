use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "scopbench",
    version,
    about = "Ranking-quality benchmark for structural search hits against a SCOP lookup"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge per-query motif outputs into query/target/score triplets.
    Combine(CombineArgs),
    /// Sort triplets by score descending with a deterministic tie-break.
    Rank(RankArgs),
    /// Classify the top-ranked valid hit of every query.
    FirstHit(ClassifyArgs),
    /// Build the cumulative precision/recall curve over the ranked stream.
    PrCurve(ClassifyArgs),
    /// Reduce a first-hit file to mean Top-1 rates.
    Top1(ReduceArgs),
    /// Integrate a PR-curve file into PR-AUC values.
    PrAuc(ReduceArgs),
    /// Merge metrics files into one labeled summary row.
    Summarize(SummarizeArgs),
    /// Run every stage in order for one motif directory.
    Run(RunArgs),
    /// Show recorded runs from the run log.
    Status(StatusArgs),
    /// Generate the search manifest from per-residue conservation scores.
    MotifInput(MotifInputArgs),
}

/// Options shared by `combine` and `run` that control how motif lines are
/// parsed and filtered.
#[derive(Args, Debug, Clone)]
pub struct MotifFilterArgs {
    #[arg(long, default_value = "*_motif.out")]
    pub pattern: String,

    #[arg(long, default_value_t = false)]
    pub recursive: bool,

    #[arg(long)]
    pub max_files: Option<usize>,

    #[arg(long, default_value_t = 1)]
    pub score_col: usize,

    #[arg(long, default_value_t = 0)]
    pub target_col: usize,

    #[arg(long, default_value_t = 2)]
    pub min_fields: usize,

    /// Split on any whitespace instead of tabs.
    #[arg(long, default_value_t = false)]
    pub whitespace: bool,

    #[arg(long, default_value_t = false)]
    pub keep_nonlookup: bool,

    #[arg(long, default_value_t = false)]
    pub keep_selfhits: bool,

    /// Keep every instance of a repeated query/target pair.
    #[arg(long, default_value_t = false)]
    pub keep_duplicates: bool,

    #[arg(long, default_value_t = false)]
    pub no_lower: bool,

    #[arg(long, default_value_t = false)]
    pub add_header: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CombineArgs {
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub output: PathBuf,

    #[arg(long)]
    pub scop_lookup: Option<PathBuf>,

    #[command(flatten)]
    pub filter: MotifFilterArgs,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long)]
    pub report_missing: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RankArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    /// Sorted triplet file.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub scop_lookup: PathBuf,

    #[arg(long)]
    pub output: PathBuf,

    #[arg(long, default_value_t = false)]
    pub no_lower: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReduceArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SummarizeArgs {
    #[arg(long)]
    pub label: String,

    #[arg(long)]
    pub top1: PathBuf,

    #[arg(long)]
    pub pr_auc: PathBuf,

    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub motif_dir: PathBuf,

    #[arg(long)]
    pub scop_lookup: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub label: String,

    /// Shared run log; defaults to `run_log.jsonl` next to the output directory.
    #[arg(long)]
    pub run_log: Option<PathBuf>,

    #[command(flatten)]
    pub filter: MotifFilterArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "run_log.jsonl")]
    pub run_log: PathBuf,

    #[arg(long)]
    pub last: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct MotifInputArgs {
    /// FASTA-style identifier lines (`>ID ...`).
    #[arg(long)]
    pub ids: PathBuf,

    /// One line of per-residue scores per identifier.
    #[arg(long)]
    pub scores: PathBuf,

    #[arg(long)]
    pub pdb_dir: PathBuf,

    #[arg(long, default_value_t = 5.0)]
    pub percent: f64,

    #[arg(long, default_value_t = 1)]
    pub min_residues: usize,

    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, default_value_t = false)]
    pub with_output_path: bool,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub per_chain: bool,
}
