use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::{CombineArgs, MotifFilterArgs};
use crate::commands::triplet_io::write_triplets;
use crate::error::PipelineError;
use crate::lookup::Lookup;
use crate::model::{CombineCounts, Triplet};
use crate::tsv::parse_finite;
use crate::util::{create_output_file, require_directory};

const STRUCTURE_EXTENSIONS: [&str; 4] = [".pdb", ".cif", ".ent", ".gz"];

#[derive(Debug, Clone)]
pub struct CombineOptions {
    pub pattern: String,
    pub recursive: bool,
    pub max_files: Option<usize>,
    pub score_col: usize,
    pub target_col: usize,
    pub min_fields: usize,
    pub whitespace: bool,
    pub keep_nonlookup: bool,
    pub keep_selfhits: bool,
    pub keep_duplicates: bool,
    pub lowercase: bool,
}

impl From<&MotifFilterArgs> for CombineOptions {
    fn from(args: &MotifFilterArgs) -> Self {
        Self {
            pattern: args.pattern.clone(),
            recursive: args.recursive,
            max_files: args.max_files,
            score_col: args.score_col,
            target_col: args.target_col,
            min_fields: args.min_fields,
            whitespace: args.whitespace,
            keep_nonlookup: args.keep_nonlookup,
            keep_selfhits: args.keep_selfhits,
            keep_duplicates: args.keep_duplicates,
            lowercase: !args.no_lower,
        }
    }
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            pattern: "*_motif.out".to_string(),
            recursive: false,
            max_files: None,
            score_col: 1,
            target_col: 0,
            min_fields: 2,
            whitespace: false,
            keep_nonlookup: false,
            keep_selfhits: false,
            keep_duplicates: false,
            lowercase: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CombineOutput {
    pub triplets: Vec<Triplet>,
    pub counts: CombineCounts,
    /// Target identifiers dropped for lack of a lookup entry.
    pub missing_ids: BTreeSet<String>,
}

pub fn run(args: CombineArgs) -> Result<()> {
    let options = CombineOptions::from(&args.filter);
    let lookup = args
        .scop_lookup
        .as_deref()
        .map(|path| Lookup::load(path, options.lowercase))
        .transpose()?;

    let output = combine(&args.input_dir, lookup.as_ref(), &options)?;

    if args.dry_run {
        info!(
            triplets = output.triplets.len(),
            input_dir = %args.input_dir.display(),
            "combine dry-run complete"
        );
        return Ok(());
    }

    write_triplets(&args.output, &output.triplets, args.filter.add_header)?;
    info!(path = %args.output.display(), "wrote combined triplets");

    if let Some(path) = args.report_missing.as_deref() {
        if lookup.is_some() && !output.missing_ids.is_empty() {
            write_missing_report(path, &output.missing_ids)?;
        }
    }

    Ok(())
}

pub fn combine(
    input_dir: &Path,
    lookup: Option<&Lookup>,
    options: &CombineOptions,
) -> Result<CombineOutput> {
    require_directory(input_dir, "motif directory")?;

    let mut files = discover_motif_files(input_dir, &options.pattern, options.recursive)?;
    if let Some(max_files) = options.max_files {
        files.truncate(max_files);
    }
    if files.is_empty() {
        return Err(PipelineError::EmptyResult(format!(
            "no files matched pattern {} in {}",
            options.pattern,
            input_dir.display()
        ))
        .into());
    }
    info!(files = files.len(), input_dir = %input_dir.display(), "found motif files");

    let drop_missing = lookup.is_some() && !options.keep_nonlookup;
    let mut output = CombineOutput::default();
    let mut positions = HashMap::<(String, String), usize>::new();

    for path in &files {
        let Some(raw_query) = query_id_from_path(path) else {
            warn!(path = %path.display(), "cannot derive query id from file name");
            output.counts.queries_skipped += 1;
            continue;
        };

        let query = match cleanup_id(&raw_query, options.lowercase, lookup) {
            Some(query) => query,
            None if drop_missing => {
                debug!(query = %raw_query, "query id not in lookup");
                output.counts.queries_skipped += 1;
                continue;
            }
            None => normalize_id(&raw_query, options.lowercase),
        };

        output.counts.files_processed += 1;
        scan_motif_file(path, &query, lookup, options, &mut output, &mut positions)?;
    }

    output.counts.triplets_written = output.triplets.len();
    log_counts(&output.counts, lookup.is_some());

    if output.triplets.is_empty() {
        return Err(PipelineError::EmptyResult(format!(
            "no triplets left after filtering {}",
            input_dir.display()
        ))
        .into());
    }

    Ok(output)
}

fn scan_motif_file(
    path: &Path,
    query: &str,
    lookup: Option<&Lookup>,
    options: &CombineOptions,
    output: &mut CombineOutput,
    positions: &mut HashMap<(String, String), usize>,
) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let drop_missing = lookup.is_some() && !options.keep_nonlookup;
    let mut malformed = 0_usize;
    let mut invalid_scores = 0_usize;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .with_context(|| format!("failed to read {} line {}", path.display(), index + 1))?;

        let Some(fields) = split_motif_line(&line, options) else {
            continue;
        };
        let (Some(raw_target), Some(raw_score)) =
            (fields.get(options.target_col), fields.get(options.score_col))
        else {
            malformed += 1;
            debug!(path = %path.display(), line = index + 1, fields = fields.len(), "malformed motif line");
            continue;
        };
        output.counts.raw_lines += 1;

        let target = match cleanup_id(raw_target, options.lowercase, lookup) {
            Some(target) => target,
            None if drop_missing => {
                output.counts.missing_lookup_ids += 1;
                output.missing_ids.insert(basename(raw_target.trim()).to_string());
                continue;
            }
            None => normalize_id(raw_target, options.lowercase),
        };

        if !options.keep_selfhits && target == query {
            output.counts.self_hits_dropped += 1;
            continue;
        }

        let Some(score) = parse_finite(raw_score) else {
            invalid_scores += 1;
            debug!(path = %path.display(), line = index + 1, score = %raw_score, "invalid score");
            continue;
        };

        push_triplet(output, positions, options.keep_duplicates, query, target, score);
    }

    if malformed > 0 || invalid_scores > 0 {
        warn!(
            path = %path.display(),
            malformed,
            invalid_scores,
            "skipped unparseable motif lines"
        );
    }
    output.counts.malformed_lines += malformed;
    output.counts.invalid_scores += invalid_scores;

    Ok(())
}

/// Repeated pairs keep their first position and the best score seen.
fn push_triplet(
    output: &mut CombineOutput,
    positions: &mut HashMap<(String, String), usize>,
    keep_duplicates: bool,
    query: &str,
    target: String,
    score: f64,
) {
    if !keep_duplicates {
        let key = (query.to_string(), target.clone());
        if let Some(&position) = positions.get(&key) {
            output.counts.duplicates_merged += 1;
            let existing = &mut output.triplets[position];
            existing.score = existing.score.max(score);
            return;
        }
        positions.insert(key, output.triplets.len());
    }

    output.triplets.push(Triplet {
        query: query.to_string(),
        target,
        score,
    });
}

fn log_counts(counts: &CombineCounts, with_lookup: bool) {
    info!(
        files = counts.files_processed,
        raw_lines = counts.raw_lines,
        triplets = counts.triplets_written,
        self_hits_dropped = counts.self_hits_dropped,
        duplicates_merged = counts.duplicates_merged,
        "combine statistics"
    );
    if with_lookup {
        info!(
            missing_lookup_ids = counts.missing_lookup_ids,
            queries_skipped = counts.queries_skipped,
            "lookup filtering"
        );
    }
}

pub fn discover_motif_files(input_dir: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let root = glob::Pattern::escape(&input_dir.to_string_lossy());
    let full_pattern = if recursive {
        format!("{root}/**/{pattern}")
    } else {
        format!("{root}/{pattern}")
    };

    let entries = glob::glob(&full_pattern)
        .with_context(|| format!("invalid file pattern: {pattern}"))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.with_context(|| format!("failed to read entry in {}", input_dir.display()))?;
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// `d1a0aa__motif.out` names query `d1a0aa_`: everything before the last `_`.
pub fn query_id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let query = name.rsplit_once('_').map_or(name, |(head, _)| head);
    (!query.is_empty()).then(|| query.to_string())
}

/// Normalizes a raw identifier and, with a lookup, maps it onto a known key.
/// `None` means the lookup has no such entity.
pub fn cleanup_id(raw: &str, lowercase: bool, lookup: Option<&Lookup>) -> Option<String> {
    let normalized = normalize_id(raw, lowercase);
    match lookup {
        Some(lookup) => lookup.resolve(&normalized),
        None => Some(normalized),
    }
}

/// Strips directory components and structure-file extensions.
pub fn normalize_id(raw: &str, lowercase: bool) -> String {
    let mut id = basename(raw.trim());

    while let Some(shorter) = STRUCTURE_EXTENSIONS
        .iter()
        .find_map(move |ext| strip_suffix_ignore_case(id, ext))
    {
        id = shorter;
    }

    if lowercase {
        id.to_lowercase()
    } else {
        id.to_string()
    }
}

fn strip_suffix_ignore_case<'a>(id: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = id.len().checked_sub(suffix.len())?;
    let tail = id.get(cut..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &id[..cut])
}

fn basename(raw: &str) -> &str {
    raw.rsplit_once('/').map_or(raw, |(_, name)| name)
}

/// Returns the fields of a data line, or `None` for blank/comment lines.
/// Lines with too few fields come back short so the caller can count them.
fn split_motif_line<'a>(line: &'a str, options: &CombineOptions) -> Option<Vec<&'a str>> {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return None;
    }

    let mut fields: Vec<&str> = if options.whitespace {
        stripped.split_whitespace().collect()
    } else {
        stripped.split('\t').collect()
    };
    if !options.whitespace && fields.len() < options.min_fields {
        fields = stripped.split_whitespace().collect();
    }
    if fields.len() < options.min_fields {
        fields.clear();
    }

    Some(fields)
}

fn write_missing_report(path: &Path, missing: &BTreeSet<String>) -> Result<()> {
    let mut out = create_output_file(path)?;
    for id in missing {
        writeln!(out, "{id}").with_context(|| format!("failed to write {}", path.display()))?;
    }
    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    info!(path = %path.display(), missing = missing.len(), "wrote missing id report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CombineOptions, combine, normalize_id, query_id_from_path, run};
    use crate::cli::{CombineArgs, MotifFilterArgs};
    use crate::error::PipelineError;
    use crate::lookup::{Lookup, sccs_labels};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const LOOKUP_TSV: &str = "q1\ta.1.1.1\nt1\ta.1.1.1\nt2\tb.2.2.2\n";

    fn combine_args(input_dir: &Path, output: PathBuf, lookup: &Path) -> CombineArgs {
        CombineArgs {
            input_dir: input_dir.to_path_buf(),
            output,
            scop_lookup: Some(lookup.to_path_buf()),
            filter: MotifFilterArgs {
                pattern: "*_motif.out".to_string(),
                recursive: false,
                max_files: None,
                score_col: 1,
                target_col: 0,
                min_fields: 2,
                whitespace: false,
                keep_nonlookup: false,
                keep_selfhits: false,
                keep_duplicates: false,
                no_lower: false,
                add_header: false,
            },
            dry_run: false,
            report_missing: None,
        }
    }

    fn write_run_inputs(root: &Path) -> (PathBuf, PathBuf) {
        let motif_dir = root.join("motifs");
        fs::create_dir_all(&motif_dir).unwrap();
        fs::write(
            motif_dir.join("q1_motif.out"),
            "t1\t0.9\nzeta\t0.8\nalpha.pdb\t0.7\nzeta\t0.6\n",
        )
        .unwrap();
        let lookup_path = root.join("lookup.tsv");
        fs::write(&lookup_path, LOOKUP_TSV).unwrap();
        (motif_dir, lookup_path)
    }

    fn lookup() -> Lookup {
        Lookup::from_entries(vec![
            ("q1".to_string(), sccs_labels("a.1.1.1")),
            ("t1".to_string(), sccs_labels("a.1.1.1")),
            ("t2".to_string(), sccs_labels("b.2.2.2")),
            ("d3c_".to_string(), sccs_labels("c.3.3.3")),
        ])
    }

    #[test]
    fn query_id_keeps_everything_before_last_underscore() {
        assert_eq!(
            query_id_from_path(Path::new("/out/d1a0aa__motif.out")).as_deref(),
            Some("d1a0aa_")
        );
        assert_eq!(
            query_id_from_path(Path::new("Q1_motif.out")).as_deref(),
            Some("Q1")
        );
        assert_eq!(
            query_id_from_path(Path::new("plain.out")).as_deref(),
            Some("plain.out")
        );
    }

    #[test]
    fn normalize_id_strips_paths_and_stacked_extensions() {
        assert_eq!(normalize_id("/data/pdb/D2GKMA_.pdb", true), "d2gkma_");
        assert_eq!(normalize_id("d2gkma_.PDB.gz", false), "d2gkma_");
        assert_eq!(normalize_id("d2gkma_", false), "d2gkma_");
    }

    #[test]
    fn combine_filters_self_hits_missing_ids_and_duplicates() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("Q1_motif.out"),
            "# header comment\n\
             /pdb/T1.pdb\t0.9\n\
             q1\t5.0\n\
             T2\t0.5\n\
             unknown\t0.7\n\
             t2\t0.6\n\
             onlyonefield\n\
             t1\tnot-a-number\n",
        )
        .unwrap();
        fs::write(tmp.path().join("ignored.txt"), "t1\t1.0\n").unwrap();

        let lookup = lookup();
        let output = combine(tmp.path(), Some(&lookup), &CombineOptions::default()).unwrap();

        let pairs: Vec<(&str, &str, f64)> = output
            .triplets
            .iter()
            .map(|t| (t.query.as_str(), t.target.as_str(), t.score))
            .collect();
        assert_eq!(pairs, vec![("q1", "t1", 0.9), ("q1", "t2", 0.6)]);

        assert_eq!(output.counts.self_hits_dropped, 1);
        assert_eq!(output.counts.missing_lookup_ids, 1);
        assert_eq!(output.counts.duplicates_merged, 1);
        assert_eq!(output.counts.malformed_lines, 1);
        assert_eq!(output.counts.invalid_scores, 1);
        assert!(output.missing_ids.contains("unknown"));
        assert!(output.triplets.iter().all(|t| !t.is_self_hit()));
    }

    #[test]
    fn combine_honours_keep_flags_and_custom_columns() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("Q1_motif.out"),
            "0.9 q1 x\n0.4 stranger x\n",
        )
        .unwrap();

        let options = CombineOptions {
            score_col: 0,
            target_col: 1,
            whitespace: true,
            keep_selfhits: true,
            keep_nonlookup: true,
            ..CombineOptions::default()
        };
        let lookup = lookup();
        let output = combine(tmp.path(), Some(&lookup), &options).unwrap();

        let targets: Vec<&str> = output.triplets.iter().map(|t| t.target.as_str()).collect();
        assert_eq!(targets, vec!["q1", "stranger"]);
    }

    #[test]
    fn combine_repairs_underscore_on_query_and_target() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("q1_motif.out"), "d3c\t2.5\n").unwrap();

        let lookup = lookup();
        let output = combine(tmp.path(), Some(&lookup), &CombineOptions::default()).unwrap();
        assert_eq!(output.triplets[0].target, "d3c_");
    }

    #[test]
    fn combine_reports_configuration_and_empty_conditions() {
        let tmp = TempDir::new().unwrap();
        let lookup = lookup();

        let missing = combine(&tmp.path().join("absent"), Some(&lookup), &CombineOptions::default())
            .unwrap_err();
        assert!(matches!(
            missing.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration(_))
        ));

        let no_files = combine(tmp.path(), Some(&lookup), &CombineOptions::default()).unwrap_err();
        assert!(matches!(
            no_files.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyResult(_))
        ));

        fs::write(tmp.path().join("q1_motif.out"), "q1\t1.0\n").unwrap();
        let only_self = combine(tmp.path(), Some(&lookup), &CombineOptions::default()).unwrap_err();
        assert!(matches!(
            only_self.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyResult(_))
        ));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (motif_dir, lookup_path) = write_run_inputs(tmp.path());
        let output = tmp.path().join("combined.tsv");
        let report = tmp.path().join("missing.txt");

        let mut args = combine_args(&motif_dir, output.clone(), &lookup_path);
        args.dry_run = true;
        args.report_missing = Some(report.clone());
        run(args).unwrap();

        assert!(!output.exists());
        assert!(!report.exists());
    }

    #[test]
    fn missing_report_lists_sorted_unique_ids() {
        let tmp = TempDir::new().unwrap();
        let (motif_dir, lookup_path) = write_run_inputs(tmp.path());
        let output = tmp.path().join("combined.tsv");
        let report = tmp.path().join("missing.txt");

        let mut args = combine_args(&motif_dir, output.clone(), &lookup_path);
        args.report_missing = Some(report.clone());
        run(args).unwrap();

        assert_eq!(fs::read_to_string(&output).unwrap(), "q1\tt1\t0.9\n");
        assert_eq!(fs::read_to_string(&report).unwrap(), "alpha.pdb\nzeta\n");
    }

    #[test]
    fn recursive_discovery_descends_into_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("batch").join("part1");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("q1_motif.out"), "t1\t0.9\n").unwrap();
        fs::write(tmp.path().join("q1_motif.out"), "t2\t0.4\n").unwrap();
        let lookup = lookup();

        let flat = combine(tmp.path(), Some(&lookup), &CombineOptions::default()).unwrap();
        assert_eq!(flat.counts.files_processed, 1);

        let options = CombineOptions {
            recursive: true,
            ..CombineOptions::default()
        };
        let deep = combine(tmp.path(), Some(&lookup), &options).unwrap();
        assert_eq!(deep.counts.files_processed, 2);
        let targets: Vec<&str> = deep.triplets.iter().map(|t| t.target.as_str()).collect();
        assert!(targets.contains(&"t1"));
        assert!(targets.contains(&"t2"));
    }
}
