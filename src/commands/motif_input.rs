//! Builds the structural-search manifest: one row per structure naming its
//! file and the motif residues picked from per-residue conservation scores.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

use crate::cli::MotifInputArgs;
use crate::error::PipelineError;
use crate::util::{create_output_file, ensure_directory, require_file};

const NAN_FLOOR: f64 = -1e9;

pub fn run(args: MotifInputArgs) -> Result<()> {
    if args.with_output_path && args.output_dir.is_none() {
        return Err(PipelineError::Configuration(
            "--output-dir is required with --with-output-path".to_string(),
        )
        .into());
    }

    let ids = read_ids(&args.ids)?;
    let scores = read_scores(&args.scores)?;
    if ids.len() != scores.len() {
        return Err(PipelineError::Configuration(format!(
            "mismatch: {} ids vs {} score lines",
            ids.len(),
            scores.len()
        ))
        .into());
    }

    let label = percent_label(args.percent);
    let out_dir = match &args.output_dir {
        Some(dir) => {
            let dir = dir.join(&label);
            ensure_directory(&dir)?;
            Some(dir)
        }
        None => None,
    };
    let out_path = labeled_output_path(&args.out, &label)?;
    info!(path = %out_path.display(), percent = args.percent, "generating motif manifest");

    let selection = Selection {
        percent: args.percent,
        min_residues: args.min_residues,
    };
    let entries = if args.per_chain {
        per_chain_entries(&ids, &scores, &args.pdb_dir, selection)
    } else {
        merged_entries(&ids, &scores, &args.pdb_dir, selection)
    };

    let output_dir = if args.with_output_path {
        out_dir.as_deref()
    } else {
        None
    };
    write_manifest(&out_path, &entries, output_dir)?;
    info!(rows = entries.len(), path = %out_path.display(), "wrote motif manifest");

    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct Selection {
    pub percent: f64,
    pub min_residues: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Identifier used for the per-query output file name.
    pub stem: String,
    pub structure: PathBuf,
    pub motif: String,
}

pub fn read_ids(path: &Path) -> Result<Vec<String>> {
    require_file(path, "ids file")?;
    let pattern = Regex::new(r"^>(\S+)").context("failed to compile id regex")?;
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    Ok(raw
        .lines()
        .filter_map(|line| pattern.captures(line))
        .filter_map(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .collect())
}

pub fn read_scores(path: &Path) -> Result<Vec<Vec<f64>>> {
    require_file(path, "scores file")?;
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let separators = Regex::new(r"[\s,;]+").context("failed to compile score separator regex")?;

    Ok(raw
        .lines()
        .map(|line| parse_score_line(line, &separators))
        .collect())
}

/// A bare run of digits is one score per residue; anything else is a
/// delimited list where unparseable tokens become NaN.
fn parse_score_line(line: &str, separators: &Regex) -> Vec<f64> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    if line.bytes().all(|byte| byte.is_ascii_digit()) {
        return line.bytes().map(|byte| f64::from(byte - b'0')).collect();
    }

    separators
        .split(line)
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<f64>().unwrap_or(f64::NAN))
        .collect()
}

/// 1-based residue indices of the top-scoring share of residues.
pub fn select_indices(scores: &[f64], selection: Selection) -> Vec<usize> {
    if scores.is_empty() {
        return Vec::new();
    }

    let mut indexed: Vec<(usize, f64)> = scores
        .iter()
        .enumerate()
        .map(|(i, &score)| (i + 1, if score.is_nan() { NAN_FLOOR } else { score }))
        .collect();
    indexed.sort_by(|left, right| right.1.total_cmp(&left.1));

    let share = (indexed.len() as f64 * selection.percent / 100.0).ceil() as usize;
    let keep = selection.min_residues.max(share);
    indexed.into_iter().take(keep).map(|(i, _)| i).collect()
}

/// Collapses residue indices into `A10-15,A20` style tokens.
pub fn collapse_ranges(chain: &str, indices: &[usize]) -> Vec<String> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut tokens = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return tokens;
    };

    let (mut start, mut prev) = (first, first);
    let render = |start: usize, end: usize| {
        if start == end {
            format!("{chain}{start}")
        } else {
            format!("{chain}{start}-{end}")
        }
    };
    for index in iter {
        if index == prev + 1 {
            prev = index;
            continue;
        }
        tokens.push(render(start, prev));
        start = index;
        prev = index;
    }
    tokens.push(render(start, prev));
    tokens
}

fn single_chain_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    let ch = chars.next()?;
    (chars.next().is_none() && ch.is_ascii_alphanumeric()).then_some(ch)
}

/// Chain letter: the single character after the last `_`, else the trailing
/// alphanumeric character, else `A`.
pub fn extract_chain(id: &str) -> String {
    if let Some((_, tail)) = id.rsplit_once('_') {
        if let Some(chain) = single_chain_char(tail) {
            return chain.to_string();
        }
    }

    id.chars()
        .last()
        .filter(char::is_ascii_alphanumeric)
        .unwrap_or('A')
        .to_string()
}

/// Identifier without a trailing `_<chain>`.
pub fn base_id(id: &str) -> &str {
    match id.rsplit_once('_') {
        Some((head, tail)) if single_chain_char(tail).is_some() => head,
        _ => id,
    }
}

/// Finds the structure file for an identifier, falling back to the first
/// candidate when nothing exists on disk.
pub fn resolve_structure_path(pdb_dir: &Path, id: &str) -> PathBuf {
    let base = base_id(id);
    let candidates = [
        pdb_dir.join(format!("{id}_.pdb")),
        pdb_dir.join(format!("{id}.pdb")),
        pdb_dir.join(format!("{base}_.pdb")),
        pdb_dir.join(format!("{base}.pdb")),
    ];
    if let Some(found) = candidates.iter().find(|candidate| candidate.exists()) {
        return found.clone();
    }

    let pattern = format!(
        "{}/{}*.pdb",
        glob::Pattern::escape(&pdb_dir.to_string_lossy()),
        glob::Pattern::escape(base)
    );
    let mut versioned: Vec<PathBuf> = glob::glob(&pattern)
        .map(|paths| paths.filter_map(|entry| entry.ok()).collect())
        .unwrap_or_default();
    versioned.sort();

    versioned
        .into_iter()
        .next()
        .unwrap_or_else(|| candidates[0].clone())
}

pub fn per_chain_entries(
    ids: &[String],
    scores: &[Vec<f64>],
    pdb_dir: &Path,
    selection: Selection,
) -> Vec<ManifestEntry> {
    ids.iter()
        .zip(scores)
        .filter(|(_, residue_scores)| !residue_scores.is_empty())
        .filter_map(|(id, residue_scores)| {
            let chain = extract_chain(id);
            let indices = select_indices(residue_scores, selection);
            let tokens = collapse_ranges(&chain, &indices);
            (!tokens.is_empty()).then(|| ManifestEntry {
                stem: id.clone(),
                structure: pdb_dir.join(format!("{id}_.pdb")),
                motif: tokens.join(","),
            })
        })
        .collect()
}

/// Groups chains by base identifier, keeping first-appearance order.
pub fn merged_entries(
    ids: &[String],
    scores: &[Vec<f64>],
    pdb_dir: &Path,
    selection: Selection,
) -> Vec<ManifestEntry> {
    let mut order = Vec::<String>::new();
    let mut groups = HashMap::<String, Vec<(String, Vec<usize>)>>::new();

    for (id, residue_scores) in ids.iter().zip(scores) {
        if residue_scores.is_empty() {
            continue;
        }
        let indices = select_indices(residue_scores, selection);
        if indices.is_empty() {
            continue;
        }

        let base = base_id(id).to_string();
        groups
            .entry(base.clone())
            .or_insert_with(|| {
                order.push(base);
                Vec::new()
            })
            .push((extract_chain(id), indices));
    }

    order
        .into_iter()
        .map(|base| {
            let motif = groups
                .get(&base)
                .map(|chains| {
                    chains
                        .iter()
                        .flat_map(|(chain, indices)| collapse_ranges(chain, indices))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();

            let structure = resolve_structure_path(pdb_dir, &base);
            if !structure.exists() {
                warn!(base_id = %base, path = %structure.display(), "structure file not found");
            }

            ManifestEntry {
                stem: base,
                structure,
                motif,
            }
        })
        .collect()
}

/// `5` stays `5`; fractional percents render as `2p5`.
pub fn percent_label(percent: f64) -> String {
    if percent.fract() == 0.0 {
        format!("{}", percent as i64)
    } else {
        percent.to_string().replace('.', "p")
    }
}

/// Inserts `_<label>` before the extension, replacing an existing
/// numeric suffix.
pub fn labeled_output_path(out: &Path, label: &str) -> Result<PathBuf> {
    let suffix = Regex::new(r"_(\d+(?:\.\d+)?|\d+p\d+)$")
        .context("failed to compile percent suffix regex")?;

    let stem = out
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("invalid output file name: {}", out.display()))?;
    let stem = suffix.replace(stem, "");
    let extension = out
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    Ok(out.with_file_name(format!("{stem}_{label}{extension}")))
}

fn write_manifest(path: &Path, entries: &[ManifestEntry], output_dir: Option<&Path>) -> Result<()> {
    let mut out = create_output_file(path)?;
    for entry in entries {
        match output_dir {
            Some(dir) => writeln!(
                out,
                "{}\t{}\t{}",
                entry.structure.display(),
                entry.motif,
                dir.join(format!("{}_motif.out", entry.stem)).display()
            ),
            None => writeln!(out, "{}\t{}", entry.structure.display(), entry.motif),
        }
        .with_context(|| format!("failed to write {}", path.display()))?;
    }
    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn digit_runs_and_delimited_lines_both_parse() {
        let separators = Regex::new(r"[\s,;]+").unwrap();
        assert_eq!(parse_score_line("5071", &separators), vec![5.0, 0.0, 7.0, 1.0]);

        let parsed = parse_score_line("0.5, 0.25;x 1", &separators);
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[1], 0.25);
        assert!(parsed[2].is_nan());
        assert!(parse_score_line("   ", &separators).is_empty());
    }

    #[test]
    fn select_indices_honours_percent_floor_and_nan() {
        let scores = [0.1, f64::NAN, 0.9, 0.5, 0.9];
        let top = select_indices(
            &scores,
            Selection {
                percent: 40.0,
                min_residues: 1,
            },
        );
        // ties keep input order
        assert_eq!(top, vec![3, 5]);

        let floor = select_indices(
            &scores,
            Selection {
                percent: 1.0,
                min_residues: 3,
            },
        );
        assert_eq!(floor, vec![3, 5, 4]);
    }

    #[test]
    fn collapse_ranges_merges_consecutive_residues() {
        assert_eq!(
            collapse_ranges("A", &[12, 10, 11, 20, 15, 14]),
            vec!["A10-12", "A14-15", "A20"]
        );
        assert!(collapse_ranges("A", &[]).is_empty());
    }

    #[test]
    fn chain_and_base_id_follow_underscore_convention() {
        assert_eq!(extract_chain("d1twfa__A"), "A");
        assert_eq!(base_id("d1twfa__A"), "d1twfa_");
        assert_eq!(extract_chain("d1y5ia2_B"), "B");
        assert_eq!(base_id("d1y5ia2_B"), "d1y5ia2");
        assert_eq!(extract_chain("d1abc_"), "A");
        assert_eq!(base_id("d1abc_"), "d1abc_");
    }

    #[test]
    fn percent_labels_and_output_names() {
        assert_eq!(percent_label(5.0), "5");
        assert_eq!(percent_label(2.5), "2p5");
        assert_eq!(
            labeled_output_path(Path::new("in/folddisco_in_10.txt"), "5").unwrap(),
            PathBuf::from("in/folddisco_in_5.txt")
        );
        assert_eq!(
            labeled_output_path(Path::new("manifest.tsv"), "2p5").unwrap(),
            PathBuf::from("manifest_2p5.tsv")
        );
    }

    #[test]
    fn merged_entries_group_chains_and_resolve_structures() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("d1abc.pdb"), "").unwrap();

        let ids = vec![
            "d1abc_A".to_string(),
            "d2xyz_A".to_string(),
            "d1abc_B".to_string(),
        ];
        let scores = vec![vec![1.0, 9.0, 8.0], Vec::new(), vec![7.0, 0.0]];
        let selection = Selection {
            percent: 50.0,
            min_residues: 1,
        };

        let entries = merged_entries(&ids, &scores, tmp.path(), selection);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stem, "d1abc");
        assert_eq!(entries[0].motif, "A2-3,B1");
        assert_eq!(entries[0].structure, tmp.path().join("d1abc.pdb"));
    }

    #[test]
    fn run_rejects_mismatched_inputs() {
        let tmp = TempDir::new().unwrap();
        let ids = tmp.path().join("ids.txt");
        let scores = tmp.path().join("scores.txt");
        std::fs::write(&ids, ">d1abc_A\n>d2xyz_A\n").unwrap();
        std::fs::write(&scores, "123\n").unwrap();

        let err = run(MotifInputArgs {
            ids,
            scores,
            pdb_dir: tmp.path().to_path_buf(),
            percent: 5.0,
            min_residues: 1,
            out: tmp.path().join("manifest.tsv"),
            with_output_path: false,
            output_dir: None,
            per_chain: false,
        })
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration(_))
        ));
    }
}
