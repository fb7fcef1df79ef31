//! Ground-truth taxonomy keyed by domain identifier.
//!
//! Two line layouts are accepted (tab-separated, `#` comments allowed):
//!
//! ```text
//! d1a0aa_    b.1.1.1                      # id + dotted SCOP class
//! d1a0aa_    fam_x    sfam_y    fold_z    # id + explicit labels
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::model::{Level, TaxonLabels};
use crate::util::require_file;

#[derive(Debug, Clone, Default)]
pub struct Lookup {
    entries: HashMap<String, TaxonLabels>,
    class_sizes: [HashMap<String, usize>; 3],
}

impl Lookup {
    pub fn load(path: &Path, lowercase: bool) -> Result<Self> {
        require_file(path, "lookup file")?;

        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut rows = Vec::new();
        let mut skipped = 0_usize;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| {
                format!("failed to read {} line {}", path.display(), line_no + 1)
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split('\t').map(str::trim).collect();
            let Some(labels) = parse_labels(&fields) else {
                skipped += 1;
                debug!(line = line_no + 1, fields = fields.len(), "skipping lookup line without a usable layout");
                continue;
            };

            let id = if lowercase {
                fields[0].to_lowercase()
            } else {
                fields[0].to_string()
            };
            rows.push((id, labels));
        }

        if skipped > 0 {
            warn!(path = %path.display(), skipped, "lookup lines skipped");
        }

        let lookup = Self::from_entries(rows);
        if lookup.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "lookup file has no entries: {}",
                path.display()
            ))
            .into());
        }

        info!(path = %path.display(), entries = lookup.len(), "loaded lookup");
        Ok(lookup)
    }

    /// Builds a lookup; a repeated identifier keeps its first labels.
    pub fn from_entries<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, TaxonLabels)>,
    {
        let mut lookup = Self::default();
        let mut duplicates = 0_usize;

        for (id, labels) in rows {
            match lookup.entries.entry(id) {
                Entry::Occupied(_) => duplicates += 1,
                Entry::Vacant(slot) => {
                    for level in Level::ALL {
                        *lookup.class_sizes[level.index()]
                            .entry(labels.label(level).to_string())
                            .or_insert(0) += 1;
                    }
                    slot.insert(labels);
                }
            }
        }

        if duplicates > 0 {
            warn!(duplicates, "duplicate lookup identifiers ignored");
        }

        lookup
    }

    pub fn get(&self, id: &str) -> Option<&TaxonLabels> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maps a cleaned identifier onto a lookup key, tolerating a missing or
    /// extra trailing underscore.
    pub fn resolve(&self, id: &str) -> Option<String> {
        if self.contains(id) {
            return Some(id.to_string());
        }

        match id.strip_suffix('_') {
            Some(stripped) if self.contains(stripped) => Some(stripped.to_string()),
            Some(_) => None,
            None => {
                let padded = format!("{id}_");
                self.contains(&padded).then_some(padded)
            }
        }
    }

    /// Members sharing each class with `labels`, the entity itself excluded.
    pub fn peers(&self, labels: &TaxonLabels) -> [usize; 3] {
        Level::ALL.map(|level| {
            self.class_sizes[level.index()]
                .get(labels.label(level))
                .copied()
                .unwrap_or(0)
                .saturating_sub(1)
        })
    }

    /// Ordered same-class pairs at `level`, self-pairs excluded.
    pub fn same_class_pairs(&self, level: Level) -> u64 {
        self.class_sizes[level.index()]
            .values()
            .map(|&size| {
                let size = size as u64;
                size * size.saturating_sub(1)
            })
            .sum()
    }
}

/// `None` for rows matching neither layout, including a three-column row
/// that is missing its fold label.
fn parse_labels(fields: &[&str]) -> Option<TaxonLabels> {
    let used = fields
        .iter()
        .rposition(|value| !value.is_empty())
        .map_or(0, |last| last + 1);
    let fields = &fields[..used];
    if fields.first().is_none_or(|id| id.is_empty()) {
        return None;
    }

    match fields.len() {
        2 => Some(sccs_labels(fields[1])),
        len if len >= 4 && fields[1..4].iter().all(|value| !value.is_empty()) => {
            Some(TaxonLabels {
                scop: fields[1].to_string(),
                family: fields[1].to_string(),
                superfamily: fields[2].to_string(),
                fold: fields[3].to_string(),
            })
        }
        _ => None,
    }
}

/// Splits a dotted SCOP class (`class.fold.superfamily.family`) into labels.
pub fn sccs_labels(sccs: &str) -> TaxonLabels {
    let parts: Vec<&str> = sccs.split('.').collect();
    let prefix = |depth: usize| parts[..depth.min(parts.len())].join(".");

    TaxonLabels {
        scop: sccs.to_string(),
        family: sccs.to_string(),
        superfamily: prefix(3),
        fold: prefix(2),
    }
}

#[cfg(test)]
mod tests {
    use super::{Lookup, sccs_labels};
    use crate::error::PipelineError;
    use crate::model::Level;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> Lookup {
        Lookup::from_entries(vec![
            ("d1a_".to_string(), sccs_labels("a.1.1.1")),
            ("d2b_".to_string(), sccs_labels("a.1.1.1")),
            ("d3c_".to_string(), sccs_labels("a.1.1.2")),
            ("d4d_".to_string(), sccs_labels("a.1.2.1")),
            ("d5e_".to_string(), sccs_labels("b.2.1.1")),
        ])
    }

    #[test]
    fn sccs_labels_truncate_per_level() {
        let labels = sccs_labels("b.1.18.2");
        assert_eq!(labels.family, "b.1.18.2");
        assert_eq!(labels.superfamily, "b.1.18");
        assert_eq!(labels.fold, "b.1");
    }

    #[test]
    fn peers_exclude_the_entity_itself() {
        let lookup = sample();
        let labels = lookup.get("d1a_").unwrap();
        assert_eq!(lookup.peers(labels), [1, 2, 3]);

        let lone = lookup.get("d5e_").unwrap();
        assert_eq!(lookup.peers(lone), [0, 0, 0]);
    }

    #[test]
    fn same_class_pairs_count_ordered_pairs_without_self() {
        let lookup = sample();
        // families: {a.1.1.1: 2}, others singletons
        assert_eq!(lookup.same_class_pairs(Level::Family), 2);
        // superfamilies: {a.1.1: 3, a.1.2: 1, b.2.1: 1}
        assert_eq!(lookup.same_class_pairs(Level::Superfamily), 6);
        // folds: {a.1: 4, b.2: 1}
        assert_eq!(lookup.same_class_pairs(Level::Fold), 12);
    }

    #[test]
    fn resolve_repairs_trailing_underscore() {
        let lookup = sample();
        assert_eq!(lookup.resolve("d1a_").as_deref(), Some("d1a_"));
        assert_eq!(lookup.resolve("d1a").as_deref(), Some("d1a_"));
        assert_eq!(lookup.resolve("d9z"), None);

        let bare = Lookup::from_entries(vec![("d7g".to_string(), sccs_labels("c.1.1.1"))]);
        assert_eq!(bare.resolve("d7g_").as_deref(), Some("d7g"));
    }

    #[test]
    fn load_accepts_both_layouts_and_normalizes_case() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lookup.tsv");
        fs::write(
            &path,
            "# id\tclass\nD1A_\ta.1.1.1\nd2b_\tfamX\tsfamY\tfoldZ\n\nbroken\nd1a_\tz.9.9.9\n",
        )
        .unwrap();

        let lookup = Lookup::load(&path, true).unwrap();
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.get("d1a_").unwrap().family, "a.1.1.1");

        let explicit = lookup.get("d2b_").unwrap();
        assert_eq!(explicit.superfamily, "sfamY");
        assert_eq!(explicit.fold, "foldZ");
    }

    #[test]
    fn three_column_rows_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lookup.tsv");
        fs::write(
            &path,
            "d1a_\tfamX\tsfamY\nd2b_\ta.1.1.1\t\nd3c_\tfamX\tsfamY\tfoldZ\n",
        )
        .unwrap();

        let lookup = Lookup::load(&path, true).unwrap();
        assert_eq!(lookup.len(), 2);
        assert!(!lookup.contains("d1a_"));
        assert_eq!(lookup.get("d2b_").unwrap().fold, "a.1");
        assert_eq!(lookup.get("d3c_").unwrap().fold, "foldZ");
    }

    #[test]
    fn load_rejects_missing_and_empty_files() {
        let tmp = TempDir::new().unwrap();
        let missing = Lookup::load(&tmp.path().join("absent.tsv"), true).unwrap_err();
        assert!(matches!(
            missing.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration(_))
        ));

        let empty = tmp.path().join("empty.tsv");
        fs::write(&empty, "# nothing here\n").unwrap();
        assert!(Lookup::load(&empty, true).is_err());
    }
}
