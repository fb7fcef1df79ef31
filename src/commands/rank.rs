use std::cmp::Ordering;

use anyhow::Result;
use tracing::info;

use crate::cli::RankArgs;
use crate::commands::triplet_io::{read_triplets, write_triplets};
use crate::model::Triplet;

pub fn run(args: RankArgs) -> Result<()> {
    let mut input = read_triplets(&args.input)?;
    rank_triplets(&mut input.triplets);

    write_triplets(&args.output, &input.triplets, input.had_header)?;
    info!(
        rows = input.triplets.len(),
        path = %args.output.display(),
        "wrote sorted triplets"
    );
    Ok(())
}

/// Score descending, then query and target ascending.
pub fn rank_order(left: &Triplet, right: &Triplet) -> Ordering {
    right
        .score
        .total_cmp(&left.score)
        .then_with(|| left.query.cmp(&right.query))
        .then_with(|| left.target.cmp(&right.target))
}

pub fn rank_triplets(triplets: &mut [Triplet]) {
    triplets.sort_by(rank_order);
}

pub fn is_ranked(triplets: &[Triplet]) -> bool {
    triplets
        .windows(2)
        .all(|pair| rank_order(&pair[0], &pair[1]) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::{is_ranked, rank_triplets};
    use crate::model::Triplet;

    fn triplet(query: &str, target: &str, score: f64) -> Triplet {
        Triplet {
            query: query.to_string(),
            target: target.to_string(),
            score,
        }
    }

    fn sample() -> Vec<Triplet> {
        vec![
            triplet("q2", "t1", 0.5),
            triplet("q1", "t3", 0.9),
            triplet("q1", "t2", 0.5),
            triplet("q2", "t0", 0.5),
            triplet("q3", "t9", 1.5),
            triplet("q1", "t1", 0.5),
        ]
    }

    #[test]
    fn ties_break_on_query_then_target() {
        let mut rows = sample();
        rank_triplets(&mut rows);

        let order: Vec<(&str, &str)> = rows
            .iter()
            .map(|t| (t.query.as_str(), t.target.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("q3", "t9"),
                ("q1", "t3"),
                ("q1", "t1"),
                ("q1", "t2"),
                ("q2", "t0"),
                ("q2", "t1"),
            ]
        );
        assert!(is_ranked(&rows));
    }

    #[test]
    fn ordering_is_independent_of_input_permutation() {
        let mut expected = sample();
        rank_triplets(&mut expected);

        let base = sample();
        for shift in 0..base.len() {
            let mut rotated = base.clone();
            rotated.rotate_left(shift);
            rotated.reverse();
            rank_triplets(&mut rotated);
            assert_eq!(rotated, expected);
        }
    }

    #[test]
    fn scores_are_non_increasing_after_ranking() {
        let mut rows = sample();
        rank_triplets(&mut rows);
        assert!(rows.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert!(!is_ranked(&sample()));
    }
}
