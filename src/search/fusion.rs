//! Reciprocal-rank fusion of lexical and vector result lists
//!
//! Rank-based aggregation: each list contributes `weight / (rank + k)` per
//! candidate, the lexical list carries a higher weight and both lists grant
//! a small bonus to their top-ranked entry. Accumulated scores are
//! normalised so the best result scores 1.0, then a floor drops weak tails.

use crate::types::SearchHit;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FusionOptions {
    /// Candidates considered per list
    pub candidate_limit: usize,
    /// Weight of the first (lexical) list; the second list uses 1.0
    pub first_list_weight: f64,
    /// Added to a list's rank-0 candidate
    pub top_rank_bonus: f64,
    /// Normalised-score floor
    pub min_score: f64,
    pub rrf_k: f64,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            candidate_limit: 30,
            first_list_weight: 2.0,
            top_rank_bonus: 0.05,
            min_score: 0.25,
            rrf_k: 60.0,
        }
    }
}

struct Accumulated {
    hit: SearchHit,
    score: f64,
    in_first: bool,
    in_second: bool,
}

/// Fuse the lexical and vector lists. Ids present in both lists sum their
/// contributions and are tagged `hybrid`.
pub fn fuse(lexical: Vec<SearchHit>, vector: Vec<SearchHit>, options: &FusionOptions) -> Vec<SearchHit> {
    let mut accumulated: HashMap<String, Accumulated> = HashMap::new();

    accumulate(
        &mut accumulated,
        lexical,
        options.first_list_weight,
        true,
        options,
    );
    accumulate(&mut accumulated, vector, 1.0, false, options);

    let max_score = accumulated
        .values()
        .map(|a| a.score)
        .fold(0.0_f64, f64::max);

    let mut results: Vec<SearchHit> = accumulated
        .into_values()
        .filter_map(|mut entry| {
            let normalised = if max_score > 0.0 {
                entry.score / max_score
            } else {
                0.0
            };
            if normalised < options.min_score {
                return None;
            }
            entry.hit.score = normalised;
            if entry.in_first && entry.in_second {
                entry.hit.source = "hybrid".to_string();
            }
            Some(entry.hit)
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

fn accumulate(
    accumulated: &mut HashMap<String, Accumulated>,
    hits: Vec<SearchHit>,
    weight: f64,
    first_list: bool,
    options: &FusionOptions,
) {
    for (rank, hit) in hits.into_iter().take(options.candidate_limit).enumerate() {
        let mut contribution = weight / (rank as f64 + options.rrf_k);
        if rank == 0 {
            contribution += options.top_rank_bonus;
        }

        match accumulated.get_mut(&hit.id) {
            Some(entry) => {
                entry.score += contribution;
                if first_list {
                    entry.in_first = true;
                } else {
                    entry.in_second = true;
                }
            }
            None => {
                accumulated.insert(
                    hit.id.clone(),
                    Accumulated {
                        hit,
                        score: contribution,
                        in_first: first_list,
                        in_second: !first_list,
                    },
                );
            }
        }
    }
}
