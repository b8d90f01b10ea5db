//! Reciprocal rank fusion.
//!
//! score(d) = sum over rankings r of 1 / (k + rank_r(d)), ranks starting at 1.

use std::collections::HashMap;

/// Standard RRF constant.
pub const RRF_K: f64 = 60.0;

/// Fuse several best-first rankings of insight ids.
///
/// Ties are broken by id so the order is deterministic.
pub fn reciprocal_rank_fusion(rankings: &[Vec<i64>], k: f64) -> Vec<(i64, f64)> {
    let mut scores: HashMap<i64, f64> = HashMap::new();

    for ranking in rankings {
        for (i, id) in ranking.iter().enumerate() {
            *scores.entry(*id).or_insert(0.0) += 1.0 / (k + (i + 1) as f64);
        }
    }

    let mut fused: Vec<(i64, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    fused
}
