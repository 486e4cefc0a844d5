//! Agreement between two batches of item statistics, e.g. synthetic vs human.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::classical::ItemStatistics;

/// Correlations need at least this many shared items.
pub const MIN_CORRELATION_ITEMS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub difficulty_correlation: f64,
    pub discrimination_correlation: f64,
    /// Spearman rank correlation of difficulty.
    pub difficulty_rank_correlation: f64,
    pub difficulty_mae: f64,
    pub discrimination_mae: f64,
    /// Mean of (first - second) difficulty.
    pub difficulty_bias: f64,
    /// Items present in both batches. Check before trusting the correlations.
    pub n_items: usize,
}

/// Inner-join on item id (in `first`'s order) and compare.
pub fn correlate(first: &[ItemStatistics], second: &[ItemStatistics]) -> Correlation {
    let by_id: HashMap<&str, &ItemStatistics> =
        second.iter().map(|s| (s.item_id.as_str(), s)).collect();

    let mut diff1 = Vec::new();
    let mut diff2 = Vec::new();
    let mut disc1 = Vec::new();
    let mut disc2 = Vec::new();
    for s1 in first {
        if let Some(s2) = by_id.get(s1.item_id.as_str()) {
            diff1.push(s1.difficulty_index);
            diff2.push(s2.difficulty_index);
            disc1.push(s1.point_biserial);
            disc2.push(s2.point_biserial);
        }
    }

    let n = diff1.len();
    let mut out = Correlation {
        n_items: n,
        ..Default::default()
    };
    if n == 0 {
        return out;
    }

    out.difficulty_mae = mean_abs_diff(&diff1, &diff2);
    out.discrimination_mae = mean_abs_diff(&disc1, &disc2);
    out.difficulty_bias = diff1.iter().zip(&diff2).map(|(a, b)| a - b).mean();

    if n >= MIN_CORRELATION_ITEMS {
        out.difficulty_correlation = pearson(&diff1, &diff2);
        out.discrimination_correlation = pearson(&disc1, &disc2);
        out.difficulty_rank_correlation = pearson(&ranks_with_ties(&diff1), &ranks_with_ties(&diff2));
    }

    out
}

/// Sample Pearson correlation; undefined results (zero variance) become 0.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    let cov = x.iter().covariance(y.iter());
    let r = cov / (x.iter().std_dev() * y.iter().std_dev());
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

fn mean_abs_diff(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| (a - b).abs()).mean()
}

fn ranks_with_ties(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[idx[j]] == values[idx[i]] {
            j += 1;
        }
        let avg = (i + j - 1) as f64 / 2.0;
        for &k in &idx[i..j] {
            ranks[k] = avg;
        }
        i = j;
    }
    ranks
}
