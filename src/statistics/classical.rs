//! Classical test theory statistics per item.
//!
//! Every function here is pure. Grouping uses ordered maps so repeated runs
//! over the same records produce bit-identical output.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::items::OptionKey;

/// A distractor chosen by at least this share of respondents is functional.
pub const FUNCTIONAL_DISTRACTOR_RATE: f64 = 0.05;

/// One scored answer, detached from where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResponse {
    pub item_id: String,
    /// Whose total score this answer counts towards.
    pub respondent: String,
    /// Bucket for response variance: a persona, or a human user.
    pub group: String,
    pub selected: OptionKey,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFlag {
    CeilingEffect,
    FloorEffect,
    LowDiscrimination,
    NegativeDiscrimination,
    WeakDistractors,
    HighVariance,
}

impl ItemFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemFlag::CeilingEffect => "ceiling_effect",
            ItemFlag::FloorEffect => "floor_effect",
            ItemFlag::LowDiscrimination => "low_discrimination",
            ItemFlag::NegativeDiscrimination => "negative_discrimination",
            ItemFlag::WeakDistractors => "weak_distractors",
            ItemFlag::HighVariance => "high_variance",
        }
    }
}

impl fmt::Display for ItemFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ceiling_effect" => Ok(ItemFlag::CeilingEffect),
            "floor_effect" => Ok(ItemFlag::FloorEffect),
            "low_discrimination" => Ok(ItemFlag::LowDiscrimination),
            "negative_discrimination" => Ok(ItemFlag::NegativeDiscrimination),
            "weak_distractors" => Ok(ItemFlag::WeakDistractors),
            "high_variance" => Ok(ItemFlag::HighVariance),
            other => Err(format!("unknown item flag: {other}")),
        }
    }
}

/// Share of responses choosing each option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionRates {
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(rename = "D")]
    pub d: f64,
}

impl OptionRates {
    pub fn get(&self, key: OptionKey) -> f64 {
        match key {
            OptionKey::A => self.a,
            OptionKey::B => self.b,
            OptionKey::C => self.c,
            OptionKey::D => self.d,
        }
    }

    fn from_counts(counts: [usize; 4], n: usize) -> Self {
        if n == 0 {
            return Self::default();
        }
        let n = n as f64;
        Self {
            a: counts[0] as f64 / n,
            b: counts[1] as f64 / n,
            c: counts[2] as f64 / n,
            d: counts[3] as f64 / n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStatistics {
    pub item_id: String,
    pub n_responses: usize,
    /// Proportion correct (the CTT p-value).
    pub difficulty_index: f64,
    /// Point-biserial discrimination.
    pub point_biserial: f64,
    pub option_rates: OptionRates,
    pub functional_distractors: u8,
    pub nonfunctional_distractors: u8,
    pub response_variance: f64,
    pub flags: Vec<ItemFlag>,
    pub quality_score: f64,
}

impl ItemStatistics {
    pub fn has_flag(&self, flag: ItemFlag) -> bool {
        self.flags.contains(&flag)
    }
}

pub fn difficulty_index(responses: &[&ScoredResponse]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    let correct = responses.iter().filter(|r| r.is_correct).count();
    correct as f64 / responses.len() as f64
}

pub fn option_rates(responses: &[&ScoredResponse]) -> OptionRates {
    let mut counts = [0usize; 4];
    for r in responses {
        counts[r.selected.index()] += 1;
    }
    OptionRates::from_counts(counts, responses.len())
}

/// `(functional, nonfunctional)` counts over the three distractors.
pub fn distractor_counts(rates: &OptionRates, correct: OptionKey) -> (u8, u8) {
    let mut functional = 0;
    let mut nonfunctional = 0;
    for key in OptionKey::ALL.into_iter().filter(|k| *k != correct) {
        if rates.get(key) >= FUNCTIONAL_DISTRACTOR_RATE {
            functional += 1;
        } else {
            nonfunctional += 1;
        }
    }
    (functional, nonfunctional)
}

/// Number of correct answers per respondent across every item in `responses`.
pub fn total_scores(responses: &[ScoredResponse]) -> BTreeMap<&str, f64> {
    let mut scores: BTreeMap<&str, f64> = BTreeMap::new();
    for r in responses {
        *scores.entry(r.respondent.as_str()).or_insert(0.0) += if r.is_correct { 1.0 } else { 0.0 };
    }
    scores
}

/// Point-biserial correlation between answering this item correctly and total
/// score. The denominator is the population SD of all total scores, focal item
/// included.
pub fn point_biserial(item_responses: &[&ScoredResponse], totals: &BTreeMap<&str, f64>) -> f64 {
    let n = item_responses.len();
    if n < 3 {
        return 0.0;
    }

    let (correct, incorrect): (Vec<&ScoredResponse>, Vec<&ScoredResponse>) =
        item_responses.iter().copied().partition(|r| r.is_correct);
    if correct.is_empty() || incorrect.is_empty() {
        return 0.0;
    }

    let scores_of = |group: &[&ScoredResponse]| -> Vec<f64> {
        group
            .iter()
            .filter_map(|r| totals.get(r.respondent.as_str()).copied())
            .collect()
    };
    let scores_correct = scores_of(&correct);
    let scores_incorrect = scores_of(&incorrect);
    if scores_correct.is_empty() || scores_incorrect.is_empty() {
        return 0.0;
    }

    let sd = totals.values().population_std_dev();
    if sd == 0.0 || !sd.is_finite() {
        return 0.0;
    }

    let p = correct.len() as f64 / n as f64;
    let q = 1.0 - p;
    let mean_correct = scores_correct.iter().mean();
    let mean_incorrect = scores_incorrect.iter().mean();

    (mean_correct - mean_incorrect) / sd * (p * q).sqrt()
}

/// Population variance of per-group mean correctness; 0 with fewer than two
/// groups.
pub fn response_variance(item_responses: &[&ScoredResponse]) -> f64 {
    let mut by_group: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for r in item_responses {
        let entry = by_group.entry(r.group.as_str()).or_insert((0, 0));
        entry.0 += usize::from(r.is_correct);
        entry.1 += 1;
    }
    if by_group.len() < 2 {
        return 0.0;
    }
    by_group
        .values()
        .map(|(correct, total)| *correct as f64 / *total as f64)
        .population_variance()
}

pub fn flag_item(
    difficulty: f64,
    discrimination: f64,
    nonfunctional_distractors: u8,
    response_variance: f64,
) -> Vec<ItemFlag> {
    let mut flags = Vec::new();
    if difficulty > 0.9 {
        flags.push(ItemFlag::CeilingEffect);
    }
    if difficulty < 0.2 {
        flags.push(ItemFlag::FloorEffect);
    }
    if (0.0..0.2).contains(&discrimination) {
        flags.push(ItemFlag::LowDiscrimination);
    }
    if discrimination < 0.0 {
        flags.push(ItemFlag::NegativeDiscrimination);
    }
    if nonfunctional_distractors >= 2 {
        flags.push(ItemFlag::WeakDistractors);
    }
    if response_variance > 0.4 {
        flags.push(ItemFlag::HighVariance);
    }
    flags
}

/// Composite quality in [0, 1], rounded to two decimals.
pub fn quality_score(
    difficulty: f64,
    discrimination: f64,
    functional_distractors: u8,
    flags: &[ItemFlag],
) -> f64 {
    let mut score = 1.0;

    if !(0.2..=0.9).contains(&difficulty) {
        score -= 0.2;
    } else if !(0.3..=0.85).contains(&difficulty) {
        score -= 0.1;
    }

    if discrimination < 0.0 {
        score -= 0.4;
    } else if discrimination < 0.2 {
        score -= 0.2;
    } else if discrimination < 0.3 {
        score -= 0.1;
    }

    score -= f64::from(3u8.saturating_sub(functional_distractors)) * 0.1;

    if flags.contains(&ItemFlag::NegativeDiscrimination) {
        score -= 0.2;
    }

    let clamped: f64 = score.clamp(0.0, 1.0);
    (clamped * 100.0).round() / 100.0
}

/// Statistics for one item given its responses and the run-wide totals.
pub fn compute_item_statistics(
    item_id: &str,
    correct: OptionKey,
    item_responses: &[&ScoredResponse],
    totals: &BTreeMap<&str, f64>,
) -> ItemStatistics {
    let difficulty = difficulty_index(item_responses);
    let discrimination = point_biserial(item_responses, totals);
    let rates = option_rates(item_responses);
    let (functional, nonfunctional) = distractor_counts(&rates, correct);
    let variance = response_variance(item_responses);
    let flags = flag_item(difficulty, discrimination, nonfunctional, variance);
    let quality = quality_score(difficulty, discrimination, functional, &flags);

    ItemStatistics {
        item_id: item_id.to_string(),
        n_responses: item_responses.len(),
        difficulty_index: difficulty,
        point_biserial: discrimination,
        option_rates: rates,
        functional_distractors: functional,
        nonfunctional_distractors: nonfunctional,
        response_variance: variance,
        flags,
        quality_score: quality,
    }
}

/// Statistics for every item in `responses` whose key is known, in order of
/// first appearance.
pub fn compute_run_statistics(
    responses: &[ScoredResponse],
    answer_keys: &HashMap<String, OptionKey>,
) -> Vec<ItemStatistics> {
    let totals = total_scores(responses);

    let mut order: Vec<&str> = Vec::new();
    let mut by_item: HashMap<&str, Vec<&ScoredResponse>> = HashMap::new();
    for r in responses {
        let bucket = by_item.entry(r.item_id.as_str()).or_default();
        if bucket.is_empty() {
            order.push(r.item_id.as_str());
        }
        bucket.push(r);
    }

    order
        .into_iter()
        .filter_map(|item_id| {
            let correct = *answer_keys.get(item_id)?;
            let item_responses = by_item.get(item_id)?;
            Some(compute_item_statistics(item_id, correct, item_responses, &totals))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use OptionKey::*;

    fn resp(item: &str, who: &str, selected: OptionKey, correct: OptionKey) -> ScoredResponse {
        ScoredResponse {
            item_id: item.into(),
            respondent: who.into(),
            group: who.into(),
            selected,
            is_correct: selected == correct,
        }
    }

    fn refs(v: &[ScoredResponse]) -> Vec<&ScoredResponse> {
        v.iter().collect()
    }

    #[test]
    fn five_response_scenario() {
        let responses: Vec<_> = [B, B, A, B, A]
            .iter()
            .enumerate()
            .map(|(i, s)| resp("q1", &format!("p{i}"), *s, B))
            .collect();
        let keys = HashMap::from([("q1".to_string(), B)]);

        let stats = compute_run_statistics(&responses, &keys);
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert!((s.difficulty_index - 0.6).abs() < 1e-12);
        assert!((s.option_rates.a - 0.4).abs() < 1e-12);
        assert!((s.option_rates.b - 0.6).abs() < 1e-12);
        assert_eq!(s.option_rates.c, 0.0);
        assert_eq!(s.option_rates.d, 0.0);
        assert_eq!(s.functional_distractors, 1);
        assert_eq!(s.nonfunctional_distractors, 2);
        assert!(s.has_flag(ItemFlag::WeakDistractors));
    }

    #[test]
    fn option_rates_sum() {
        let responses = vec![
            resp("q", "a", A, A),
            resp("q", "b", C, A),
            resp("q", "c", D, A),
        ];
        let r = option_rates(&refs(&responses));
        assert!((r.a + r.b + r.c + r.d - 1.0).abs() < 1e-12);

        let empty = option_rates(&[]);
        assert_eq!(empty, OptionRates::default());
        assert_eq!(difficulty_index(&[]), 0.0);
    }

    #[test]
    fn all_correct_hits_ceiling() {
        let responses: Vec<_> = (0..4).map(|i| resp("q", &format!("p{i}"), C, C)).collect();
        let keys = HashMap::from([("q".to_string(), C)]);
        let s = &compute_run_statistics(&responses, &keys)[0];
        assert_eq!(s.difficulty_index, 1.0);
        assert!(s.has_flag(ItemFlag::CeilingEffect));
        // One group only: no discrimination.
        assert_eq!(s.point_biserial, 0.0);
    }

    #[test]
    fn top_scorers_only_gives_positive_discrimination() {
        // Four respondents; strong ones answer every item correctly.
        let mut responses = Vec::new();
        for (who, ability) in [("s1", 3), ("s2", 3), ("w1", 0), ("w2", 1)] {
            for k in 0..3 {
                let item = format!("filler{k}");
                let sel = if k < ability { A } else { B };
                responses.push(resp(&item, who, sel, A));
            }
        }
        for who in ["s1", "s2"] {
            responses.push(resp("target", who, D, D));
        }
        for who in ["w1", "w2"] {
            responses.push(resp("target", who, A, D));
        }

        let mut keys: HashMap<String, OptionKey> =
            (0..3).map(|k| (format!("filler{k}"), A)).collect();
        keys.insert("target".into(), D);

        let stats = compute_run_statistics(&responses, &keys);
        let target = stats.iter().find(|s| s.item_id == "target").unwrap();
        assert!(target.point_biserial > 0.0);
    }

    #[test]
    fn point_biserial_guards() {
        let two = vec![resp("q", "a", A, A), resp("q", "b", B, A)];
        let totals = total_scores(&two);
        assert_eq!(point_biserial(&refs(&two), &totals), 0.0);

        // Equal totals for everyone: SD = 0.
        let flat = vec![
            resp("q", "a", A, A),
            resp("q", "b", B, A),
            resp("r", "a", B, A),
            resp("r", "b", A, A),
            resp("q", "c", A, A),
            resp("r", "c", B, A),
        ];
        let totals = total_scores(&flat);
        let q: Vec<&ScoredResponse> = flat.iter().filter(|r| r.item_id == "q").collect();
        assert_eq!(point_biserial(&q, &totals), 0.0);
    }

    #[test]
    fn quality_is_clamped_under_worst_case() {
        let flags = flag_item(0.05, -0.5, 3, 0.0);
        assert_eq!(
            flags,
            vec![
                ItemFlag::FloorEffect,
                ItemFlag::NegativeDiscrimination,
                ItemFlag::WeakDistractors
            ]
        );
        assert_eq!(quality_score(0.05, -0.5, 0, &flags), 0.0);
        assert_eq!(quality_score(0.6, 0.5, 3, &[]), 1.0);
    }

    #[test]
    fn quality_penalty_bands() {
        // 0.1 difficulty penalty, 0.1 discrimination penalty, one missing distractor
        assert_eq!(quality_score(0.87, 0.25, 2, &[]), 0.7);
        // low discrimination only
        assert_eq!(quality_score(0.5, 0.1, 3, &[]), 0.8);
    }

    #[test]
    fn flag_order_and_bounds() {
        assert_eq!(
            flag_item(0.95, 0.0, 2, 0.5),
            vec![
                ItemFlag::CeilingEffect,
                ItemFlag::LowDiscrimination,
                ItemFlag::WeakDistractors,
                ItemFlag::HighVariance
            ]
        );
        assert!(flag_item(0.9, 0.2, 1, 0.4).is_empty());
    }

    #[test]
    fn response_variance_across_groups() {
        let mut rs = vec![
            resp("q", "x", A, A),
            resp("q", "x", A, A),
            resp("q", "y", B, A),
            resp("q", "y", B, A),
        ];
        rs[1].respondent = "x#2".into();
        rs[3].respondent = "y#2".into();
        // group means 1.0 and 0.0 -> population variance 0.25
        assert!((response_variance(&refs(&rs)) - 0.25).abs() < 1e-12);

        let single = vec![resp("q", "x", A, A), resp("q", "x", B, A)];
        assert_eq!(response_variance(&refs(&single)), 0.0);
    }

    #[test]
    fn unknown_keys_skipped_and_order_preserved() {
        let responses = vec![
            resp("z", "a", A, A),
            resp("m", "a", A, A),
            resp("ghost", "a", A, A),
            resp("z", "b", B, A),
        ];
        let keys = HashMap::from([("z".to_string(), A), ("m".to_string(), A)]);
        let ids: Vec<_> = compute_run_statistics(&responses, &keys)
            .into_iter()
            .map(|s| s.item_id)
            .collect();
        assert_eq!(ids, vec!["z", "m"]);
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let responses: Vec<_> = (0..30)
            .map(|i| {
                let sel = OptionKey::ALL[(i * 7) % 4];
                resp(&format!("q{}", i % 5), &format!("p{}", i % 6), sel, A)
            })
            .collect();
        let keys: HashMap<String, OptionKey> = (0..5).map(|k| (format!("q{k}"), A)).collect();
        let a = compute_run_statistics(&responses, &keys);
        let b = compute_run_statistics(&responses, &keys);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.point_biserial.to_bits(), y.point_biserial.to_bits());
            assert_eq!(x.response_variance.to_bits(), y.response_variance.to_bits());
            assert_eq!(x.quality_score.to_bits(), y.quality_score.to_bits());
        }
    }
}
