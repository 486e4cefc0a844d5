//! Summaries and tabular renderings of item statistics.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use super::classical::{ItemFlag, ItemStatistics};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub n_items: usize,
    pub mean_difficulty: f64,
    pub mean_discrimination: f64,
    pub mean_quality: f64,
    pub flagged_items: usize,
    /// Flag counts, most frequent first; ties in flag order.
    pub flag_counts: Vec<(ItemFlag, usize)>,
}

impl StatisticsSummary {
    pub fn flagged_percent(&self) -> f64 {
        if self.n_items == 0 {
            0.0
        } else {
            self.flagged_items as f64 / self.n_items as f64 * 100.0
        }
    }
}

pub fn summarize(stats: &[ItemStatistics]) -> StatisticsSummary {
    let n = stats.len();
    if n == 0 {
        return StatisticsSummary::default();
    }

    let mean = |f: fn(&ItemStatistics) -> f64| stats.iter().map(f).sum::<f64>() / n as f64;

    let mut counts: BTreeMap<ItemFlag, usize> = BTreeMap::new();
    for s in stats {
        for f in &s.flags {
            *counts.entry(*f).or_default() += 1;
        }
    }
    let mut flag_counts: Vec<(ItemFlag, usize)> = counts.into_iter().collect();
    flag_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    StatisticsSummary {
        n_items: n,
        mean_difficulty: mean(|s| s.difficulty_index),
        mean_discrimination: mean(|s| s.point_biserial),
        mean_quality: mean(|s| s.quality_score),
        flagged_items: stats.iter().filter(|s| !s.flags.is_empty()).count(),
        flag_counts,
    }
}

fn flag_list(flags: &[ItemFlag]) -> String {
    flags
        .iter()
        .map(ItemFlag::as_str)
        .collect::<Vec<_>>()
        .join(";")
}

fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write one CSV row per item with a header line.
pub fn write_csv<W: Write>(mut out: W, stats: &[ItemStatistics]) -> io::Result<()> {
    writeln!(
        out,
        "item_id,n,difficulty,discrimination,rate_A,rate_B,rate_C,rate_D,functional_distractors,flags,quality"
    )?;
    for s in stats {
        writeln!(
            out,
            "{},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{},{},{:.2}",
            csv_field(&s.item_id),
            s.n_responses,
            s.difficulty_index,
            s.point_biserial,
            s.option_rates.a,
            s.option_rates.b,
            s.option_rates.c,
            s.option_rates.d,
            s.functional_distractors,
            flag_list(&s.flags),
            s.quality_score,
        )?;
    }
    Ok(())
}

/// Fixed-width table for terminal output.
pub fn render_table(stats: &[ItemStatistics]) -> String {
    let id_width = stats
        .iter()
        .map(|s| s.item_id.len())
        .max()
        .unwrap_or(0)
        .max("item".len());

    let mut out = format!(
        "{:<id_width$}  {:>4}  {:>6}  {:>6}  {:>5}  {:>5}  {:>5}  {:>5}  {:>4}  {:>5}  flags\n",
        "item", "n", "p", "r_pb", "A", "B", "C", "D", "fd", "qual"
    );
    for s in stats {
        out.push_str(&format!(
            "{:<id_width$}  {:>4}  {:>6.3}  {:>6.3}  {:>5.2}  {:>5.2}  {:>5.2}  {:>5.2}  {:>4}  {:>5.2}  {}\n",
            s.item_id,
            s.n_responses,
            s.difficulty_index,
            s.point_biserial,
            s.option_rates.a,
            s.option_rates.b,
            s.option_rates.c,
            s.option_rates.d,
            s.functional_distractors,
            s.quality_score,
            flag_list(&s.flags),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::classical::OptionRates;

    fn stat(id: &str, difficulty: f64, flags: Vec<ItemFlag>) -> ItemStatistics {
        ItemStatistics {
            item_id: id.into(),
            n_responses: 5,
            difficulty_index: difficulty,
            point_biserial: 0.25,
            option_rates: OptionRates {
                a: 0.4,
                b: 0.6,
                c: 0.0,
                d: 0.0,
            },
            functional_distractors: 1,
            nonfunctional_distractors: 2,
            response_variance: 0.0,
            flags,
            quality_score: 0.6,
        }
    }

    #[test]
    fn summary_counts_flags_most_frequent_first() {
        let stats = vec![
            stat("a", 0.95, vec![ItemFlag::CeilingEffect, ItemFlag::WeakDistractors]),
            stat("b", 0.5, vec![ItemFlag::WeakDistractors]),
            stat("c", 0.55, vec![]),
        ];
        let s = summarize(&stats);
        assert_eq!(s.n_items, 3);
        assert_eq!(s.flagged_items, 2);
        assert_eq!(
            s.flag_counts,
            vec![(ItemFlag::WeakDistractors, 2), (ItemFlag::CeilingEffect, 1)]
        );
        assert!((s.mean_difficulty - 2.0 / 3.0).abs() < 1e-12);
        assert!((s.flagged_percent() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_summary_is_neutral() {
        let s = summarize(&[]);
        assert_eq!(s, StatisticsSummary::default());
        assert_eq!(s.flagged_percent(), 0.0);
    }

    #[test]
    fn csv_rows() {
        let mut buf = Vec::new();
        write_csv(
            &mut buf,
            &[stat("q,1", 0.6, vec![ItemFlag::WeakDistractors, ItemFlag::LowDiscrimination])],
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("item_id,n,difficulty"));
        assert_eq!(
            lines[1],
            "\"q,1\",5,0.600,0.250,0.400,0.600,0.000,0.000,1,weak_distractors;low_discrimination,0.60"
        );
    }

    #[test]
    fn table_has_header_and_rows() {
        let table = render_table(&[stat("item-1", 0.6, vec![])]);
        let mut lines = table.lines();
        assert!(lines.next().unwrap().starts_with("item  "));
        assert!(lines.next().unwrap().starts_with("item-1"));
    }
}
