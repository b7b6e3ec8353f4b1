//! Per-host aggregation of row scores into verdicts.

use std::collections::HashMap;

use ndarray::ArrayView1;

use crate::error::{BotscanError, Result};
use crate::features::HostList;
use crate::report::Verdict;

#[derive(Debug, Default)]
struct HostStats {
    first_row: usize,
    sum: f64,
    count: usize,
}

/// Reduce row scores to one verdict per infected host.
///
/// A host's mean covers every row still present for it. Hosts whose mean is
/// at or above `threshold` are returned, highest mean first; equal means keep
/// the order in which the hosts first appear.
pub fn evaluate_per_host(
    scores: ArrayView1<'_, f64>,
    hosts: &HostList,
    threshold: f64,
) -> Result<Vec<Verdict>> {
    if scores.len() != hosts.len() {
        return Err(BotscanError::ScoreLengthMismatch {
            scores: scores.len(),
            rows: hosts.len(),
        });
    }

    let mut stats: HashMap<&str, HostStats> = HashMap::new();
    for (row, (host, &score)) in hosts.addresses().zip(scores.iter()).enumerate() {
        let entry = stats.entry(host).or_insert_with(|| HostStats {
            first_row: row,
            ..HostStats::default()
        });
        entry.sum += score;
        entry.count += 1;
    }

    let mut by_first_row: Vec<(&str, HostStats)> = stats.into_iter().collect();
    by_first_row.sort_by_key(|(_, s)| s.first_row);

    let mut verdicts: Vec<Verdict> = by_first_row
        .into_iter()
        .map(|(host, s)| Verdict {
            host: host.to_string(),
            mean_score: s.sum / s.count as f64,
            flow_count: s.count,
        })
        .filter(|v| v.mean_score >= threshold)
        .collect();

    // Stable: ties keep first-appearance order.
    verdicts.sort_by(|a, b| b.mean_score.total_cmp(&a.mean_score));

    tracing::debug!(
        rows = hosts.len(),
        infected = verdicts.len(),
        threshold,
        "aggregated scores per host"
    );
    Ok(verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn hosts(addrs: &[&str]) -> HostList {
        HostList::new(addrs.iter().map(|a| a.to_string()).collect())
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let h = hosts(&["A", "A"]);
        let verdicts = evaluate_per_host(array![0.9, 0.1].view(), &h, 0.5).unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].host, "A");
        assert!((verdicts[0].mean_score - 0.5).abs() < 1e-12);
        assert_eq!(verdicts[0].flow_count, 2);
    }

    #[test]
    fn test_sorted_descending() {
        let h = hosts(&["a", "b", "c", "b", "a", "c"]);
        let scores = array![0.9, 1.0, 0.6, 0.9, 0.9, 0.6];
        let verdicts = evaluate_per_host(scores.view(), &h, 0.5).unwrap();
        let expected = [0.95, 0.9, 0.6];
        assert_eq!(verdicts.len(), expected.len());
        for (v, want) in verdicts.iter().zip(expected) {
            assert!((v.mean_score - want).abs() < 1e-12, "{} != {want}", v.mean_score);
        }
        let names: Vec<&str> = verdicts.iter().map(|v| v.host.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_clean_hosts_dropped() {
        let h = hosts(&["a", "b", "a"]);
        let verdicts = evaluate_per_host(array![0.1, 0.7, 0.2].view(), &h, 0.5).unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].host, "b");
        assert_eq!(verdicts[0].flow_count, 1);
    }

    #[test]
    fn test_ties_keep_first_appearance() {
        let h = hosts(&["z", "y", "x", "y"]);
        let verdicts = evaluate_per_host(array![1.0, 1.0, 1.0, 1.0].view(), &h, 0.5).unwrap();
        let names: Vec<&str> = verdicts.iter().map(|v| v.host.as_str()).collect();
        assert_eq!(names, vec!["z", "y", "x"]);
    }

    #[test]
    fn test_margin_threshold() {
        let h = hosts(&["a", "b"]);
        let verdicts = evaluate_per_host(array![0.0, -0.1].view(), &h, 0.0).unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].host, "a");
    }

    #[test]
    fn test_length_mismatch() {
        let h = hosts(&["a"]);
        assert!(matches!(
            evaluate_per_host(array![0.1, 0.2].view(), &h, 0.5),
            Err(BotscanError::ScoreLengthMismatch { scores: 2, rows: 1 })
        ));
    }
}
