//! Prediction run orchestration with progress tracking.

use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{concatenate, Array1, ArrayView1, Axis};
use rayon::prelude::*;

use crate::aggregate::evaluate_per_host;
use crate::batch::{batchify, BatchSpec};
use crate::error::{BotscanError, Result};
use crate::features::FlowFrame;
use crate::filter::{filter_by_min_count, filter_by_ranges};
use crate::inference::{configure_jobs, Classifier, Jobs, Scorer, Scores};
use crate::ip::IpEntity;
use crate::report::Verdict;

/// Configuration for a prediction run.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Hosts with this many rows or fewer are skipped.
    pub min_count: usize,
    /// Allow-list of addresses and networks; empty means all hosts.
    pub ranges: Vec<IpEntity>,
    pub ignore_invalid: bool,
    pub batch: Option<BatchSpec>,
    pub jobs: Jobs,
}

/// Atomic progress counters, readable from another thread during a run.
#[derive(Debug, Default)]
pub struct ScanProgress {
    pub total_rows: AtomicUsize,
    pub scored_rows: AtomicUsize,
    pub batches: AtomicUsize,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Run the whole pipeline over a normalized frame.
///
/// Stages run in order: parallelism hint, count filter, range filter,
/// optional batching, scoring, per-host aggregation.
pub fn run_scan(
    frame: &FlowFrame,
    classifier: &mut dyn Classifier,
    config: &RunConfig,
    progress: &ScanProgress,
) -> Result<Vec<Verdict>> {
    configure_jobs(classifier, config.jobs);
    let scorer = Scorer::new(classifier)?;

    let frame = prepare(frame, config)?;
    progress.total_rows.store(frame.len(), Ordering::Relaxed);

    let scores = match &config.batch {
        Some(spec) => score_batched(&frame, &scorer, spec, config.jobs, progress)?,
        None => {
            let scores = scorer.score(frame.features())?;
            progress.batches.store(1, Ordering::Relaxed);
            progress.scored_rows.store(frame.len(), Ordering::Relaxed);
            scores
        }
    };

    let verdicts = evaluate_per_host(scores.values.view(), frame.hosts(), scores.threshold)?;
    tracing::info!(
        rows = frame.len(),
        infected = verdicts.len(),
        capability = %scorer.capability(),
        "prediction run complete"
    );
    Ok(verdicts)
}

/// Apply the count filter, then the range filter.
pub fn prepare(frame: &FlowFrame, config: &RunConfig) -> Result<FlowFrame> {
    let frame = filter_by_min_count(frame, config.min_count);
    filter_by_ranges(&frame, &config.ranges, config.ignore_invalid)
}

/// Score each batch on a worker pool and stitch the scores back in order.
pub fn score_batched(
    frame: &FlowFrame,
    scorer: &Scorer<'_>,
    spec: &BatchSpec,
    jobs: Jobs,
    progress: &ScanProgress,
) -> Result<Scores> {
    let batches = batchify(frame, spec)?;
    progress.batches.store(batches.len(), Ordering::Relaxed);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.threads())
        .build()
        .map_err(|e| BotscanError::Scoring(format!("failed to start worker pool: {e}")))?;

    let results: Vec<Array1<f64>> = pool.install(|| {
        batches
            .par_iter()
            .map(|batch| -> Result<Array1<f64>> {
                let scores = scorer.score(batch.features()).map_err(|e| match e {
                    BotscanError::ScoreLengthMismatch { scores, rows } => {
                        BotscanError::BatchingInvariant {
                            scored: scores,
                            expected: rows,
                        }
                    }
                    other => other,
                })?;
                progress.scored_rows.fetch_add(batch.len(), Ordering::Relaxed);
                tracing::debug!(rows = batch.len(), "scored batch");
                Ok(scores.values)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let views: Vec<ArrayView1<'_, f64>> = results.iter().map(Array1::view).collect();
    let values = if views.is_empty() {
        Array1::zeros(0)
    } else {
        concatenate(Axis(0), &views).map_err(|e| BotscanError::Scoring(e.to_string()))?
    };

    if values.len() != frame.len() {
        return Err(BotscanError::BatchingInvariant {
            scored: values.len(),
            expected: frame.len(),
        });
    }

    Ok(Scores {
        values,
        threshold: scorer.threshold(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{CanonicalFlow, FeatureRow, FeatureTable, HostList};
    use crate::inference::Capability;

    /// Probability equals bps / 1000, capped at 1.
    struct BpsModel;

    impl Classifier for BpsModel {
        fn supports(&self, capability: Capability) -> bool {
            capability == Capability::Probability
        }

        fn score(&self, _: Capability, features: &FeatureTable) -> anyhow::Result<Array1<f64>> {
            Ok(features
                .iter()
                .map(|r| (r.bps as f64 / 1000.0).min(1.0))
                .collect())
        }
    }

    /// Returns one score too many for every table it is given.
    struct Overshoot;

    impl Classifier for Overshoot {
        fn supports(&self, capability: Capability) -> bool {
            capability == Capability::Margin
        }

        fn score(&self, _: Capability, features: &FeatureTable) -> anyhow::Result<Array1<f64>> {
            Ok(Array1::zeros(features.len() + 1))
        }
    }

    fn frame(rows: &[(&str, u64)]) -> FlowFrame {
        let features = rows
            .iter()
            .map(|&(_, bps)| FeatureRow {
                flow: CanonicalFlow {
                    proto: "tcp".into(),
                    dport: "6667".into(),
                    sport: "1030".into(),
                    state: "CON".into(),
                    dur: 1.0,
                    totbytes: bps as f64 / 8.0,
                    srcbytes: 0.0,
                },
                bps,
            })
            .collect();
        let hosts = HostList::new(rows.iter().map(|(h, _)| h.to_string()).collect());
        FlowFrame::from_parts(FeatureTable::new(features), hosts).unwrap()
    }

    #[test]
    fn test_unbatched_run() {
        let f = frame(&[("10.0.0.1", 900), ("10.0.0.2", 100), ("10.0.0.1", 700)]);
        let progress = ScanProgress::new();
        let verdicts = run_scan(&f, &mut BpsModel, &RunConfig::default(), &progress).unwrap();

        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].host, "10.0.0.1");
        assert!((verdicts[0].mean_score - 0.8).abs() < 1e-12);
        assert_eq!(verdicts[0].flow_count, 2);
        assert_eq!(progress.scored_rows.load(Ordering::Relaxed), 3);
        assert_eq!(progress.batches.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_batched_matches_unbatched() {
        let rows: Vec<(String, u64)> = (0..50)
            .map(|i| (format!("10.0.{}.{}", i % 3, i % 7), (i * 37 % 1000) as u64))
            .collect();
        let refs: Vec<(&str, u64)> = rows.iter().map(|(h, b)| (h.as_str(), *b)).collect();
        let f = frame(&refs);

        let base =
            run_scan(&f, &mut BpsModel, &RunConfig::default(), &ScanProgress::new()).unwrap();
        for spec in [BatchSpec::Percent(10.0), BatchSpec::Percent(7.0), BatchSpec::Batches(49)] {
            let config = RunConfig {
                batch: Some(spec),
                jobs: Jobs::from_count(2).unwrap(),
                ..RunConfig::default()
            };
            let progress = ScanProgress::new();
            let batched = run_scan(&f, &mut BpsModel, &config, &progress).unwrap();
            assert_eq!(batched, base, "{spec}");
            assert_eq!(progress.scored_rows.load(Ordering::Relaxed), 50);
        }
    }

    #[test]
    fn test_invalid_batch_spec_fails_before_scoring() {
        let f = frame(&[("10.0.0.1", 900), ("10.0.0.2", 100)]);
        let config = RunConfig {
            batch: Some(BatchSpec::Batches(5)),
            ..RunConfig::default()
        };
        let progress = ScanProgress::new();
        assert!(matches!(
            run_scan(&f, &mut BpsModel, &config, &progress),
            Err(BotscanError::InvalidBatchSpec(_))
        ));
        assert_eq!(progress.scored_rows.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_misaligned_batch_scores() {
        let f = frame(&[("10.0.0.1", 900), ("10.0.0.2", 100), ("10.0.0.1", 700)]);

        assert!(matches!(
            run_scan(&f, &mut Overshoot, &RunConfig::default(), &ScanProgress::new()),
            Err(BotscanError::ScoreLengthMismatch { scores: 4, rows: 3 })
        ));

        let config = RunConfig {
            batch: Some(BatchSpec::Batches(2)),
            ..RunConfig::default()
        };
        assert!(matches!(
            run_scan(&f, &mut Overshoot, &config, &ScanProgress::new()),
            Err(BotscanError::BatchingInvariant { .. })
        ));
    }

    #[test]
    fn test_empty_after_filtering() {
        let f = frame(&[("10.0.0.1", 900), ("10.0.0.2", 100)]);
        let config = RunConfig {
            min_count: 1,
            batch: Some(BatchSpec::Percent(50.0)),
            ..RunConfig::default()
        };
        let verdicts = run_scan(&f, &mut BpsModel, &config, &ScanProgress::new()).unwrap();
        assert!(verdicts.is_empty());
    }
}
