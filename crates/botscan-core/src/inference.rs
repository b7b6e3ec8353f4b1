//! Classifier interface and the scoring adapter in front of it.

use std::fmt;
use std::num::NonZeroUsize;

use ndarray::Array1;

use crate::error::{BotscanError, Result};
use crate::features::FeatureTable;

/// Kind of output a classifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Positive-class probability in [0, 1].
    Probability,
    /// Signed distance from the decision boundary.
    Margin,
    /// Hard 0/1 class label.
    Label,
}

impl Capability {
    /// Preference order used when picking a capability.
    pub const PRIORITY: [Capability; 3] =
        [Capability::Probability, Capability::Margin, Capability::Label];

    /// Score at or above which a host is considered infected.
    pub fn threshold(self) -> f64 {
        match self {
            Capability::Probability => 0.5,
            Capability::Margin => 0.0,
            Capability::Label => 0.5,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Probability => "probability",
            Capability::Margin => "margin",
            Capability::Label => "label",
        };
        f.write_str(name)
    }
}

/// Parallelism hint: all available cores or a fixed number of jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jobs {
    #[default]
    All,
    Count(NonZeroUsize),
}

impl Jobs {
    /// Negative values mean "all cores"; zero is rejected.
    pub fn from_count(n: i64) -> Result<Self> {
        match n {
            0 => Err(BotscanError::InvalidJobs),
            n if n < 0 => Ok(Jobs::All),
            n => NonZeroUsize::new(n as usize)
                .map(Jobs::Count)
                .ok_or(BotscanError::InvalidJobs),
        }
    }

    /// Thread count for a `rayon` pool; 0 lets rayon use every core.
    pub fn threads(self) -> usize {
        match self {
            Jobs::All => 0,
            Jobs::Count(n) => n.get(),
        }
    }

    pub fn is_parallel(self) -> bool {
        self != Jobs::Count(NonZeroUsize::MIN)
    }
}

/// A trained binary classifier over [`FeatureTable`] rows.
///
/// Implementations are shared read-only across batch scoring threads.
pub trait Classifier: Send + Sync {
    fn supports(&self, capability: Capability) -> bool;

    /// One score per row, in row order, on the scale of `capability`.
    fn score(&self, capability: Capability, features: &FeatureTable) -> anyhow::Result<Array1<f64>>;

    /// Accept a parallelism hint. Composite classifiers forward it to every
    /// stage that can use it. Returns `false` when nothing took it.
    fn set_jobs(&mut self, _jobs: Jobs) -> bool {
        false
    }
}

/// Hand the parallelism hint to the classifier, if it takes one.
pub fn configure_jobs(classifier: &mut dyn Classifier, jobs: Jobs) {
    if !classifier.set_jobs(jobs) {
        tracing::debug!("classifier does not support parallel jobs, ignoring hint");
    }
}

/// Row scores and the threshold that applies to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub values: Array1<f64>,
    pub threshold: f64,
}

/// Fixes the scoring capability once and applies it to every table.
#[derive(Clone, Copy)]
pub struct Scorer<'a> {
    classifier: &'a dyn Classifier,
    capability: Capability,
}

impl<'a> Scorer<'a> {
    /// Pick the first capability in [`Capability::PRIORITY`] the classifier supports.
    pub fn new(classifier: &'a dyn Classifier) -> Result<Self> {
        let capability = Capability::PRIORITY
            .into_iter()
            .find(|&c| classifier.supports(c))
            .ok_or(BotscanError::UnsupportedClassifier)?;
        tracing::debug!(%capability, "selected scoring capability");
        Ok(Self {
            classifier,
            capability,
        })
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn threshold(&self) -> f64 {
        self.capability.threshold()
    }

    pub fn score(&self, features: &FeatureTable) -> Result<Scores> {
        let values = self
            .classifier
            .score(self.capability, features)
            .map_err(|e| BotscanError::Scoring(format!("{e:#}")))?;
        if values.len() != features.len() {
            return Err(BotscanError::ScoreLengthMismatch {
                scores: values.len(),
                rows: features.len(),
            });
        }
        Ok(Scores {
            values,
            threshold: self.threshold(),
        })
    }
}

impl fmt::Debug for Scorer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scorer")
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}
