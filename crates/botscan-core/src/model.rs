//! JSON-defined linear classifier over the canonical feature schema.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::Array1;
use rayon::prelude::*;
use serde::Deserialize;

use crate::features::{FeatureRow, FeatureTable, FEATURE_NAMES};
use crate::inference::{Capability, Classifier, Jobs};

const CATEGORICAL: [&str; 4] = ["proto", "dport", "sport", "state"];

/// Output transform applied to the linear margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    Logistic,
    Identity,
    Step,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NumericTerm {
    pub weight: f64,
    #[serde(default)]
    pub mean: f64,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

fn unit_scale() -> f64 {
    1.0
}

/// `margin = intercept + Σ weight · (x - mean) / scale + Σ weight[category]`
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    pub link: Link,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub numeric: BTreeMap<String, NumericTerm>,
    #[serde(default)]
    pub categorical: BTreeMap<String, HashMap<String, f64>>,
    #[serde(skip)]
    jobs: Option<Jobs>,
}

impl LinearModel {
    /// Load and validate a model from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read model {}", path.display()))?;
        let model: LinearModel = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse model {}", path.display()))?;
        model.validate()?;
        tracing::debug!(
            path = %path.display(),
            link = ?model.link,
            numeric = model.numeric.len(),
            categorical = model.categorical.len(),
            "loaded linear model"
        );
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        for (name, term) in &self.numeric {
            if !FEATURE_NAMES.contains(&name.as_str()) || CATEGORICAL.contains(&name.as_str()) {
                bail!("'{name}' is not a numeric feature");
            }
            if term.scale == 0.0 || !term.scale.is_finite() {
                bail!("scale for '{name}' must be finite and non-zero");
            }
        }
        for name in self.categorical.keys() {
            if !CATEGORICAL.contains(&name.as_str()) {
                bail!("'{name}' is not a categorical feature");
            }
        }
        Ok(())
    }

    pub fn margin(&self, row: &FeatureRow) -> f64 {
        let numeric: f64 = self
            .numeric
            .iter()
            .map(|(name, term)| {
                let x = row.numeric(name).unwrap_or_default();
                term.weight * (x - term.mean) / term.scale
            })
            .sum();
        let categorical: f64 = self
            .categorical
            .iter()
            .filter_map(|(name, weights)| weights.get(row.category(name)?))
            .sum();
        self.intercept + numeric + categorical
    }

    fn output(&self, capability: Capability, row: &FeatureRow) -> f64 {
        let margin = self.margin(row);
        match capability {
            Capability::Probability => 1.0 / (1.0 + (-margin).exp()),
            Capability::Margin => margin,
            Capability::Label => f64::from(u8::from(margin > 0.0)),
        }
    }
}

impl Classifier for LinearModel {
    fn supports(&self, capability: Capability) -> bool {
        match self.link {
            Link::Logistic => true,
            Link::Identity => capability != Capability::Probability,
            Link::Step => capability == Capability::Label,
        }
    }

    fn score(&self, capability: Capability, features: &FeatureTable) -> Result<Array1<f64>> {
        if !self.supports(capability) {
            bail!("{:?} model cannot produce {capability} scores", self.link);
        }

        let parallel = self.jobs.is_some_and(Jobs::is_parallel);
        let scores: Vec<f64> = if parallel {
            let rows: Vec<&FeatureRow> = features.iter().collect();
            rows.par_iter().map(|row| self.output(capability, row)).collect()
        } else {
            features.iter().map(|row| self.output(capability, row)).collect()
        };
        Ok(Array1::from(scores))
    }

    fn set_jobs(&mut self, jobs: Jobs) -> bool {
        self.jobs = Some(jobs);
        true
    }
}
