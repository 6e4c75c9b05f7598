//! sorter.toml configuration.
//!
//! ```toml
//! allocator = "master@127.0.0.1:5050"
//! seed = 42
//! fairness_exclude_resource_names = ["gpus"]
//!
//! [weights]
//! "eng" = 3.0
//! "eng/ml" = 2.0
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{SorterError, SorterResult};
use crate::sorter::{RandomSorter, SorterLabels};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SorterConfig {
    /// Allocator identity, used for telemetry labels only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_prefix: Option<String>,
    /// Seed for reproducible orderings. Entropy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fairness_exclude_resource_names: Option<BTreeSet<String>>,
    /// Path → weight overrides.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl SorterConfig {
    pub fn from_file(path: &Path) -> SorterResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SorterError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SorterResult<Self> {
        toml::from_str(content).map_err(|e| SorterError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SorterResult<String> {
        toml::to_string_pretty(self).map_err(|e| SorterError::Config(e.to_string()))
    }

    /// Build a sorter with this configuration's labels, exclusions and
    /// weights applied.
    pub fn build(&self) -> RandomSorter {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut sorter = RandomSorter::with_rng(rng);
        sorter.set_labels(SorterLabels {
            allocator: self.allocator.clone(),
            metrics_prefix: self.metrics_prefix.clone(),
        });
        sorter.initialize(self.fairness_exclude_resource_names.clone());
        for (path, &weight) in &self.weights {
            sorter.update_weight(path, weight);
        }
        sorter
    }
}
