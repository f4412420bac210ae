//! Search tunables with documented defaults
//!
//! Everything here can be left at its default; a JSON file may override any
//! subset of fields. Values are validated on load so a bad config fails at
//! startup instead of skewing rankings silently.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for candidate gathering, ranking, and training.
///
/// Missing fields in a config file fall back to the defaults below, so a
/// file overriding a single knob stays a one-line document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum lexical candidate pool per query. The effective pool is
    /// `max(top_n_candidates, 3 * top_k)` so large pages never starve.
    pub top_n_candidates: usize,
    /// Vocabulary cap for the lexical index.
    pub max_vocabulary: usize,
    /// Index adjacent-token bigrams alongside unigrams.
    pub use_bigrams: bool,
    /// Weight of the lexical cosine in model-less fallback ranking.
    pub fallback_lexical_weight: f64,
    /// Weight of the fuzzy score in model-less fallback ranking.
    pub fallback_fuzzy_weight: f64,
    /// Reject training pairs already stored verbatim. Off by default:
    /// repeated confirmations are genuine signal.
    pub dedupe_training: bool,
    /// Kick off a retrain right after each accepted training example.
    pub retrain_on_add: bool,
    /// Synthesized negative examples per positive during training.
    pub negatives_per_positive: usize,
    /// Trees in the relevance ensemble.
    pub trees: usize,
    /// Seed for every random decision in training (bootstrap, holdout,
    /// negative sampling). Same store + same seed = same model.
    pub train_seed: u64,
    /// Fraction of examples held out for the post-train quality report.
    pub holdout_fraction: f64,
    /// Minimum fuzzy similarity to a stored training query before the
    /// training boost applies to a candidate's probability.
    pub boost_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_n_candidates: 50,
            max_vocabulary: 1000,
            use_bigrams: true,
            fallback_lexical_weight: 0.7,
            fallback_fuzzy_weight: 0.3,
            dedupe_training: false,
            retrain_on_add: false,
            negatives_per_positive: 3,
            trees: 100,
            train_seed: 42,
            holdout_fraction: 0.2,
            boost_threshold: 0.7,
        }
    }
}

impl SearchConfig {
    /// Load from a JSON file, merging missing fields from the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges. Called by [`Self::from_file`]; call it yourself
    /// when building a config programmatically.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n_candidates == 0 {
            return Err(ConfigError::Invalid("top_n_candidates must be at least 1".into()));
        }
        if self.max_vocabulary == 0 {
            return Err(ConfigError::Invalid("max_vocabulary must be at least 1".into()));
        }
        if self.trees == 0 {
            return Err(ConfigError::Invalid("trees must be at least 1".into()));
        }
        if self.negatives_per_positive == 0 {
            return Err(ConfigError::Invalid(
                "negatives_per_positive must be at least 1".into(),
            ));
        }
        if self.fallback_lexical_weight < 0.0 || self.fallback_fuzzy_weight < 0.0 {
            return Err(ConfigError::Invalid("fallback weights must be non-negative".into()));
        }
        if self.fallback_lexical_weight + self.fallback_fuzzy_weight <= 0.0 {
            return Err(ConfigError::Invalid("fallback weights must not both be zero".into()));
        }
        if !(0.0..0.9).contains(&self.holdout_fraction) {
            return Err(ConfigError::Invalid(
                "holdout_fraction must be in [0.0, 0.9)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.boost_threshold) {
            return Err(ConfigError::Invalid("boost_threshold must be in [0.0, 1.0]".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        SearchConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.json");
        std::fs::write(&path, r#"{ "trees": 25, "dedupe_training": true }"#).unwrap();

        let config = SearchConfig::from_file(&path).unwrap();
        assert_eq!(config.trees, 25);
        assert!(config.dedupe_training);
        // Untouched fields keep their defaults
        assert_eq!(config.top_n_candidates, 50);
        assert_eq!(config.train_seed, 42);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = SearchConfig::default();
        config.trees = 0;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.fallback_lexical_weight = 0.0;
        config.fallback_fuzzy_weight = 0.0;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.holdout_fraction = 0.95;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SearchConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_roundtrips_through_json() {
        let config = SearchConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SearchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.trees, config.trees);
        assert_eq!(back.boost_threshold, config.boost_threshold);
    }
}
