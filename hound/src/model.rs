//! Learned relevance model
//!
//! A bagged ensemble of regression trees over the fixed feature schema,
//! trained from confirmed (query, product) pairs. Positives come straight
//! from the training corpus; negatives are synthesized by a pluggable
//! sampler. Every random decision flows from one seed, so the same corpus
//! and config always produce the same model.

use crate::candidate::CatalogEntry;
use crate::config::SearchConfig;
use crate::features::{self, FeatureVector, FEATURE_DIM, FEATURE_SCHEMA_VERSION};
use crate::fuzzy;
use crate::indexer::TfIdfIndex;
use crate::models::{ProductRecord, TrainingExample};
use crate::normalize::normalize;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Stop splitting below this many samples.
const MIN_SAMPLES_SPLIT: usize = 2;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no usable training examples")]
    NoTrainingData,
    #[error("feature schema mismatch: model expects v{expected}, got v{found}")]
    SchemaMismatch { expected: u32, found: u32 },
}

// ─────────────────────────────────────────────────────────────────────────
// Negative sampling
// ─────────────────────────────────────────────────────────────────────────

/// Strategy for picking wrong-answer products during training.
///
/// Implementations must be deterministic given the passed rng: training
/// reproducibility hangs on it.
pub trait NegativeSampler: Send + Sync {
    /// Return up to `count` catalog positions to label 0.0 for `example`.
    /// The correct order code must never be among them. `catalog` is the
    /// slice `index` was built from, in the same order.
    fn sample(
        &self,
        example: &TrainingExample,
        catalog: &[CatalogEntry],
        index: &TfIdfIndex,
        count: usize,
        rng: &mut StdRng,
    ) -> Vec<usize>;
}

/// Default sampler: lexical near misses.
///
/// Products the index almost retrieves for the query make much harder
/// negatives than random picks, which keeps the trees from learning the
/// trivial "any lexical overlap means relevant" rule. When the index
/// returns too few near misses the remainder is filled by a seeded scan
/// from a random catalog offset.
pub struct NearMissNegativeSampler;

impl NegativeSampler for NearMissNegativeSampler {
    fn sample(
        &self,
        example: &TrainingExample,
        catalog: &[CatalogEntry],
        index: &TfIdfIndex,
        count: usize,
        rng: &mut StdRng,
    ) -> Vec<usize> {
        let eligible = catalog
            .iter()
            .filter(|entry| entry.order_code() != example.order_code)
            .count();
        let target = count.min(eligible);
        let mut picked: Vec<usize> = Vec::with_capacity(target);
        if target == 0 {
            return picked;
        }

        let normalized = normalize(&example.customer_query);
        let query = index.embed_query(&normalized);
        if !query.is_empty() {
            // A few extra hits cover the correct answer sitting in the top.
            for hit in index.top_n(&query, count + 5) {
                if catalog[hit.doc_id].order_code() == example.order_code {
                    continue;
                }
                if !picked.contains(&hit.doc_id) {
                    picked.push(hit.doc_id);
                }
                if picked.len() == target {
                    return picked;
                }
            }
        }

        // Near misses ran short; walk the catalog from a seeded offset.
        let start = rng.gen_range(0..catalog.len());
        for step in 0..catalog.len() {
            let i = (start + step) % catalog.len();
            if catalog[i].order_code() == example.order_code || picked.contains(&i) {
                continue;
            }
            picked.push(i);
            if picked.len() == target {
                break;
            }
        }
        picked
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Feature scaling
// ─────────────────────────────────────────────────────────────────────────

/// Per-feature standardization fitted on the training split.
#[derive(Debug, Clone)]
struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    fn fit(rows: &[[f64; FEATURE_DIM]]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; FEATURE_DIM];
        for row in rows {
            for i in 0..FEATURE_DIM {
                means[i] += row[i];
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        let mut scales = vec![0.0; FEATURE_DIM];
        for row in rows {
            for i in 0..FEATURE_DIM {
                scales[i] += (row[i] - means[i]).powi(2);
            }
        }
        for scale in &mut scales {
            *scale = (*scale / n).sqrt();
            // Constant features pass through unscaled instead of dividing by 0.
            if *scale < 1e-12 {
                *scale = 1.0;
            }
        }

        Self { means, scales }
    }

    fn transform(&self, values: &[f64; FEATURE_DIM]) -> [f64; FEATURE_DIM] {
        let mut out = [0.0; FEATURE_DIM];
        for i in 0..FEATURE_DIM {
            out[i] = (values[i] - self.means[i]) / self.scales[i];
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Regression trees
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    root: TreeNode,
}

impl RegressionTree {
    /// Fit one tree on a bootstrap sample of the rows.
    fn fit_bootstrap(rows: &[[f64; FEATURE_DIM]], labels: &[f64], rng: &mut StdRng) -> Self {
        let n = rows.len();
        let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        Self {
            root: grow(rows, labels, sample),
        }
    }

    fn predict(&self, values: &[f64; FEATURE_DIM]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if values[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

fn mean_label(labels: &[f64], indices: &[usize]) -> f64 {
    indices.iter().map(|&i| labels[i]).sum::<f64>() / indices.len() as f64
}

fn is_pure(labels: &[f64], indices: &[usize]) -> bool {
    let first = labels[indices[0]];
    indices.iter().all(|&i| (labels[i] - first).abs() < 1e-12)
}

/// Grow a CART regression tree to purity.
fn grow(rows: &[[f64; FEATURE_DIM]], labels: &[f64], indices: Vec<usize>) -> TreeNode {
    if indices.is_empty() {
        return TreeNode::Leaf { value: 0.0 };
    }
    let value = mean_label(labels, &indices);
    if indices.len() < MIN_SAMPLES_SPLIT || is_pure(labels, &indices) {
        return TreeNode::Leaf { value };
    }

    let Some((feature, threshold)) = best_split(rows, labels, &indices) else {
        // Duplicate rows with conflicting labels cannot be separated.
        return TreeNode::Leaf { value };
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| rows[i][feature] <= threshold);
    if left_idx.is_empty() || right_idx.is_empty() {
        return TreeNode::Leaf { value };
    }

    TreeNode::Split {
        feature,
        threshold,
        left: Box::new(grow(rows, labels, left_idx)),
        right: Box::new(grow(rows, labels, right_idx)),
    }
}

/// Best (feature, threshold) by variance reduction, or None when every
/// feature is constant across the samples.
///
/// Thresholds are midpoints between consecutive distinct sorted values.
/// Features are scanned in slot order and only a strictly better split
/// replaces the incumbent, so the choice is deterministic.
fn best_split(
    rows: &[[f64; FEATURE_DIM]],
    labels: &[f64],
    indices: &[usize],
) -> Option<(usize, f64)> {
    let n = indices.len();
    let parent_sse = {
        let sum: f64 = indices.iter().map(|&i| labels[i]).sum();
        let sum_sq: f64 = indices.iter().map(|&i| labels[i] * labels[i]).sum();
        sum_sq - sum * sum / n as f64
    };

    let mut best: Option<(usize, f64, f64)> = None;
    for feature in 0..FEATURE_DIM {
        let mut pairs: Vec<(f64, f64)> = indices
            .iter()
            .map(|&i| (rows[i][feature], labels[i]))
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let total_sum: f64 = pairs.iter().map(|p| p.1).sum();
        let total_sq: f64 = pairs.iter().map(|p| p.1 * p.1).sum();
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 1..n {
            left_sum += pairs[k - 1].1;
            left_sq += pairs[k - 1].1 * pairs[k - 1].1;
            if pairs[k].0 <= pairs[k - 1].0 {
                continue;
            }
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let left_sse = left_sq - left_sum * left_sum / k as f64;
            let right_sse = right_sq - right_sum * right_sum / (n - k) as f64;
            let combined = left_sse + right_sse;
            let ceiling = best.map_or(parent_sse, |(_, _, b)| b);
            if combined + 1e-12 < ceiling {
                best = Some((feature, (pairs[k - 1].0 + pairs[k].0) / 2.0, combined));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

fn ensemble_mean(trees: &[RegressionTree], scaled: &[f64; FEATURE_DIM]) -> f64 {
    let sum: f64 = trees.iter().map(|tree| tree.predict(scaled)).sum();
    sum / trees.len() as f64
}

// ─────────────────────────────────────────────────────────────────────────
// Model
// ─────────────────────────────────────────────────────────────────────────

/// Quality summary captured at train time.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub positives: usize,
    pub negatives: usize,
    pub holdout_size: usize,
    /// None when the holdout was empty.
    pub holdout_mse: Option<f64>,
    /// None when the holdout was empty or had constant labels.
    pub holdout_r2: Option<f64>,
}

/// Fitted scaler + ensemble, valid only for the feature schema it saw.
pub struct RelevanceModel {
    scaler: StandardScaler,
    trees: Vec<RegressionTree>,
    schema_version: u32,
    report: TrainingReport,
}

impl RelevanceModel {
    /// Train from the full corpus against the given catalog and index.
    ///
    /// `catalog` must be the slice `index` was built from, in the same
    /// order, so document ids line up. Examples whose query normalizes to
    /// nothing are skipped; if none survive the model refuses to train.
    pub fn train(
        examples: &[TrainingExample],
        catalog: &[CatalogEntry],
        index: &TfIdfIndex,
        sampler: &dyn NegativeSampler,
        config: &SearchConfig,
    ) -> Result<Self, ModelError> {
        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        if examples.is_empty() {
            return Err(ModelError::NoTrainingData);
        }

        let position_by_code: HashMap<&str, usize> = catalog
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.order_code(), i))
            .collect();

        let mut rows: Vec<[f64; FEATURE_DIM]> = Vec::new();
        let mut labels: Vec<f64> = Vec::new();
        let mut positives = 0;
        let mut negatives = 0;

        let mut rng = StdRng::seed_from_u64(config.train_seed);
        for example in examples {
            let normalized = normalize(&example.customer_query);
            if normalized.is_empty() {
                continue;
            }
            let raw_lower = example.customer_query.to_lowercase();
            let query = index.embed_query(&normalized);

            // Positive: the confirmed product. Prefer the live catalog row so
            // features match what query time will compute; a code that has
            // left the catalog falls back to the stored description with no
            // lexical signal.
            let fallback_entry;
            let (positive_entry, positive_cosine) =
                match position_by_code.get(example.order_code.as_str()) {
                    Some(&i) => (&catalog[i], index.score_doc(&query, i) as f64),
                    None => {
                        fallback_entry = CatalogEntry::new(ProductRecord::new(
                            &example.order_code,
                            &example.description,
                        ));
                        (&fallback_entry, 0.0)
                    }
                };
            rows.push(
                features::extract(&normalized, &raw_lower, positive_entry, positive_cosine)
                    .to_vector()
                    .values,
            );
            labels.push(1.0);
            positives += 1;

            for i in sampler.sample(
                example,
                catalog,
                index,
                config.negatives_per_positive,
                &mut rng,
            ) {
                let cosine = index.score_doc(&query, i) as f64;
                rows.push(
                    features::extract(&normalized, &raw_lower, &catalog[i], cosine)
                        .to_vector()
                        .values,
                );
                labels.push(0.0);
                negatives += 1;
            }
        }

        if rows.is_empty() {
            return Err(ModelError::NoTrainingData);
        }

        // Seeded holdout split; always keep at least one training row.
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.shuffle(&mut rng);
        let mut holdout_len = (rows.len() as f64 * config.holdout_fraction) as usize;
        if holdout_len >= rows.len() {
            holdout_len = rows.len() - 1;
        }
        let (holdout_idx, train_idx) = order.split_at(holdout_len);

        let train_rows: Vec<[f64; FEATURE_DIM]> = train_idx.iter().map(|&i| rows[i]).collect();
        let train_labels: Vec<f64> = train_idx.iter().map(|&i| labels[i]).collect();
        let scaler = StandardScaler::fit(&train_rows);
        let scaled_rows: Vec<[f64; FEATURE_DIM]> =
            train_rows.iter().map(|row| scaler.transform(row)).collect();

        // One seed per tree keeps the build reproducible under rayon's
        // scheduling.
        let trees: Vec<RegressionTree> = (0..config.trees)
            .into_par_iter()
            .map(|tree_index| {
                let mut tree_rng =
                    StdRng::seed_from_u64(config.train_seed.wrapping_add(tree_index as u64 + 1));
                RegressionTree::fit_bootstrap(&scaled_rows, &train_labels, &mut tree_rng)
            })
            .collect();

        let (holdout_mse, holdout_r2) = if holdout_idx.is_empty() {
            (None, None)
        } else {
            let mean = mean_label(&labels, holdout_idx);
            let mut sse = 0.0;
            let mut sst = 0.0;
            for &i in holdout_idx {
                let prediction = ensemble_mean(&trees, &scaler.transform(&rows[i]));
                sse += (labels[i] - prediction).powi(2);
                sst += (labels[i] - mean).powi(2);
            }
            let mse = sse / holdout_idx.len() as f64;
            let r2 = if sst > 0.0 { Some(1.0 - sse / sst) } else { None };
            (Some(mse), r2)
        };

        #[cfg(feature = "perf-log")]
        eprintln!(
            "[perf] model train={:.1}ms rows={} trees={}",
            t0.elapsed().as_secs_f64() * 1000.0,
            rows.len(),
            trees.len(),
        );

        Ok(Self {
            scaler,
            trees,
            schema_version: FEATURE_SCHEMA_VERSION,
            report: TrainingReport {
                positives,
                negatives,
                holdout_size: holdout_idx.len(),
                holdout_mse,
                holdout_r2,
            },
        })
    }

    /// Score a feature vector as a relevance probability in [0, 1].
    pub fn score(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        if features.schema_version != self.schema_version {
            return Err(ModelError::SchemaMismatch {
                expected: self.schema_version,
                found: features.schema_version,
            });
        }
        let scaled = self.scaler.transform(&features.values);
        Ok(ensemble_mean(&self.trees, &scaled).clamp(0.0, 1.0))
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }
}

/// Extra probability for queries resembling a confirmed query for the
/// product, using whatever ratio is highest. Ramps from 0.3 at the
/// threshold to 0.8 at an identical query; the caller clamps the boosted
/// probability to 1.0. Inputs are normalized query texts.
pub fn training_boost(query_text: &str, stored_queries: &[String], threshold: f64) -> f64 {
    let mut best = 0.0f64;
    for stored in stored_queries {
        let sim = fuzzy::max_ratio(query_text, stored);
        if sim > best {
            best = sim;
        }
    }
    if best < threshold {
        return 0.0;
    }
    let span = (1.0 - threshold).max(f64::EPSILON);
    0.3 + (best - threshold) * (0.5 / span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexParams;

    fn entry(code: &str, desc: &str) -> CatalogEntry {
        CatalogEntry::new(ProductRecord::new(code, desc))
    }

    fn test_catalog() -> Vec<CatalogEntry> {
        vec![
            entry("1SFL447101R1300", "Contactor AF140 100-250V"),
            entry("2CDS253001R0204", "Circuit breaker S253 C20"),
            entry("3RT2026-1AL20", "Power contactor 25A 230V"),
            entry("5SL6116-6", "Miniature breaker B16"),
            entry("GV2ME14", "Motor protection unit 6-10A"),
            entry("LC1D18M7", "Contactor 18A coil 220V"),
        ]
    }

    fn test_index(catalog: &[CatalogEntry]) -> TfIdfIndex {
        let documents: Vec<(String, String)> = catalog
            .iter()
            .map(|e| (e.order_code().to_string(), e.index_text()))
            .collect();
        TfIdfIndex::build(&documents, &[], IndexParams::default()).unwrap()
    }

    fn example(id: i64, query: &str, code: &str, desc: &str) -> TrainingExample {
        TrainingExample {
            id,
            customer_query: query.to_string(),
            order_code: code.to_string(),
            description: desc.to_string(),
            source_file: None,
            created_at_unix: 0,
        }
    }

    fn test_examples() -> Vec<TrainingExample> {
        vec![
            example(1, "contactor af140", "1SFL447101R1300", "Contactor AF140 100-250V"),
            example(2, "circuit breaker c20", "2CDS253001R0204", "Circuit breaker S253 C20"),
            example(3, "motor protection", "GV2ME14", "Motor protection unit 6-10A"),
            example(4, "contactor 18a coil", "LC1D18M7", "Contactor 18A coil 220V"),
        ]
    }

    fn small_config() -> SearchConfig {
        SearchConfig {
            trees: 16,
            ..SearchConfig::default()
        }
    }

    fn features_for(query: &str, catalog: &[CatalogEntry], index: &TfIdfIndex, doc_id: usize) -> FeatureVector {
        let normalized = normalize(query);
        let embedded = index.embed_query(&normalized);
        let cosine = index.score_doc(&embedded, doc_id) as f64;
        features::extract(&normalized, &query.to_lowercase(), &catalog[doc_id], cosine).to_vector()
    }

    // ── scaler ──────────────────────────────────────────────────────────

    #[test]
    fn test_scaler_centers_training_rows() {
        let mut row_a = [0.0; FEATURE_DIM];
        let mut row_b = [0.0; FEATURE_DIM];
        row_a[0] = 2.0;
        row_b[0] = 4.0;
        let scaler = StandardScaler::fit(&[row_a, row_b]);

        let t_a = scaler.transform(&row_a);
        let t_b = scaler.transform(&row_b);
        assert!((t_a[0] + 1.0).abs() < 1e-9, "2.0 sits one std below the mean");
        assert!((t_b[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaler_passes_constant_features_through() {
        let mut row = [0.5; FEATURE_DIM];
        row[3] = 0.9;
        let scaler = StandardScaler::fit(&[row, row, row]);
        let transformed = scaler.transform(&row);
        for value in transformed {
            assert!(value.abs() < 1e-9, "constant features transform to zero, never NaN");
            assert!(!value.is_nan());
        }
    }

    // ── trees ───────────────────────────────────────────────────────────

    #[test]
    fn test_tree_separates_on_single_feature() {
        let mut low = [0.0; FEATURE_DIM];
        let mut high = [0.0; FEATURE_DIM];
        low[2] = 0.1;
        high[2] = 0.9;
        let rows = vec![low, low, high, high];
        let labels = vec![0.0, 0.0, 1.0, 1.0];
        let tree = RegressionTree {
            root: grow(&rows, &labels, (0..4).collect()),
        };
        assert_eq!(tree.predict(&low), 0.0);
        assert_eq!(tree.predict(&high), 1.0);
    }

    #[test]
    fn test_tree_falls_back_to_mean_on_conflicting_duplicates() {
        let row = [0.5; FEATURE_DIM];
        let rows = vec![row, row];
        let labels = vec![0.0, 1.0];
        let tree = RegressionTree {
            root: grow(&rows, &labels, vec![0, 1]),
        };
        assert!((tree.predict(&row) - 0.5).abs() < 1e-9);
    }

    // ── training ────────────────────────────────────────────────────────

    #[test]
    fn test_train_rejects_empty_corpus() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let result = RelevanceModel::train(
            &[],
            &catalog,
            &index,
            &NearMissNegativeSampler,
            &small_config(),
        );
        assert!(matches!(result, Err(ModelError::NoTrainingData)));
    }

    #[test]
    fn test_train_rejects_corpus_of_unusable_queries() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let junk = vec![example(1, "###", "1SFL447101R1300", "Contactor AF140 100-250V")];
        let result = RelevanceModel::train(
            &junk,
            &catalog,
            &index,
            &NearMissNegativeSampler,
            &small_config(),
        );
        assert!(matches!(result, Err(ModelError::NoTrainingData)));
    }

    #[test]
    fn test_training_is_deterministic_for_fixed_seed() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let examples = test_examples();
        let config = small_config();

        let first = RelevanceModel::train(&examples, &catalog, &index, &NearMissNegativeSampler, &config)
            .unwrap();
        let second = RelevanceModel::train(&examples, &catalog, &index, &NearMissNegativeSampler, &config)
            .unwrap();

        let probe = features_for("contactor af140", &catalog, &index, 0);
        assert_eq!(
            first.score(&probe).unwrap(),
            second.score(&probe).unwrap(),
            "same corpus and seed must give bit-identical scores"
        );
        assert_eq!(first.report().positives, second.report().positives);
        assert_eq!(first.report().negatives, second.report().negatives);
    }

    #[test]
    fn test_confirmed_pair_outscores_unrelated_product() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let model = RelevanceModel::train(
            &test_examples(),
            &catalog,
            &index,
            &NearMissNegativeSampler,
            &small_config(),
        )
        .unwrap();

        let confirmed = features_for("contactor af140", &catalog, &index, 0);
        let unrelated = features_for("contactor af140", &catalog, &index, 3);
        assert!(
            model.score(&confirmed).unwrap() > model.score(&unrelated).unwrap(),
            "the trained pair should beat a miniature breaker for a contactor query"
        );
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let model = RelevanceModel::train(
            &test_examples(),
            &catalog,
            &index,
            &NearMissNegativeSampler,
            &small_config(),
        )
        .unwrap();

        for doc_id in 0..catalog.len() {
            let probe = features_for("breaker 25a", &catalog, &index, doc_id);
            let score = model.score(&probe).unwrap();
            assert!((0.0..=1.0).contains(&score), "score out of range: {}", score);
        }
    }

    #[test]
    fn test_score_rejects_schema_drift() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let model = RelevanceModel::train(
            &test_examples(),
            &catalog,
            &index,
            &NearMissNegativeSampler,
            &small_config(),
        )
        .unwrap();

        let stale = FeatureVector {
            schema_version: FEATURE_SCHEMA_VERSION + 1,
            values: [0.0; FEATURE_DIM],
        };
        match model.score(&stale) {
            Err(ModelError::SchemaMismatch { expected, found }) => {
                assert_eq!(expected, FEATURE_SCHEMA_VERSION);
                assert_eq!(found, FEATURE_SCHEMA_VERSION + 1);
            }
            other => panic!("expected SchemaMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_report_counts_examples() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let config = small_config();
        let model = RelevanceModel::train(
            &test_examples(),
            &catalog,
            &index,
            &NearMissNegativeSampler,
            &config,
        )
        .unwrap();

        let report = model.report();
        assert_eq!(report.positives, 4);
        assert_eq!(report.negatives, 4 * config.negatives_per_positive);
        let total = report.positives + report.negatives;
        assert_eq!(report.holdout_size, (total as f64 * config.holdout_fraction) as usize);
    }

    #[test]
    fn test_train_survives_code_missing_from_catalog() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let mut examples = test_examples();
        examples.push(example(5, "legacy relay", "DISCONTINUED-9", "Relay long gone"));

        let model = RelevanceModel::train(
            &examples,
            &catalog,
            &index,
            &NearMissNegativeSampler,
            &small_config(),
        )
        .unwrap();
        assert_eq!(model.report().positives, 5);
    }

    // ── negative sampler ────────────────────────────────────────────────

    #[test]
    fn test_sampler_never_picks_the_correct_code() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let example = example(1, "contactor af140", "1SFL447101R1300", "Contactor AF140 100-250V");

        let mut rng = StdRng::seed_from_u64(7);
        let picks = NearMissNegativeSampler.sample(&example, &catalog, &index, 3, &mut rng);
        assert_eq!(picks.len(), 3);
        for i in picks {
            assert_ne!(catalog[i].order_code(), "1SFL447101R1300");
        }
    }

    #[test]
    fn test_sampler_is_deterministic() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        let example = example(1, "breaker", "2CDS253001R0204", "Circuit breaker S253 C20");

        let first =
            NearMissNegativeSampler.sample(&example, &catalog, &index, 3, &mut StdRng::seed_from_u64(11));
        let second =
            NearMissNegativeSampler.sample(&example, &catalog, &index, 3, &mut StdRng::seed_from_u64(11));
        assert_eq!(first, second);
    }

    #[test]
    fn test_sampler_caps_at_eligible_catalog_size() {
        let catalog = vec![
            entry("A-1", "Widget one"),
            entry("B-2", "Widget two"),
        ];
        let index = test_index(&catalog);
        let example = example(1, "widget", "A-1", "Widget one");

        let mut rng = StdRng::seed_from_u64(3);
        let picks = NearMissNegativeSampler.sample(&example, &catalog, &index, 5, &mut rng);
        assert_eq!(picks.len(), 1, "only one product is eligible");
        assert_eq!(catalog[picks[0]].order_code(), "B-2");
    }

    #[test]
    fn test_sampler_fills_from_catalog_when_query_embeds_empty() {
        let catalog = test_catalog();
        let index = test_index(&catalog);
        // Tokens absent from the vocabulary embed to nothing.
        let example = example(1, "zzzzqqqq", "1SFL447101R1300", "Contactor AF140 100-250V");

        let mut rng = StdRng::seed_from_u64(19);
        let picks = NearMissNegativeSampler.sample(&example, &catalog, &index, 3, &mut rng);
        assert_eq!(picks.len(), 3, "fallback scan fills the quota");
    }

    // ── training boost ──────────────────────────────────────────────────

    #[test]
    fn test_boost_zero_below_threshold() {
        let stored = vec!["hydraulic pump".to_string()];
        assert_eq!(training_boost("circuit breaker", &stored, 0.7), 0.0);
    }

    #[test]
    fn test_boost_ramps_from_threshold_to_identical() {
        let stored = vec!["contactor 400a".to_string()];
        let at_match = training_boost("contactor 400a", &stored, 0.7);
        assert!((at_match - 0.8).abs() < 1e-9, "identical query boosts by 0.8");

        let near = training_boost("contactor 400", &stored, 0.7);
        assert!(near >= 0.3, "anything past the threshold boosts at least 0.3");
        assert!(near <= at_match);
    }

    #[test]
    fn test_boost_takes_best_stored_query() {
        let stored = vec!["hydraulic pump".to_string(), "contactor 400a".to_string()];
        let boost = training_boost("contactor 400a", &stored, 0.7);
        assert!((boost - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_boost_empty_store_is_zero() {
        assert_eq!(training_boost("anything", &[], 0.7), 0.0);
    }
}
