//! Wire contracts for the search service
//!
//! This file defines the JSON shapes consumed by the HTTP layer in front of
//! the engine. It acts as the source of truth for shared types: field names
//! here are the wire contract, and scores are rounded to three decimals at
//! this boundary so every surface reports the same numbers.

use crate::search::ScoredCandidate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// How a result matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Training-confirmed query or literal substring of code/description.
    Exact,
    /// Retrieved by the lexical index and scored fuzzily.
    Fuzzy,
}

/// Overall service condition reported by `health()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// One ranked product match.
///
/// `probability` and `training_query` serialize as explicit nulls when
/// absent; clients distinguish "no model" from "field missing".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub order_code: String,
    pub description: String,
    pub match_type: MatchType,
    pub probability: Option<f64>,
    pub tfidf_score: f64,
    pub fuzzy_score: f64,
    pub training_query: Option<String>,
}

impl SearchResult {
    /// Convert a pipeline candidate to its wire form, rounding scores.
    pub(crate) fn from_candidate(candidate: &ScoredCandidate) -> Self {
        Self {
            order_code: candidate.order_code.clone(),
            description: candidate.description.clone(),
            match_type: if candidate.exact {
                MatchType::Exact
            } else {
                MatchType::Fuzzy
            },
            probability: candidate.probability.map(round3),
            tfidf_score: round3(candidate.tfidf),
            fuzzy_score: round3(candidate.fuzzy),
            training_query: candidate.training_query.clone(),
        }
    }
}

/// Response envelope for `search` and `catalog_search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<SearchResult>,
    pub total_results: u64,
    /// Seconds spent serving this request, never negative.
    pub search_time: f64,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    pub(crate) fn success(query: String, results: Vec<SearchResult>, search_time: f64) -> Self {
        Self {
            success: true,
            total_results: results.len() as u64,
            results,
            search_time,
            query,
            error: None,
        }
    }

    pub(crate) fn failure(query: String, search_time: f64, error: &SearchError) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            total_results: 0,
            search_time,
            query,
            error: Some(error.to_string()),
        }
    }
}

/// Probability for one already-ranked order code. Null when the code is
/// unknown or the model could not score it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityScore {
    pub order_code: String,
    pub probability_score: Option<f64>,
}

/// Response envelope for `probability_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityResponse {
    pub success: bool,
    pub scores: Vec<ProbabilityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response envelope for `add_training`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddTrainingResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of an explicit retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    /// Snapshot generation now serving queries.
    pub generation: u64,
    /// Corpus size the rebuild saw.
    pub training_examples: u64,
    /// False when the store was empty and a model-less snapshot published.
    pub model_trained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdout_r2: Option<f64>,
}

/// Service condition snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub catalog_size: u64,
    pub training_examples: u64,
    pub model_loaded: bool,
    pub generation: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for search service operations
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query is empty after normalization")]
    EmptyQuery,
    #[error("feature schema mismatch: model expects v{expected}, got v{found}")]
    SchemaMismatch { expected: u32, found: u32 },
    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("no relevance model loaded")]
    ModelUnavailable,
    #[error("training example rejected: {0}")]
    DuplicateOrInvalid(String),
    #[error("a retrain is already running")]
    RetrainInProgress,
    #[error("database error: {0}")]
    Database(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl From<crate::database::DatabaseError> for SearchError {
    fn from(e: crate::database::DatabaseError) -> Self {
        SearchError::Database(e.to_string())
    }
}

impl From<crate::indexer::IndexerError> for SearchError {
    fn from(e: crate::indexer::IndexerError) -> Self {
        SearchError::IndexUnavailable(e.to_string())
    }
}

impl From<crate::model::ModelError> for SearchError {
    fn from(e: crate::model::ModelError) -> Self {
        match e {
            crate::model::ModelError::SchemaMismatch { expected, found } => {
                SearchError::SchemaMismatch { expected, found }
            }
            crate::model::ModelError::NoTrainingData => SearchError::ModelUnavailable,
        }
    }
}

/// Round a score for the wire. Sub-scores carry three decimals everywhere.
pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// The primary interface for the product search store.
/// This matches the functionality exposed by the `SearchStore` object.
#[async_trait::async_trait]
pub trait SearchStoreApi: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Hybrid search: training exacts, catalog exacts, lexical retrieval and
    /// the relevance model when one is loaded. Errors come back inside the
    /// envelope with `success: false`.
    async fn search(&self, query: String, top_k: u32) -> SearchResponse;

    /// Catalog-only search: no training pass, no model, probability null.
    async fn catalog_search(&self, query: String, top_k: u32) -> SearchResponse;

    /// Recompute model probabilities for an already-ranked set of codes.
    /// All-null scores (and a warning in the log) when no model is loaded.
    async fn probability_score(&self, query: String, order_codes: Vec<String>)
        -> ProbabilityResponse;

    // ─────────────────────────────────────────────────────────────────────────────
    // Training Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Append one confirmed (query, product) pair to the training store.
    async fn add_training(
        &self,
        query: String,
        order_code: String,
        description: String,
    ) -> AddTrainingResponse;

    /// Rebuild index and model from the full corpus and swap the serving
    /// snapshot. At most one retrain runs at a time.
    async fn retrain(&self) -> Result<RetrainReport, SearchError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────────────

    /// Current service condition; cheap enough for a load-balancer probe.
    fn health(&self) -> HealthReport;
}
