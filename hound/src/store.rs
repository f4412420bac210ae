//! SearchStore - main entry point for the product search engine.
//!
//! Architecture: immutable snapshots. A snapshot bundles the catalog, the
//! lexical index, the trained relevance model and a training-lookup sidecar,
//! all built from the same database read. Queries grab an `Arc` to the
//! current snapshot and run against it without locks; retrain builds a fresh
//! snapshot off to the side and swaps it in atomically, so in-flight searches
//! keep the generation they started on.
//!
//! Async Cancellation Architecture:
//! When a caller drops an in-flight search future, a DropGuard triggers a
//! CancellationToken. The blocking scoring threads check this token at key
//! checkpoints and can abort mid-flight.

use crate::candidate::CatalogEntry;
use crate::config::SearchConfig;
use crate::database::Database;
use crate::features;
use crate::indexer::{IndexParams, TfIdfIndex};
use crate::interface::{
    round3, AddTrainingResponse, HealthReport, HealthStatus, ProbabilityResponse,
    ProbabilityScore, RetrainReport, SearchError, SearchResponse, SearchResult, SearchStoreApi,
};
use crate::model::{self, NearMissNegativeSampler, RelevanceModel};
use crate::models::{NewTrainingExample, TrainingExample};
use crate::normalize::normalize;
use crate::search::{self, SearchMode};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Global fallback Tokio runtime for when async functions are called outside
/// any runtime context. Shared across all SearchStore instances and never
/// dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

static RAYON_INIT: Once = Once::new();

/// Initialize the global Rayon pool with core reservation
fn init_rayon() {
    RAYON_INIT.call_once(|| {
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        // Reserve 2 cores for Tokio to keep request handling responsive,
        // but use at least 1 thread.
        let rayon_threads = num_threads.saturating_sub(2).max(1);

        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(rayon_threads)
            .thread_name(|i| format!("hound-rayon-{}", i))
            .build_global();
    });
}

/// RAII guard that cancels a token when dropped.
/// Dropping an awaited search future drops this guard, which triggers the
/// cancellation token observed by the blocking scoring threads.
struct DropGuard {
    token: CancellationToken,
}

impl DropGuard {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Clears the retrain flag when its scope exits, panics included.
struct RetrainGuard(Arc<AtomicBool>);

impl Drop for RetrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────

/// One confirmed (query, product) pair, ready to serve as an exact hit.
/// Carries the stored description so the hit works even for order codes
/// that have since left the catalog.
pub(crate) struct TrainingHit {
    pub(crate) order_code: String,
    pub(crate) description: String,
    pub(crate) customer_query: String,
}

/// Training corpus reshaped for query-time lookups: exact-match hits keyed
/// by normalized query, and per-code normalized queries for the boost pass.
pub(crate) struct TrainingSidecar {
    by_query: HashMap<String, Vec<TrainingHit>>,
    by_code: HashMap<String, Vec<String>>,
    rows: u64,
}

impl TrainingSidecar {
    pub(crate) fn build(examples: &[TrainingExample]) -> Self {
        let mut by_query: HashMap<String, Vec<TrainingHit>> = HashMap::new();
        let mut by_code: HashMap<String, Vec<String>> = HashMap::new();

        for example in examples {
            let normalized = normalize(&example.customer_query);
            if normalized.is_empty() {
                continue;
            }
            by_query
                .entry(normalized.text().to_string())
                .or_default()
                .push(TrainingHit {
                    order_code: example.order_code.clone(),
                    description: example.description.clone(),
                    customer_query: example.customer_query.clone(),
                });
            by_code
                .entry(example.order_code.clone())
                .or_default()
                .push(normalized.text().to_string());
        }

        Self {
            by_query,
            by_code,
            rows: examples.len() as u64,
        }
    }

    /// Hits whose stored query normalizes to exactly this text.
    pub(crate) fn exact_hits(&self, normalized_query: &str) -> &[TrainingHit] {
        self.by_query
            .get(normalized_query)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Normalized stored queries confirmed against this order code.
    pub(crate) fn queries_for_code(&self, code: &str) -> &[String] {
        self.by_code.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Size of the corpus this sidecar was built from.
    pub(crate) fn example_count(&self) -> u64 {
        self.rows
    }
}

/// Everything one query needs, built from a single database read.
/// Document ids in `index` are positions in `catalog`.
pub(crate) struct Snapshot {
    pub(crate) generation: u64,
    pub(crate) catalog: Vec<CatalogEntry>,
    pub(crate) index: TfIdfIndex,
    pub(crate) model: Option<RelevanceModel>,
    pub(crate) training: TrainingSidecar,
}

/// Build a serving snapshot from the database.
///
/// A missing or untrainable model degrades to lexical-only serving with a
/// warning; a catalog the index cannot be built from is an error, because
/// the store cannot answer anything without it.
fn build_snapshot(
    db: &Database,
    config: &SearchConfig,
    generation: u64,
) -> Result<Snapshot, SearchError> {
    let records = db.load_catalog()?;
    let catalog: Vec<CatalogEntry> = records.into_iter().map(CatalogEntry::new).collect();
    let examples = db.all_training()?;

    let documents: Vec<(String, String)> = catalog
        .iter()
        .map(|entry| (entry.order_code().to_string(), entry.index_text()))
        .collect();
    // Confirmed pairs shape the vocabulary and document frequencies so the
    // index learns the words customers actually type.
    let extra_corpus: Vec<String> = examples
        .iter()
        .map(|example| format!("{} {}", example.customer_query, example.description))
        .collect();

    let params = IndexParams {
        max_vocabulary: config.max_vocabulary,
        use_bigrams: config.use_bigrams,
    };
    let index = TfIdfIndex::build(&documents, &extra_corpus, params).map_err(SearchError::from)?;

    let model = if examples.is_empty() {
        None
    } else {
        match RelevanceModel::train(&examples, &catalog, &index, &NearMissNegativeSampler, config) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(error = %e, "model training skipped, serving lexical-only");
                None
            }
        }
    };

    let training = TrainingSidecar::build(&examples);

    Ok(Snapshot {
        generation,
        catalog,
        index,
        model,
        training,
    })
}

/// Probability pass for an already-ranked set of codes. Mirrors the model
/// path of the search pipeline so both surfaces report the same numbers.
fn score_probabilities(
    snapshot: &Snapshot,
    config: &SearchConfig,
    raw_query: &str,
    order_codes: Vec<String>,
) -> Result<Vec<ProbabilityScore>, SearchError> {
    let normalized = normalize(raw_query);
    if normalized.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    let model = match snapshot.model.as_ref() {
        Some(model) => model,
        None => {
            tracing::warn!("no relevance model loaded, returning null probability scores");
            return Ok(order_codes
                .into_iter()
                .map(|order_code| ProbabilityScore {
                    order_code,
                    probability_score: None,
                })
                .collect());
        }
    };

    let raw_lower = raw_query.trim().to_lowercase();
    let query_vector = snapshot.index.embed_query(&normalized);

    let scores = order_codes
        .into_iter()
        .map(|order_code| {
            // Catalog rows are loaded sorted by order code.
            let position = snapshot
                .catalog
                .binary_search_by(|entry| entry.order_code().cmp(order_code.as_str()))
                .ok();
            let probability_score = position.and_then(|i| {
                let entry = &snapshot.catalog[i];
                let tfidf = snapshot.index.score_doc(&query_vector, i) as f64;
                let vector = features::extract(&normalized, &raw_lower, entry, tfidf).to_vector();
                let base = model.score(&vector).ok()?;
                let boost = model::training_boost(
                    normalized.text(),
                    snapshot.training.queries_for_code(&order_code),
                    config.boost_threshold,
                );
                Some(round3((base + boost).min(1.0)))
            });
            ProbabilityScore {
                order_code,
                probability_score,
            }
        })
        .collect();

    Ok(scores)
}

// ─────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────

/// Thread-safe product search store over SQLite.
///
/// Concurrency Model:
/// - Database uses an r2d2 connection pool (concurrent reads, no mutex blocking)
/// - Queries read an `Arc<Snapshot>` and never block each other or retrains
/// - Blocking work runs on tokio::spawn_blocking threads
/// - At most one retrain runs at a time; the flag is checked lock-free
/// - Uses the global FALLBACK_RUNTIME when called outside any runtime
pub struct SearchStore {
    db: Arc<Database>,
    snapshot: RwLock<Arc<Snapshot>>,
    retraining: Arc<AtomicBool>,
    config: SearchConfig,
}

impl SearchStore {
    /// Open the database at the given path and build the first serving
    /// snapshot. Fails when the catalog is empty or unreadable, since there
    /// is nothing the store could answer.
    pub fn new(db_path: impl AsRef<Path>, config: SearchConfig) -> Result<Self, SearchError> {
        let db = Database::open(db_path).map_err(SearchError::from)?;
        Self::from_database(db, config)
    }

    pub(crate) fn from_database(db: Database, config: SearchConfig) -> Result<Self, SearchError> {
        init_rayon();
        let db = Arc::new(db);
        let snapshot = build_snapshot(&db, &config, 1)?;
        tracing::info!(
            catalog = snapshot.catalog.len(),
            training = snapshot.training.example_count(),
            model = snapshot.model.is_some(),
            "search store ready"
        );
        Ok(Self {
            db,
            snapshot: RwLock::new(Arc::new(snapshot)),
            retraining: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// The snapshot currently serving queries.
    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Get a tokio runtime handle - current runtime if available, otherwise
    /// the global fallback
    fn runtime_handle(&self) -> tokio::runtime::Handle {
        tokio::runtime::Handle::try_current().unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
    }

    /// Shared body of `search` and `catalog_search`: spawn the pipeline on a
    /// blocking thread, wire up drop-cancellation, wrap the outcome in the
    /// response envelope.
    async fn run_query(&self, query: String, top_k: u32, mode: SearchMode) -> SearchResponse {
        let started = Instant::now();

        let token = CancellationToken::new();
        let _guard = DropGuard::new(token.clone());

        let runtime = self.runtime_handle();
        let snapshot = self.snapshot();
        let config = self.config.clone();
        let query_owned = query.clone();
        let token_clone = token.clone();

        let handle = runtime.spawn_blocking(move || {
            search::run_search(
                &snapshot,
                &query_owned,
                top_k as usize,
                &config,
                mode,
                &token_clone,
            )
        });

        let outcome = match handle.await {
            Ok(result) => result,
            Err(_join_error) => Err(SearchError::Cancelled),
        };

        let search_time = started.elapsed().as_secs_f64();
        match outcome {
            Ok(candidates) => {
                let results = candidates.iter().map(SearchResult::from_candidate).collect();
                SearchResponse::success(query, results, search_time)
            }
            Err(e) => {
                if !matches!(e, SearchError::EmptyQuery) {
                    tracing::warn!(error = %e, "search request failed");
                }
                SearchResponse::failure(query, search_time, &e)
            }
        }
    }

    async fn append_training(&self, example: NewTrainingExample) -> Result<(), SearchError> {
        if let Err(reason) = example.validate() {
            return Err(SearchError::DuplicateOrInvalid(reason));
        }

        let db = Arc::clone(&self.db);
        let dedupe = self.config.dedupe_training;
        let runtime = self.runtime_handle();

        let handle = runtime.spawn_blocking(move || {
            if dedupe && db.has_training_pair(&example.customer_query, &example.order_code)? {
                return Err(SearchError::DuplicateOrInvalid(
                    "this query is already recorded for this order code".to_string(),
                ));
            }
            db.append_training(&example)?;
            Ok(())
        });

        match handle.await {
            Ok(result) => result,
            Err(_join_error) => Err(SearchError::Cancelled),
        }
    }
}

#[async_trait::async_trait]
impl SearchStoreApi for SearchStore {
    // ─────────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────────

    async fn search(&self, query: String, top_k: u32) -> SearchResponse {
        self.run_query(query, top_k, SearchMode::Full).await
    }

    async fn catalog_search(&self, query: String, top_k: u32) -> SearchResponse {
        self.run_query(query, top_k, SearchMode::CatalogOnly).await
    }

    async fn probability_score(
        &self,
        query: String,
        order_codes: Vec<String>,
    ) -> ProbabilityResponse {
        let snapshot = self.snapshot();
        let config = self.config.clone();
        let runtime = self.runtime_handle();

        let handle = runtime
            .spawn_blocking(move || score_probabilities(&snapshot, &config, &query, order_codes));

        let outcome = match handle.await {
            Ok(result) => result,
            Err(_join_error) => Err(SearchError::Cancelled),
        };

        match outcome {
            Ok(scores) => ProbabilityResponse {
                success: true,
                scores,
                error: None,
            },
            Err(e) => ProbabilityResponse {
                success: false,
                scores: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Training Operations
    // ─────────────────────────────────────────────────────────────────────────────

    async fn add_training(
        &self,
        query: String,
        order_code: String,
        description: String,
    ) -> AddTrainingResponse {
        let example = NewTrainingExample::new(query, order_code, description);
        match self.append_training(example).await {
            Ok(()) => {
                if self.config.retrain_on_add {
                    // The append already succeeded; a failed or concurrent
                    // retrain only delays when the new pair starts serving.
                    if let Err(e) = self.retrain().await {
                        tracing::warn!(error = %e, "retrain after training append failed");
                    }
                }
                AddTrainingResponse {
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "training example rejected");
                AddTrainingResponse {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn retrain(&self) -> Result<RetrainReport, SearchError> {
        if self
            .retraining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SearchError::RetrainInProgress);
        }
        // Held until after the snapshot swap so generations stay serialized.
        let _flag = RetrainGuard(Arc::clone(&self.retraining));

        let next_generation = self.snapshot().generation + 1;
        tracing::info!(generation = next_generation, "retrain started");

        let db = Arc::clone(&self.db);
        let config = self.config.clone();
        let runtime = self.runtime_handle();
        let handle = runtime.spawn_blocking(move || build_snapshot(&db, &config, next_generation));

        let snapshot = match handle.await {
            Ok(result) => result?,
            Err(_join_error) => return Err(SearchError::Cancelled),
        };

        let report = RetrainReport {
            generation: snapshot.generation,
            training_examples: snapshot.training.example_count(),
            model_trained: snapshot.model.is_some(),
            holdout_r2: snapshot.model.as_ref().and_then(|m| m.report().holdout_r2),
        };

        *self.snapshot.write() = Arc::new(snapshot);

        tracing::info!(
            generation = report.generation,
            training_examples = report.training_examples,
            model_trained = report.model_trained,
            "retrain complete"
        );
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────────────

    fn health(&self) -> HealthReport {
        let snapshot = self.snapshot();
        match (self.db.product_count(), self.db.training_count()) {
            (Ok(catalog_size), Ok(training_examples)) => HealthReport {
                status: HealthStatus::Healthy,
                catalog_size,
                training_examples,
                model_loaded: snapshot.model.is_some(),
                generation: snapshot.generation,
            },
            (products, training) => {
                if let Err(e) = products.and(training) {
                    tracing::warn!(error = %e, "health check could not reach database");
                }
                HealthReport {
                    status: HealthStatus::Unhealthy,
                    catalog_size: 0,
                    training_examples: 0,
                    model_loaded: snapshot.model.is_some(),
                    generation: snapshot.generation,
                }
            }
        }
    }
}
