//! Query pipeline: candidates, scores, ranking
//!
//! One search walks Received → Normalized → CandidatesGathered → Scored →
//! Ranked against an immutable snapshot; nothing here mutates shared state.
//! Exact matches (training-confirmed queries and literal substrings) are
//! gathered first and always outrank fuzzy candidates, which come from the
//! lexical index and are scored in parallel with cancellation support.

use crate::config::SearchConfig;
use crate::features;
use crate::fuzzy;
use crate::indexer::LexicalHit;
use crate::interface::SearchError;
use crate::model;
use crate::normalize::{normalize, Normalized};
use crate::store::Snapshot;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Callers may ask for fewer; they never get more than this per query.
pub(crate) const TOP_K_MAX: usize = 100;
pub(crate) const TOP_K_MIN: usize = 1;

/// Extra lexical candidates per requested result, so ranking has slack to
/// dedup and reorder before truncation.
const POOL_PER_RESULT: usize = 3;

/// Clamp a requested result count to the supported window.
pub(crate) fn clamp_top_k(requested: usize) -> usize {
    requested.clamp(TOP_K_MIN, TOP_K_MAX)
}

/// Which candidate sources and scorers a search consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchMode {
    /// Training-exact pass, catalog exacts, lexical pool, relevance model.
    Full,
    /// Catalog exacts and lexical pool only; probability stays null.
    CatalogOnly,
}

/// One ranked candidate, pre-wire-format.
#[derive(Debug, Clone)]
pub(crate) struct ScoredCandidate {
    pub(crate) order_code: String,
    pub(crate) description: String,
    pub(crate) exact: bool,
    pub(crate) probability: Option<f64>,
    pub(crate) tfidf: f64,
    pub(crate) fuzzy: f64,
    /// Fallback blend of tfidf and fuzzy; tie-breaker when probabilities tie.
    pub(crate) combined: f64,
    pub(crate) training_query: Option<String>,
}

/// Run the full pipeline against one snapshot.
///
/// Returns at most `clamp_top_k(top_k)` candidates, ranked. Fails with
/// `EmptyQuery` when nothing survives normalization and `Cancelled` when the
/// token fires mid-flight; there are no partial result sets.
pub(crate) fn run_search(
    snapshot: &Snapshot,
    raw_query: &str,
    top_k: usize,
    config: &SearchConfig,
    mode: SearchMode,
    token: &CancellationToken,
) -> Result<Vec<ScoredCandidate>, SearchError> {
    let normalized = normalize(raw_query);
    if normalized.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let top_k = clamp_top_k(top_k);
    let raw_lower = raw_query.trim().to_lowercase();

    #[cfg(feature = "perf-log")]
    let t0 = std::time::Instant::now();

    let mut results: Vec<ScoredCandidate> = Vec::new();
    let mut seen_codes: HashSet<String> = HashSet::new();

    // Training-exact pass: queries a customer has already confirmed. These
    // carry their stored description, so they hit even for codes that have
    // since left the catalog.
    if mode == SearchMode::Full {
        for hit in snapshot.training.exact_hits(normalized.text()) {
            if !seen_codes.insert(hit.order_code.clone()) {
                continue;
            }
            results.push(ScoredCandidate {
                order_code: hit.order_code.clone(),
                description: hit.description.clone(),
                exact: true,
                probability: Some(1.0),
                tfidf: 1.0,
                fuzzy: 1.0,
                combined: 1.0,
                training_query: Some(hit.customer_query.clone()),
            });
        }
    }

    // Catalog-exact pass: the raw query appears verbatim (case-insensitive)
    // in an order code or description.
    let exact_positions: Vec<usize> = (0..snapshot.catalog.len())
        .into_par_iter()
        .take_any_while(|_| !token.is_cancelled())
        .filter(|&i| snapshot.catalog[i].contains_raw(&raw_lower))
        .collect();
    let query_vector = snapshot.index.embed_query(&normalized);
    for i in exact_positions {
        let entry = &snapshot.catalog[i];
        if !seen_codes.insert(entry.order_code().to_string()) {
            continue;
        }
        results.push(ScoredCandidate {
            order_code: entry.order_code().to_string(),
            description: entry.description().to_string(),
            exact: true,
            probability: None,
            tfidf: snapshot.index.score_doc(&query_vector, i) as f64,
            fuzzy: 1.0,
            combined: 1.0,
            training_query: None,
        });
    }

    #[cfg(feature = "perf-log")]
    let t1 = std::time::Instant::now();

    // Lexical pool, scored in parallel. Schema drift between the extractor
    // and the loaded model aborts the whole request rather than shipping a
    // wrong probability.
    let pool = config.top_n_candidates.max(POOL_PER_RESULT * top_k);
    let hits = snapshot.index.top_n(&query_vector, pool);
    let scored: Vec<ScoredCandidate> = hits
        .into_par_iter()
        .take_any_while(|_| !token.is_cancelled())
        .filter(|hit| {
            let code = snapshot.catalog[hit.doc_id].order_code();
            !seen_codes.contains(code)
        })
        .map(|hit| score_lexical_candidate(snapshot, config, &normalized, &raw_lower, &hit, mode))
        .collect::<Result<Vec<_>, SearchError>>()?;
    results.extend(scored);

    if token.is_cancelled() {
        return Err(SearchError::Cancelled);
    }

    rank(&mut results);
    results.truncate(top_k);

    #[cfg(feature = "perf-log")]
    {
        let t2 = std::time::Instant::now();
        eprintln!(
            "[perf] search exact={:.1}ms lexical={:.1}ms results={}",
            (t1 - t0).as_secs_f64() * 1000.0,
            (t2 - t1).as_secs_f64() * 1000.0,
            results.len(),
        );
    }

    Ok(results)
}

/// Score one lexical-pool candidate: fuzzy ratios always, model probability
/// (plus training boost) only in full mode with a model loaded.
fn score_lexical_candidate(
    snapshot: &Snapshot,
    config: &SearchConfig,
    normalized: &Normalized,
    raw_lower: &str,
    hit: &LexicalHit,
    mode: SearchMode,
) -> Result<ScoredCandidate, SearchError> {
    let entry = &snapshot.catalog[hit.doc_id];
    let tfidf = hit.score as f64;
    let fuzzy_score = fuzzy::candidate_score(
        normalized.text(),
        entry.description_norm().text(),
        entry.code_norm().text(),
    );
    let combined =
        config.fallback_lexical_weight * tfidf + config.fallback_fuzzy_weight * fuzzy_score;

    let probability = match (&snapshot.model, mode) {
        (Some(model), SearchMode::Full) => {
            let vector = features::extract(normalized, raw_lower, entry, tfidf).to_vector();
            let base = model.score(&vector).map_err(SearchError::from)?;
            let boost = model::training_boost(
                normalized.text(),
                snapshot.training.queries_for_code(entry.order_code()),
                config.boost_threshold,
            );
            Some((base + boost).min(1.0))
        }
        _ => None,
    };

    Ok(ScoredCandidate {
        order_code: entry.order_code().to_string(),
        description: entry.description().to_string(),
        exact: false,
        probability,
        tfidf,
        fuzzy: fuzzy_score,
        combined,
        training_query: None,
    })
}

/// Rank in place: exacts first by ascending order code, then probability
/// descending, then the combined fallback score, and finally order code so
/// equal scores come back in a stable order.
fn rank(results: &mut [ScoredCandidate]) {
    results.sort_unstable_by(|a, b| match (a.exact, b.exact) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => a.order_code.cmp(&b.order_code),
        (false, false) => match (a.probability, b.probability) {
            (Some(pa), Some(pb)) => pb
                .total_cmp(&pa)
                .then_with(|| b.combined.total_cmp(&a.combined))
                .then_with(|| a.order_code.cmp(&b.order_code)),
            (None, None) => b
                .combined
                .total_cmp(&a.combined)
                .then_with(|| a.order_code.cmp(&b.order_code)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
        },
    });
}
