//! Feature extraction for (query, product) pairs
//!
//! Every candidate that reaches the relevance model is described by a
//! fixed-width vector of match signals. The layout is versioned so a model
//! trained against one schema refuses to score vectors from another.

use crate::candidate::CatalogEntry;
use crate::fuzzy;
use crate::normalize::Normalized;

/// Bumped whenever the feature layout changes. Persisted models remember the
/// version they were trained with and reject anything else.
pub const FEATURE_SCHEMA_VERSION: u32 = 2;

/// Width of every feature vector produced by [`extract`].
pub const FEATURE_DIM: usize = 12;

/// Match signals for a single (query, product) pair, in human-readable form.
///
/// The field order here mirrors the slot order in [`FeatureVector`]; keep the
/// two in sync when adding a signal (and bump [`FEATURE_SCHEMA_VERSION`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    /// Cosine similarity between the query and the product document.
    pub tfidf_cosine: f64,
    /// Full-string edit similarity against the description.
    pub description_ratio: f64,
    /// Best-window edit similarity against the description.
    pub description_partial: f64,
    /// Token-order-insensitive similarity against the description.
    pub description_token_sort: f64,
    /// Token-set similarity against the description.
    pub description_token_set: f64,
    /// Full-string edit similarity against the order code.
    pub code_ratio: f64,
    /// Best-window edit similarity against the order code.
    pub code_partial: f64,
    /// Query length relative to description length, capped at 1.0.
    pub length_ratio: f64,
    /// Share of description tokens that also appear in the query.
    pub description_coverage: f64,
    /// Share of query tokens that also appear in the description.
    pub query_overlap: f64,
    /// Share of order-code tokens that also appear in the query.
    pub code_overlap: f64,
    /// 1.0 when the raw query is a case-insensitive substring of the code or
    /// description, else 0.0.
    pub exact_substring: f64,
}

impl Features {
    /// Flatten into the fixed slot order the model consumes.
    pub fn to_vector(&self) -> FeatureVector {
        FeatureVector {
            schema_version: FEATURE_SCHEMA_VERSION,
            values: [
                self.tfidf_cosine,
                self.description_ratio,
                self.description_partial,
                self.description_token_sort,
                self.description_token_set,
                self.code_ratio,
                self.code_partial,
                self.length_ratio,
                self.description_coverage,
                self.query_overlap,
                self.code_overlap,
                self.exact_substring,
            ],
        }
    }
}

/// Fixed-width numeric form fed to the relevance model.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub schema_version: u32,
    pub values: [f64; FEATURE_DIM],
}

/// Compute all match signals for one candidate.
///
/// `raw_query_lower` is the untouched query lowercased (not normalized); the
/// exact-substring flag is about what the customer literally typed, so it must
/// not see punctuation stripping. `tfidf_cosine` comes from whichever index
/// snapshot the caller is scoring against.
pub fn extract(
    query: &Normalized,
    raw_query_lower: &str,
    entry: &CatalogEntry,
    tfidf_cosine: f64,
) -> Features {
    let desc = entry.description_norm();
    let code = entry.code_norm();

    let query_tokens = query.token_set();
    let desc_tokens = desc.token_set();
    let code_tokens = code.token_set();

    Features {
        tfidf_cosine,
        description_ratio: fuzzy::similarity(query.text(), desc.text()),
        description_partial: fuzzy::partial_ratio(query.text(), desc.text()),
        description_token_sort: fuzzy::token_sort_ratio(query.text(), desc.text()),
        description_token_set: fuzzy::token_set_ratio(query.text(), desc.text()),
        code_ratio: fuzzy::similarity(query.text(), code.text()),
        code_partial: fuzzy::partial_ratio(query.text(), code.text()),
        length_ratio: length_ratio(query.text(), desc.text()),
        description_coverage: overlap_share(&query_tokens, &desc_tokens, desc_tokens.len()),
        query_overlap: overlap_share(&query_tokens, &desc_tokens, query_tokens.len()),
        code_overlap: overlap_share(&query_tokens, &code_tokens, code_tokens.len()),
        exact_substring: if entry.contains_raw(raw_query_lower) {
            1.0
        } else {
            0.0
        },
    }
}

/// Character-length ratio of query to description, capped at 1.0 so the
/// signal stays bounded when queries run longer than descriptions.
fn length_ratio(query_text: &str, desc_text: &str) -> f64 {
    let desc_len = desc_text.chars().count();
    if desc_len == 0 {
        return 0.0;
    }
    let query_len = query_text.chars().count();
    (query_len as f64 / desc_len as f64).min(1.0)
}

/// |a ∩ b| divided by `denominator`, or 0.0 for an empty denominator.
fn overlap_share(
    a: &std::collections::HashSet<&str>,
    b: &std::collections::HashSet<&str>,
    denominator: usize,
) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f64 / denominator as f64
}
