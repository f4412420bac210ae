//! TF-IDF lexical index over the product catalog.
//!
//! Built once per serving generation from the full corpus (catalog documents
//! plus accumulated training text, the latter contributing to vocabulary and
//! IDF only). Queries embed once and run a single accumulation pass over the
//! postings of the query's terms, so `top_n` stays well under 10ms against a
//! 32k-document catalog. A corpus change always means a full rebuild; nothing
//! is re-weighted per query.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use thiserror::Error;

use crate::normalize::{normalize, Normalized};

/// Common English words excluded from the vocabulary. Catalog descriptions
/// are terse part names, so the list mostly guards the training-query side
/// ("the contactor for the pump").
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "it", "in", "on", "of", "to", "and", "or", "for", "with", "this",
    "that", "be", "are", "was", "were", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "shall", "not", "no",
    "but", "if", "at", "by", "from", "as", "into", "about", "up", "out", "so", "its", "you",
    "your", "i", "my", "we", "our", "they", "them", "their", "he", "she", "his", "her",
];

/// Vocabulary terms shorter than this are dropped (single characters carry
/// no lexical signal; "4p" and "ac" survive).
const MIN_TERM_CHARS: usize = 2;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("cannot build an index over an empty corpus")]
    EmptyCorpus,
    #[error("corpus produced an empty vocabulary")]
    EmptyVocabulary,
}

pub type IndexerResult<T> = Result<T, IndexerError>;

/// Construction parameters. Defaults mirror the serving configuration.
#[derive(Debug, Clone, Copy)]
pub struct IndexParams {
    /// Cap on vocabulary size; the most frequent terms win, ties broken
    /// lexicographically so builds are reproducible.
    pub max_vocabulary: usize,
    /// Include adjacent-token bigrams ("circuit breaker") as terms.
    pub use_bigrams: bool,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            max_vocabulary: 1000,
            use_bigrams: true,
        }
    }
}

/// One scored catalog document out of `top_n`.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    /// Position of the document in the catalog slice the index was built from.
    pub doc_id: usize,
    pub score: f32,
}

/// A query embedded into the index's term space. Reusable across all the
/// documents scored for one request.
#[derive(Debug, Clone, Default)]
pub struct QueryVector {
    /// (term id, weight), sorted by term id, L2-normalized.
    terms: Vec<(u32, f32)>,
}

impl QueryVector {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Immutable TF-IDF index. Shared read-only between concurrent searches;
/// replaced wholesale on rebuild.
pub struct TfIdfIndex {
    /// term → term id (ids assigned in lexicographic term order)
    vocabulary: HashMap<String, u32>,
    /// smoothed IDF per term id
    idf: Vec<f32>,
    /// per-document sparse vectors, (term id, weight) sorted by term id,
    /// L2-normalized; position = doc_id
    doc_vectors: Vec<Vec<(u32, f32)>>,
    /// per-term postings, (doc_id, weight) sorted by doc_id
    postings: Vec<Vec<(u32, f32)>>,
    /// order code per doc_id, for deterministic tie-breaking
    codes: Vec<String>,
    params: IndexParams,
}

impl TfIdfIndex {
    /// Build the index from catalog documents plus corpus-only extra text.
    ///
    /// `documents` is one `(order_code, text)` per catalog record; the text
    /// is raw (description plus code) and is normalized here. `extra_corpus`
    /// rows shape the vocabulary and IDF but are not retrievable.
    pub fn build(
        documents: &[(String, String)],
        extra_corpus: &[String],
        params: IndexParams,
    ) -> IndexerResult<Self> {
        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        if documents.is_empty() {
            return Err(IndexerError::EmptyCorpus);
        }

        let doc_terms: Vec<Vec<String>> = documents
            .par_iter()
            .map(|(_, text)| extract_terms(&normalize(text), params.use_bigrams))
            .collect();
        let extra_terms: Vec<Vec<String>> = extra_corpus
            .par_iter()
            .map(|text| extract_terms(&normalize(text), params.use_bigrams))
            .collect();

        // Collection frequency ranks terms for the vocabulary cap; document
        // frequency feeds IDF.
        let mut total_count: HashMap<&str, u64> = HashMap::new();
        let mut doc_freq: HashMap<&str, u32> = HashMap::new();
        for terms in doc_terms.iter().chain(extra_terms.iter()) {
            let mut seen: HashSet<&str> = HashSet::new();
            for term in terms {
                *total_count.entry(term).or_insert(0) += 1;
                if seen.insert(term) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        if total_count.is_empty() {
            return Err(IndexerError::EmptyVocabulary);
        }

        let mut ranked: Vec<(&str, u64)> = total_count.iter().map(|(t, c)| (*t, *c)).collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(params.max_vocabulary);

        let mut selected: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        selected.sort_unstable();

        let vocabulary: HashMap<String, u32> = selected
            .iter()
            .enumerate()
            .map(|(id, term)| (term.to_string(), id as u32))
            .collect();

        // Smoothed IDF over the whole corpus, catalog and extra rows alike.
        let corpus_size = (doc_terms.len() + extra_terms.len()) as f32;
        let mut idf = vec![0.0f32; selected.len()];
        for term in &selected {
            let id = vocabulary[*term] as usize;
            let df = *doc_freq.get(*term).unwrap_or(&0) as f32;
            idf[id] = ((1.0 + corpus_size) / (1.0 + df)).ln() + 1.0;
        }

        let doc_vectors: Vec<Vec<(u32, f32)>> = doc_terms
            .par_iter()
            .map(|terms| embed_terms(terms, &vocabulary, &idf))
            .collect();

        let mut postings: Vec<Vec<(u32, f32)>> = vec![Vec::new(); selected.len()];
        for (doc_id, vector) in doc_vectors.iter().enumerate() {
            for &(term_id, weight) in vector {
                postings[term_id as usize].push((doc_id as u32, weight));
            }
        }

        let codes: Vec<String> = documents.iter().map(|(code, _)| code.clone()).collect();

        #[cfg(feature = "perf-log")]
        eprintln!(
            "[perf] index build={:.1}ms docs={} vocab={}",
            t0.elapsed().as_secs_f64() * 1000.0,
            documents.len(),
            selected.len(),
        );

        Ok(Self {
            vocabulary,
            idf,
            doc_vectors,
            postings,
            codes,
            params,
        })
    }

    /// Embed a normalized query into this index's term space. Terms outside
    /// the vocabulary vanish; a query of only unknown terms embeds empty.
    pub fn embed_query(&self, query: &Normalized) -> QueryVector {
        let terms = extract_terms(query, self.params.use_bigrams);
        QueryVector {
            terms: embed_terms(&terms, &self.vocabulary, &self.idf),
        }
    }

    /// Top `n` catalog documents by cosine similarity, sorted by descending
    /// score with ties broken by ascending order code.
    pub fn top_n(&self, query: &QueryVector, n: usize) -> Vec<LexicalHit> {
        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        if query.terms.is_empty() || n == 0 {
            return Vec::new();
        }

        let mut scores = vec![0.0f32; self.doc_vectors.len()];
        for &(term_id, query_weight) in &query.terms {
            for &(doc_id, doc_weight) in &self.postings[term_id as usize] {
                scores[doc_id as usize] += query_weight * doc_weight;
            }
        }

        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .map(|(doc_id, score)| LexicalHit { doc_id, score })
            .collect();

        hits.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| self.codes[a.doc_id].cmp(&self.codes[b.doc_id]))
        });
        hits.truncate(n);

        #[cfg(feature = "perf-log")]
        eprintln!(
            "[perf] top_n={:.1}ms terms={} hits={}",
            t0.elapsed().as_secs_f64() * 1000.0,
            query.terms.len(),
            hits.len(),
        );

        hits
    }

    /// Cosine similarity between an embedded query and one document.
    /// Both vectors are unit length, so this is a sparse dot product.
    pub fn score_doc(&self, query: &QueryVector, doc_id: usize) -> f32 {
        let Some(doc) = self.doc_vectors.get(doc_id) else {
            return 0.0;
        };
        sparse_dot(&query.terms, doc)
    }

    pub fn num_docs(&self) -> usize {
        self.doc_vectors.len()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    pub fn order_code(&self, doc_id: usize) -> Option<&str> {
        self.codes.get(doc_id).map(String::as_str)
    }
}

/// Unigrams (stop-worded, min length) plus optional adjacent bigrams from a
/// normalized token sequence.
fn extract_terms(text: &Normalized, use_bigrams: bool) -> Vec<String> {
    let kept: Vec<&str> = text
        .tokens()
        .iter()
        .map(String::as_str)
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS && !STOP_WORDS.contains(t))
        .collect();

    let mut terms: Vec<String> = kept.iter().map(|t| t.to_string()).collect();
    if use_bigrams {
        for pair in kept.windows(2) {
            terms.push(format!("{} {}", pair[0], pair[1]));
        }
    }
    terms
}

/// Term counts → tf·idf → L2 normalize. Output sorted by term id.
fn embed_terms(terms: &[String], vocabulary: &HashMap<String, u32>, idf: &[f32]) -> Vec<(u32, f32)> {
    let mut counts: HashMap<u32, f32> = HashMap::new();
    for term in terms {
        if let Some(&id) = vocabulary.get(term) {
            *counts.entry(id).or_insert(0.0) += 1.0;
        }
    }

    let mut vector: Vec<(u32, f32)> = counts
        .into_iter()
        .map(|(id, tf)| (id, tf * idf[id as usize]))
        .collect();
    vector.sort_unstable_by_key(|(id, _)| *id);

    let norm: f32 = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in &mut vector {
            *w /= norm;
        }
    }
    vector
}

fn sparse_dot(a: &[(u32, f32)], b: &[(u32, f32)]) -> f32 {
    let mut sum = 0.0f32;
    let mut i = 0;
    let mut j = 0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(code: &str, text: &str) -> (String, String) {
        (code.to_string(), format!("{} {}", text, code))
    }

    fn build(docs: &[(String, String)]) -> TfIdfIndex {
        TfIdfIndex::build(docs, &[], IndexParams::default()).unwrap()
    }

    fn top_codes(index: &TfIdfIndex, query: &str, n: usize) -> Vec<String> {
        let qv = index.embed_query(&normalize(query));
        index
            .top_n(&qv, n)
            .into_iter()
            .map(|h| index.order_code(h.doc_id).unwrap_or_default().to_string())
            .collect()
    }

    fn demo_docs() -> Vec<(String, String)> {
        vec![
            doc("1SFL447101R1300", "Contactor AF140-40-00-13 100-250V"),
            doc("1SDA054927R1", "Circuit breaker Tmax T5N 400 PR221DS"),
            doc("1SBL177001R1310", "Contactor A9-30-10 220-230V 50Hz"),
            doc("CA5-10", "Auxiliary contact block 1NO front mounted"),
            doc("2CDS251001R0104", "Miniature circuit breaker S201-C10"),
        ]
    }

    // ── build tests ──────────────────────────────────────────────

    #[test]
    fn test_build_rejects_empty_corpus() {
        let result = TfIdfIndex::build(&[], &[], IndexParams::default());
        assert!(matches!(result, Err(IndexerError::EmptyCorpus)));
    }

    #[test]
    fn test_build_rejects_contentless_corpus() {
        let docs = vec![("X1".to_string(), "! @ #".to_string())];
        let result = TfIdfIndex::build(&docs, &[], IndexParams::default());
        assert!(matches!(result, Err(IndexerError::EmptyVocabulary)));
    }

    #[test]
    fn test_build_counts_documents() {
        let index = build(&demo_docs());
        assert_eq!(index.num_docs(), 5);
        assert!(index.vocabulary_size() > 0);
    }

    #[test]
    fn test_vocabulary_cap_is_deterministic() {
        let docs = demo_docs();
        let params = IndexParams {
            max_vocabulary: 8,
            use_bigrams: false,
        };
        let a = TfIdfIndex::build(&docs, &[], params).unwrap();
        let b = TfIdfIndex::build(&docs, &[], params).unwrap();
        assert_eq!(a.vocabulary_size(), 8);
        assert_eq!(a.vocabulary, b.vocabulary, "identical builds must agree");
    }

    #[test]
    fn test_extra_corpus_shifts_idf_but_adds_no_docs() {
        let docs = demo_docs();
        let plain = build(&docs);
        let with_extra = TfIdfIndex::build(
            &docs,
            &vec!["contactor replacement".to_string(); 20],
            IndexParams::default(),
        )
        .unwrap();

        assert_eq!(with_extra.num_docs(), plain.num_docs());

        // "contactor" is now far more common across the corpus, so its IDF
        // must drop relative to the plain build.
        let id_plain = plain.vocabulary["contactor"] as usize;
        let id_extra = with_extra.vocabulary["contactor"] as usize;
        assert!(
            with_extra.idf[id_extra] < plain.idf[id_plain],
            "IDF should drop when the term floods the corpus"
        );
    }

    // ── top_n tests ──────────────────────────────────────────────

    #[test]
    fn test_top_n_finds_relevant_document() {
        let index = build(&demo_docs());
        let codes = top_codes(&index, "circuit breaker 400", 3);
        assert!(
            codes.contains(&"1SDA054927R1".to_string()),
            "expected the Tmax breaker in {:?}",
            codes
        );
    }

    #[test]
    fn test_top_n_sorted_non_increasing_with_code_tiebreak() {
        let index = build(&demo_docs());
        let qv = index.embed_query(&normalize("contactor"));
        let hits = index.top_n(&qv, 10);
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(
                pair[0].score >= pair[1].score,
                "scores must be non-increasing: {:?}",
                hits
            );
            if pair[0].score == pair[1].score {
                let a = index.order_code(pair[0].doc_id).unwrap();
                let b = index.order_code(pair[1].doc_id).unwrap();
                assert!(a < b, "equal scores must order by ascending code: {} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_top_n_equal_documents_order_by_code() {
        // Two identical descriptions, distinct codes: scores tie exactly.
        let docs = vec![
            doc("ZZZ-9", "surge arrester type 2"),
            doc("AAA-1", "surge arrester type 2"),
        ];
        // Strip the code from the indexed text so the vectors are identical.
        let docs: Vec<(String, String)> = docs
            .into_iter()
            .map(|(code, _)| (code, "surge arrester type 2".to_string()))
            .collect();
        let index = build(&docs);
        let codes = top_codes(&index, "surge arrester", 2);
        assert_eq!(codes, vec!["AAA-1".to_string(), "ZZZ-9".to_string()]);
    }

    #[test]
    fn test_top_n_truncates() {
        let index = build(&demo_docs());
        let qv = index.embed_query(&normalize("contactor breaker contact"));
        assert!(index.top_n(&qv, 2).len() <= 2);
    }

    #[test]
    fn test_unknown_terms_embed_empty() {
        let index = build(&demo_docs());
        let qv = index.embed_query(&normalize("zzzz qqqq"));
        assert!(qv.is_empty());
        assert!(index.top_n(&qv, 5).is_empty());
    }

    #[test]
    fn test_stop_words_do_not_match() {
        let index = build(&demo_docs());
        let qv = index.embed_query(&normalize("the and of"));
        assert!(qv.is_empty(), "stop words alone should embed to nothing");
    }

    // ── scoring tests ────────────────────────────────────────────

    #[test]
    fn test_score_doc_matches_top_n_scores() {
        let index = build(&demo_docs());
        let qv = index.embed_query(&normalize("contactor 100 250v"));
        for hit in index.top_n(&qv, 5) {
            let direct = index.score_doc(&qv, hit.doc_id);
            assert!(
                (direct - hit.score).abs() < 1e-6,
                "postings pass and direct dot must agree: {} vs {}",
                direct,
                hit.score
            );
        }
    }

    #[test]
    fn test_self_query_is_best_match() {
        let docs = demo_docs();
        let index = build(&docs);
        let codes = top_codes(&index, "Contactor AF140-40-00-13 100-250V", 1);
        assert_eq!(codes, vec!["1SFL447101R1300".to_string()]);
    }

    #[test]
    fn test_cosine_range() {
        let index = build(&demo_docs());
        let qv = index.embed_query(&normalize("contactor 230v"));
        for doc_id in 0..index.num_docs() {
            let score = index.score_doc(&qv, doc_id);
            assert!(
                (0.0..=1.0 + 1e-6).contains(&score),
                "cosine must stay in [0,1], got {}",
                score
            );
        }
    }

    #[test]
    fn test_score_doc_out_of_range_is_zero() {
        let index = build(&demo_docs());
        let qv = index.embed_query(&normalize("contactor"));
        assert_eq!(index.score_doc(&qv, 999), 0.0);
    }

    #[test]
    fn test_bigrams_reward_adjacency() {
        let docs = vec![
            doc("PAIRED-1", "circuit breaker compact"),
            doc("SPLIT-2", "breaker panel circuit protection module"),
        ];
        let index = build(&docs);
        let codes = top_codes(&index, "circuit breaker", 2);
        assert_eq!(
            codes.first().map(String::as_str),
            Some("PAIRED-1"),
            "adjacent phrase should outrank scattered tokens: {:?}",
            codes
        );
    }
}
