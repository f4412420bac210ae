//! Edit-distance string similarity.
//!
//! Every function returns a score in [0, 1]: 1.0 for identical strings,
//! degrading proportionally to edit distance relative to string length
//! rather than through a hard cutoff. The ratio family mirrors the usual
//! fuzzy-matching toolbox: whole-string ratio, best-window partial ratio,
//! and the token_sort/token_set variants that make matching insensitive to
//! word order.
//!
//! Callers pass already-normalized text (see `normalize`); these functions
//! do not lowercase or strip anything themselves.

/// Damerau-Levenshtein edit distance (optimal string alignment).
/// Counts insertions, deletions, substitutions, and adjacent transpositions
/// each as 1 edit.
pub fn osa_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    osa_distance_chars(&a_chars, &b_chars)
}

fn osa_distance_chars(a_chars: &[char], b_chars: &[char]) -> usize {
    let m = a_chars.len();
    let n = b_chars.len();
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev2 = vec![0usize; n + 1];
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;

        for j in 1..=n {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);

            if i >= 2
                && j >= 2
                && a_chars[i - 1] == b_chars[j - 2]
                && a_chars[i - 2] == b_chars[j - 1]
            {
                curr[j] = curr[j].min(prev2[j - 2] + 1);
            }
        }

        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Whole-string similarity: 1 - distance / max(len). Both sides empty is a
/// perfect match; one side empty is no match at all.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    similarity_chars(&a_chars, &b_chars)
}

fn similarity_chars(a_chars: &[char], b_chars: &[char]) -> f64 {
    let longest = a_chars.len().max(b_chars.len());
    if longest == 0 {
        return 1.0;
    }
    let dist = osa_distance_chars(a_chars, b_chars);
    1.0 - dist as f64 / longest as f64
}

/// Best similarity of the shorter string against any equal-length window of
/// the longer one. This is the containment-friendly score: a query that
/// appears verbatim inside a long description gets 1.0. Argument order does
/// not matter; by convention the query is the needle side.
pub fn partial_ratio(needle: &str, hay: &str) -> f64 {
    let mut needle_chars: Vec<char> = needle.chars().collect();
    let mut hay_chars: Vec<char> = hay.chars().collect();
    if needle_chars.len() > hay_chars.len() {
        std::mem::swap(&mut needle_chars, &mut hay_chars);
    }

    if needle_chars.is_empty() {
        return if hay_chars.is_empty() { 1.0 } else { 0.0 };
    }

    let n = needle_chars.len();
    let mut best = 0.0f64;
    for start in 0..=(hay_chars.len() - n) {
        let window = &hay_chars[start..start + n];
        let score = similarity_chars(&needle_chars, window);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    best
}

/// Similarity of the two strings with their tokens sorted first, which makes
/// the comparison insensitive to word order: "4p 800a" vs "800a 4p" is 1.0.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    similarity(&sorted_tokens(a), &sorted_tokens(b))
}

/// Set-based similarity: compares the shared tokens against each side's
/// remainder and takes the best pairing. Forgiving when one side carries
/// extra words the other lacks.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    use std::collections::BTreeSet;

    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();

    let shared: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();

    let joined_shared = shared.join(" ");
    let joined_a = join_parts(&joined_shared, &only_a);
    let joined_b = join_parts(&joined_shared, &only_b);

    similarity(&joined_shared, &joined_a)
        .max(similarity(&joined_shared, &joined_b))
        .max(similarity(&joined_a, &joined_b))
}

/// The strongest signal across all four ratios. Used for matching a query
/// against stored training queries.
pub fn max_ratio(a: &str, b: &str) -> f64 {
    similarity(a, b)
        .max(partial_ratio(a, b))
        .max(token_sort_ratio(a, b))
        .max(token_set_ratio(a, b))
}

/// The ranking-time fuzzy score for a (query, candidate) pair: the best of
/// query-in-description containment, order-insensitive description match,
/// and query-in-order-code containment.
pub fn candidate_score(query: &str, description: &str, order_code: &str) -> f64 {
    partial_ratio(query, description)
        .max(token_sort_ratio(query, description))
        .max(partial_ratio(query, order_code))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join_parts(shared: &str, rest: &[&str]) -> String {
    if rest.is_empty() {
        return shared.to_string();
    }
    if shared.is_empty() {
        return rest.join(" ");
    }
    format!("{} {}", shared, rest.join(" "))
}
