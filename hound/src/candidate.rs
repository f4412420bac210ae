//! Catalog entry with memoized derived state.
//!
//! Module isolation ensures no code outside this module can mutate the
//! wrapped record after construction, so the `OnceLock` caches can never go
//! stale. One entry is scored by several passes per query (substring check,
//! fuzzy ratios, feature extraction); each derived form is computed at most
//! once per snapshot lifetime, not per query.

use std::sync::OnceLock;

use crate::models::ProductRecord;
use crate::normalize::{normalize, Normalized};

/// A catalog product plus lazily computed lowercase and normalized forms.
#[derive(Debug)]
pub struct CatalogEntry {
    record: ProductRecord,
    description_lower: OnceLock<String>,
    code_lower: OnceLock<String>,
    description_norm: OnceLock<Normalized>,
    code_norm: OnceLock<Normalized>,
}

impl CatalogEntry {
    pub fn new(record: ProductRecord) -> Self {
        Self {
            record,
            description_lower: OnceLock::new(),
            code_lower: OnceLock::new(),
            description_norm: OnceLock::new(),
            code_norm: OnceLock::new(),
        }
    }

    pub fn record(&self) -> &ProductRecord {
        &self.record
    }

    pub fn order_code(&self) -> &str {
        &self.record.order_code
    }

    pub fn description(&self) -> &str {
        &self.record.description
    }

    pub fn description_lower(&self) -> &str {
        self.description_lower
            .get_or_init(|| self.record.description.to_lowercase())
    }

    pub fn code_lower(&self) -> &str {
        self.code_lower
            .get_or_init(|| self.record.order_code.to_lowercase())
    }

    pub fn description_norm(&self) -> &Normalized {
        self.description_norm
            .get_or_init(|| normalize(&self.record.description))
    }

    pub fn code_norm(&self) -> &Normalized {
        self.code_norm
            .get_or_init(|| normalize(&self.record.order_code))
    }

    /// The text this entry contributes to the lexical index build.
    pub fn index_text(&self) -> String {
        format!("{} {}", self.record.description, self.record.order_code)
    }

    /// Whether the entry's code or description contains `needle_lower` as a
    /// literal substring. The needle must already be lowercased.
    pub fn contains_raw(&self, needle_lower: &str) -> bool {
        !needle_lower.is_empty()
            && (self.code_lower().contains(needle_lower)
                || self.description_lower().contains(needle_lower))
    }
}
