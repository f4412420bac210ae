//! Core data models for the product-search engine
//!
//! Catalog rows and training examples as stored in the database. Wire-facing
//! response types live in `interface`.

// ─────────────────────────────────────────────────────────────────────────────
// CATALOG
// ─────────────────────────────────────────────────────────────────────────────

/// One catalog product. Immutable once loaded into a serving snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    /// Unique manufacturer order code, e.g. "1SFL447101R1300"
    pub order_code: String,
    pub description: String,
}

impl ProductRecord {
    pub fn new(order_code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            order_code: order_code.into(),
            description: description.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TRAINING EXAMPLES
// ─────────────────────────────────────────────────────────────────────────────

/// A confirmed (query -> product) pair as read back from the training store.
/// Append-only: corrections are new rows, never edits.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub id: i64,
    pub customer_query: String,
    pub order_code: String,
    pub description: String,
    pub source_file: Option<String>,
    pub created_at_unix: i64,
}

impl TrainingExample {
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.created_at_unix, 0).unwrap_or_default()
    }
}

/// A training example as submitted by a caller, before validation and insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrainingExample {
    pub customer_query: String,
    pub order_code: String,
    pub description: String,
    pub source_file: Option<String>,
}

/// Maximum stored query length, matching the training table's column width.
pub const MAX_QUERY_CHARS: u64 = 500;

/// Maximum order-code length.
pub const MAX_ORDER_CODE_CHARS: u64 = 100;

impl NewTrainingExample {
    pub fn new(
        customer_query: impl Into<String>,
        order_code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            customer_query: scrub_corrupted(&customer_query.into()),
            order_code: scrub_corrupted(&order_code.into()),
            description: scrub_corrupted(&description.into()),
            source_file: None,
        }
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    /// Check shape only. Order codes are NOT resolved against the catalog:
    /// an example may legitimately reference a code the current snapshot
    /// has not loaded yet.
    pub fn validate(&self) -> Result<(), String> {
        if crate::normalize::normalize(&self.customer_query).is_empty() {
            return Err("customer_query must contain at least one word".to_string());
        }
        if !validator::validate_length(&self.customer_query, Some(1), Some(MAX_QUERY_CHARS), None) {
            return Err(format!(
                "customer_query exceeds {} characters",
                MAX_QUERY_CHARS
            ));
        }
        if !validator::validate_length(&self.order_code, Some(1), Some(MAX_ORDER_CODE_CHARS), None)
        {
            return Err(format!(
                "order_code must be 1..={} characters",
                MAX_ORDER_CODE_CHARS
            ));
        }
        if !looks_like_order_code(&self.order_code) {
            return Err(format!(
                "order_code '{}' has an unexpected format",
                self.order_code
            ));
        }
        if self.description.trim().is_empty() {
            return Err("description must not be empty".to_string());
        }
        Ok(())
    }
}

/// Order codes are compact identifiers: ASCII alphanumerics plus `-._/`,
/// no whitespace, at least one alphanumeric character.
pub fn looks_like_order_code(code: &str) -> bool {
    let mut has_alnum = false;
    for c in code.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => has_alnum = true,
            '-' | '.' | '_' | '/' => {}
            _ => return false,
        }
    }
    has_alnum
}

/// Replace U+FFFD replacement characters that creep in through lossy catalog
/// exports with a plain dash.
pub fn scrub_corrupted(text: &str) -> String {
    if text.contains('\u{FFFD}') {
        text.replace('\u{FFFD}', "-")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_training_example_scrubs_corruption() {
        let example =
            NewTrainingExample::new("contactor\u{FFFD}400", "1SFL447101R1300", "Contactor AF140");
        assert_eq!(example.customer_query, "contactor-400");
        assert_eq!(example.order_code, "1SFL447101R1300");
    }

    #[test]
    fn test_validate_accepts_realistic_example() {
        let example = NewTrainingExample::new(
            "contactor 400A 3 pole",
            "1SFL447101R1300",
            "Contactor#AF140-40-00-13#100-250V",
        );
        assert!(example.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_query() {
        let example = NewTrainingExample::new("   ", "ABC123", "desc");
        assert!(example.validate().is_err(), "blank query should be rejected");

        let example = NewTrainingExample::new("!!! ???", "ABC123", "desc");
        assert!(
            example.validate().is_err(),
            "query that normalizes to nothing should be rejected"
        );
    }

    #[test]
    fn test_validate_rejects_bad_order_codes() {
        for code in ["", "with space", "tab\tcode", "émigré", "###"] {
            let example = NewTrainingExample::new("valid query", code, "desc");
            assert!(
                example.validate().is_err(),
                "code {:?} should be rejected",
                code
            );
        }
    }

    #[test]
    fn test_validate_accepts_punctuated_codes() {
        for code in ["1SFL447101R1300", "AF140-40-00-13", "3RT2.0/16", "a_b"] {
            let example = NewTrainingExample::new("valid query", code, "desc");
            assert!(example.validate().is_ok(), "code {:?} should pass", code);
        }
    }

    #[test]
    fn test_validate_rejects_oversized_fields() {
        let example = NewTrainingExample::new("q".repeat(501), "ABC123", "desc");
        assert!(
            example.validate().is_err(),
            "501-char query should be rejected"
        );

        let example = NewTrainingExample::new("query", "C".repeat(101), "desc");
        assert!(example.validate().is_err(), "101-char code should be rejected");
    }

    #[test]
    fn test_created_at_conversion() {
        let example = TrainingExample {
            id: 1,
            customer_query: "q".to_string(),
            order_code: "C1".to_string(),
            description: "d".to_string(),
            source_file: None,
            created_at_unix: 1_700_000_000,
        };
        assert_eq!(example.created_at().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_looks_like_order_code_requires_alnum() {
        assert!(!looks_like_order_code("---"));
        assert!(looks_like_order_code("A-1"));
    }
}
