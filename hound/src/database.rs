//! SQLite persistence for the product catalog and training corpus
//!
//! Two tables: `products` (the searchable catalog) and `training_examples`
//! (the append-only corpus the relevance model learns from). Uses r2d2
//! connection pooling so concurrent readers never block behind a mutex;
//! WAL mode keeps writers from blocking them either.

use crate::models::{NewTrainingExample, ProductRecord, TrainingExample};
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Thread-safe database wrapper using connection pooling
///
/// Training rows are append-only: nothing in this layer updates or deletes
/// them, so a retrain always sees every example ever accepted.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| {
                conn.execute_batch("
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                    PRAGMA mmap_size=67108864;
                    PRAGMA cache_size=-32000;
                ")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| {
                conn.execute_batch("
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                ")?;
                Ok(())
            });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Set up the database schema. Idempotent across restarts.
    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS products (
                order_code TEXT PRIMARY KEY,
                description TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS training_examples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_query TEXT NOT NULL,
                order_code TEXT NOT NULL,
                description TEXT NOT NULL,
                source_file TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_training_query ON training_examples(customer_query);
            CREATE INDEX IF NOT EXISTS idx_training_code ON training_examples(order_code);
            CREATE INDEX IF NOT EXISTS idx_training_query_code
                ON training_examples(customer_query, order_code);
        "#)?;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────

    /// Insert a batch of catalog products inside one transaction.
    ///
    /// With `skip_duplicates`, rows whose order code already exists are left
    /// untouched and not counted. Without it, a duplicate order code fails
    /// the whole batch. Returns the number of rows actually inserted.
    pub fn bulk_insert_products(
        &self,
        records: &[ProductRecord],
        skip_duplicates: bool,
    ) -> DatabaseResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let sql = if skip_duplicates {
            "INSERT OR IGNORE INTO products (order_code, description) VALUES (?1, ?2)"
        } else {
            "INSERT INTO products (order_code, description) VALUES (?1, ?2)"
        };

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(sql)?;
            for record in records {
                inserted += stmt.execute(params![record.order_code, record.description])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Load the full catalog in order-code order.
    ///
    /// The ordering makes document ids stable across rebuilds of the same
    /// catalog, which keeps index snapshots comparable in tests.
    pub fn load_catalog(&self) -> DatabaseResult<Vec<ProductRecord>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT order_code, description FROM products ORDER BY order_code")?;
        let records = stmt
            .query_map([], |row| {
                Ok(ProductRecord {
                    order_code: row.get(0)?,
                    description: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Total number of catalog products
    pub fn product_count(&self) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Training examples
    // ─────────────────────────────────────────────────────────────────────

    /// Append a validated training example. Returns the new row id.
    ///
    /// Callers are expected to run [`NewTrainingExample::validate`] first;
    /// this layer only persists.
    pub fn append_training(&self, example: &NewTrainingExample) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO training_examples (customer_query, order_code, description, source_file, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                example.customer_query,
                example.order_code,
                example.description,
                example.source_file,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Whether an identical (customer_query, order_code) pair is already stored.
    /// Served by the composite index, so it stays cheap as the corpus grows.
    pub fn has_training_pair(&self, customer_query: &str, order_code: &str) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM training_examples WHERE customer_query = ?1 AND order_code = ?2",
            params![customer_query, order_code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Load every training example in append order (for retraining)
    pub fn all_training(&self) -> DatabaseResult<Vec<TrainingExample>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, customer_query, order_code, description, source_file, created_at
             FROM training_examples ORDER BY id",
        )?;
        let examples = stmt
            .query_map([], Self::row_to_training)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(examples)
    }

    /// Total number of stored training examples
    pub fn training_count(&self) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM training_examples", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn row_to_training(row: &rusqlite::Row) -> rusqlite::Result<TrainingExample> {
        Ok(TrainingExample {
            id: row.get(0)?,
            customer_query: row.get(1)?,
            order_code: row.get(2)?,
            description: row.get(3)?,
            source_file: row.get(4)?,
            created_at_unix: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_products() -> Vec<ProductRecord> {
        vec![
            ProductRecord::new("1SFL447101R1300", "Contactor AF140-40-00-13 100-250V"),
            ProductRecord::new("2CDS253001R0204", "Circuit breaker S253 C20"),
            ProductRecord::new("3RT2026-1AL20", "Power contactor 25A 230V AC"),
        ]
    }

    #[test]
    fn test_bulk_insert_and_load_catalog() {
        let db = Database::open_in_memory().unwrap();
        let inserted = db.bulk_insert_products(&sample_products(), false).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(db.product_count().unwrap(), 3);

        let catalog = db.load_catalog().unwrap();
        assert_eq!(catalog.len(), 3);
        // Sorted by order code regardless of insertion order
        assert_eq!(catalog[0].order_code, "1SFL447101R1300");
        assert_eq!(catalog[2].order_code, "3RT2026-1AL20");
    }

    #[test]
    fn test_bulk_insert_duplicate_fails_without_skip() {
        let db = Database::open_in_memory().unwrap();
        db.bulk_insert_products(&sample_products(), false).unwrap();

        let dup = vec![ProductRecord::new("1SFL447101R1300", "Different text")];
        assert!(db.bulk_insert_products(&dup, false).is_err());
    }

    #[test]
    fn test_bulk_insert_skip_duplicates_counts_only_new() {
        let db = Database::open_in_memory().unwrap();
        db.bulk_insert_products(&sample_products(), false).unwrap();

        let batch = vec![
            ProductRecord::new("1SFL447101R1300", "Already there"),
            ProductRecord::new("NEW-CODE-1", "Brand new product"),
        ];
        let inserted = db.bulk_insert_products(&batch, true).unwrap();
        assert_eq!(inserted, 1, "only the unseen code should insert");
        assert_eq!(db.product_count().unwrap(), 4);

        // The existing row must keep its original description
        let catalog = db.load_catalog().unwrap();
        let first = catalog.iter().find(|p| p.order_code == "1SFL447101R1300").unwrap();
        assert_eq!(first.description, "Contactor AF140-40-00-13 100-250V");
    }

    #[test]
    fn test_append_training_assigns_increasing_ids() {
        let db = Database::open_in_memory().unwrap();

        let first = NewTrainingExample::new("contactor 400a", "1SFL447101R1300", "Contactor AF140");
        let second = NewTrainingExample::new("breaker c20", "2CDS253001R0204", "Circuit breaker");

        let id1 = db.append_training(&first).unwrap();
        let id2 = db.append_training(&second).unwrap();
        assert!(id2 > id1, "ids must grow in append order");
        assert_eq!(db.training_count().unwrap(), 2);
    }

    #[test]
    fn test_all_training_returns_append_order_with_fields() {
        let db = Database::open_in_memory().unwrap();

        let plain = NewTrainingExample::new("contactor 400a", "1SFL447101R1300", "Contactor AF140");
        let sourced = NewTrainingExample::new("breaker c20", "2CDS253001R0204", "Circuit breaker")
            .with_source_file("orders_2024.csv");
        db.append_training(&plain).unwrap();
        db.append_training(&sourced).unwrap();

        let rows = db.all_training().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].customer_query, "contactor 400a");
        assert_eq!(rows[0].source_file, None);
        assert_eq!(rows[1].source_file.as_deref(), Some("orders_2024.csv"));
        assert!(rows[0].created_at_unix > 0, "timestamp should be recorded");
        assert!(rows[0].id < rows[1].id);
    }

    #[test]
    fn test_has_training_pair_exact_match_only() {
        let db = Database::open_in_memory().unwrap();
        let example =
            NewTrainingExample::new("contactor 400a", "1SFL447101R1300", "Contactor AF140");
        db.append_training(&example).unwrap();

        assert!(db.has_training_pair("contactor 400a", "1SFL447101R1300").unwrap());
        assert!(!db.has_training_pair("contactor 400a", "OTHER-CODE").unwrap());
        assert!(!db.has_training_pair("Contactor 400A", "1SFL447101R1300").unwrap());
    }

    #[test]
    fn test_appending_same_pair_twice_is_allowed_at_this_layer() {
        // Dedup policy lives above the database; the table itself accepts
        // repeats so the corpus can reflect genuine repeated signals.
        let db = Database::open_in_memory().unwrap();
        let example =
            NewTrainingExample::new("contactor 400a", "1SFL447101R1300", "Contactor AF140");
        db.append_training(&example).unwrap();
        db.append_training(&example).unwrap();
        assert_eq!(db.training_count().unwrap(), 2);
    }

    #[test]
    fn test_training_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");

        {
            let db = Database::open(&path).unwrap();
            let example =
                NewTrainingExample::new("contactor 400a", "1SFL447101R1300", "Contactor AF140");
            db.append_training(&example).unwrap();
            db.bulk_insert_products(&sample_products(), false).unwrap();
        }

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.training_count().unwrap(), 1);
        assert_eq!(reopened.product_count().unwrap(), 3);
        let rows = reopened.all_training().unwrap();
        assert_eq!(rows[0].customer_query, "contactor 400a");
    }

    #[test]
    fn test_schema_setup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");
        let first = Database::open(&path).unwrap();
        drop(first);
        // Second open runs setup_schema against existing tables
        let second = Database::open(&path).unwrap();
        assert_eq!(second.product_count().unwrap(), 0);
    }
}
