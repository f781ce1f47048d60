//! libSQL dataset layer — the output sink for extracted records.
//!
//! The [`Dataset`] wraps a local libSQL database holding the append-only
//! agency records plus run history. It is the only collaborator whose
//! failures abort a crawl: losing records defeats the point of the run,
//! while everything else degrades gracefully.

mod migrations;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use agencyscout_shared::{AgencyRecord, Result, ScoutError};

/// A row from the run-history table.
#[derive(Debug, Clone)]
pub struct RunRow {
    pub id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

struct Inner {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// Primary dataset handle wrapping a libSQL database. Cheap to clone.
#[derive(Clone)]
pub struct Dataset {
    inner: Arc<Inner>,
}

impl Dataset {
    /// Open or create a dataset at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ScoutError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ScoutError::Storage(e.to_string()))?;

        let dataset = Self {
            inner: Arc::new(Inner { db, conn }),
        };
        dataset.run_migrations().await?;
        Ok(dataset)
    }

    fn conn(&self) -> &Connection {
        &self.inner.conn
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn()
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ScoutError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn()
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Record operations
    // -----------------------------------------------------------------------

    /// Append a fully extracted agency record.
    pub async fn insert_record(&self, record: &AgencyRecord) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| ScoutError::Storage(format!("record serialization: {e}")))?;
        let id = Uuid::now_v7().to_string();

        self.conn()
            .execute(
                "INSERT INTO agencies (id, name, url, kind, record_json, category, location, fetched_at)
                 VALUES (?1, ?2, ?3, 'full', ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    record.name.as_str(),
                    record.url.as_str(),
                    json.as_str(),
                    record.category.as_deref(),
                    record.location_filter.as_deref(),
                    record.fetched_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Append a listing-level profile link without a detail extraction
    /// (detail collection disabled).
    pub async fn insert_listing_link(
        &self,
        url: &str,
        source: &str,
        category: Option<&str>,
        location: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let json = serde_json::json!({
            "url": url,
            "source": source,
            "category": category,
            "location_filter": location,
            "fetched_at": now.to_rfc3339(),
        })
        .to_string();
        let id = Uuid::now_v7().to_string();

        self.conn()
            .execute(
                "INSERT INTO agencies (id, name, url, kind, record_json, category, location, fetched_at)
                 VALUES (?1, NULL, ?2, 'link', ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    url,
                    json.as_str(),
                    category,
                    location,
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Total emitted rows (full records plus link rows).
    pub async fn record_count(&self) -> Result<u64> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM agencies", params![])
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|count| count.max(0) as u64)
                .map_err(|e| ScoutError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(ScoutError::Storage(e.to_string())),
        }
    }

    /// All record JSON payloads in insertion order, for export.
    pub async fn list_records(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT record_json FROM agencies ORDER BY rowid",
                params![],
            )
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| ScoutError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a crawl run. Returns the generated run ID.
    pub async fn start_run(&self) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO scrape_runs (id, started_at) VALUES (?1, ?2)",
                params![id.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Close out a run with its final counters.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE scrape_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Run history, newest first.
    pub async fn list_runs(&self) -> Result<Vec<RunRow>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, started_at, finished_at, stats_json
                 FROM scrape_runs ORDER BY started_at DESC",
                params![],
            )
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(RunRow {
                id: row
                    .get::<String>(0)
                    .map_err(|e| ScoutError::Storage(e.to_string()))?,
                started_at: row
                    .get::<String>(1)
                    .map_err(|e| ScoutError::Storage(e.to_string()))?,
                finished_at: row.get::<String>(2).ok(),
                stats_json: row.get::<String>(3).ok(),
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Create a temp-file dataset for testing.
    async fn test_dataset() -> Dataset {
        let tmp = std::env::temp_dir().join(format!("scout_test_{}.db", Uuid::now_v7()));
        Dataset::open(&tmp).await.expect("open test db")
    }

    fn sample_record(name: &str) -> AgencyRecord {
        AgencyRecord {
            name: name.into(),
            rating: Some(4.8),
            review_count: Some(12),
            verified: None,
            min_budget: None,
            hourly_rate: None,
            company_size: None,
            address: None,
            locations: vec![],
            services: vec!["SEO".into()],
            industries: vec![],
            awards: vec![],
            testimonials: vec![],
            description: None,
            website: None,
            phone: None,
            email: None,
            url: format!("https://clutch.co/profile/{}", name.to_lowercase()),
            source: "clutch.co".into(),
            fetched_at: Utc::now(),
            category: Some("advertising".into()),
            location_filter: None,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let dataset = test_dataset().await;
        assert_eq!(dataset.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("scout_test_{}.db", Uuid::now_v7()));
        let first = Dataset::open(&tmp).await.expect("first open");
        drop(first);
        let second = Dataset::open(&tmp).await.expect("second open");
        assert_eq!(second.schema_version().await, 1);
    }

    #[tokio::test]
    async fn records_roundtrip() {
        let dataset = test_dataset().await;
        dataset.insert_record(&sample_record("Acme")).await.unwrap();
        dataset.insert_record(&sample_record("Beta")).await.unwrap();

        assert_eq!(dataset.record_count().await.unwrap(), 2);

        let payloads = dataset.list_records().await.unwrap();
        assert_eq!(payloads.len(), 2);
        let parsed: AgencyRecord = serde_json::from_str(&payloads[0]).expect("valid JSON");
        assert_eq!(parsed.name, "Acme");
        assert_eq!(parsed.rating, Some(4.8));
    }

    #[tokio::test]
    async fn link_rows_count_toward_the_dataset() {
        let dataset = test_dataset().await;
        dataset
            .insert_listing_link(
                "https://clutch.co/profile/acme",
                "clutch.co",
                Some("advertising"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(dataset.record_count().await.unwrap(), 1);
        let payloads = dataset.list_records().await.unwrap();
        assert!(payloads[0].contains("/profile/acme"));
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let dataset = test_dataset().await;
        let run_id = dataset.start_run().await.expect("start run");
        dataset
            .finish_run(&run_id, r#"{"saved": 10, "blocked": 2}"#)
            .await
            .expect("finish run");

        let runs = dataset.list_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run_id);
        assert!(runs[0].finished_at.is_some());
        assert!(runs[0].stats_json.as_deref().unwrap_or("").contains("\"saved\": 10"));
    }
}
