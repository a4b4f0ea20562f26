//! PostgreSQL + pgvector concept registry store.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use notegraph_core::{
    ConceptPage, ConceptRecord, ConceptStore, Error, NewConcept, Result, ScoredConcept,
    ScrollRequest, SearchOptions,
};

const RECORD_COLUMNS: &str = "id, concept, summary, link, usage_count, created_at, updated_at";

/// PostgreSQL implementation of [`ConceptStore`].
///
/// Similarity is cosine (`1 - (a <=> b)`) computed by pgvector. The table is
/// small (one row per distinct concept) so searches scan it without an ANN index.
#[derive(Clone)]
pub struct PgConceptStore {
    pool: Pool<Postgres>,
}

impl PgConceptStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create the pgvector extension and the `concept_registry` table if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS concept_registry (
                id UUID PRIMARY KEY,
                concept TEXT NOT NULL UNIQUE,
                summary TEXT NOT NULL DEFAULT '',
                link TEXT NOT NULL,
                usage_count BIGINT NOT NULL DEFAULT 1,
                concept_vector vector NOT NULL,
                summary_vector vector NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "concept_store",
            op = "ensure_schema",
            "Concept registry schema ready"
        );
        Ok(())
    }

    /// Number of registered concepts.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM concept_registry")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("n"))
    }
}

fn record_from_row(row: &PgRow) -> ConceptRecord {
    ConceptRecord {
        id: row.get("id"),
        concept: row.get("concept"),
        summary: row.get("summary"),
        link: row.get("link"),
        usage_count: row.get("usage_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn scored_from_row(row: &PgRow) -> ScoredConcept {
    let score: f64 = row.get("score");
    ScoredConcept {
        record: record_from_row(row),
        score: score as f32,
    }
}

#[async_trait]
impl ConceptStore for PgConceptStore {
    #[instrument(skip(self, concept), fields(subsystem = "db", component = "concept_store", op = "upsert_concept", concept = %concept.concept))]
    async fn upsert_concept(&self, concept: NewConcept) -> Result<ConceptRecord> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO concept_registry
                 (id, concept, summary, link, usage_count, concept_vector, summary_vector, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 1, $5, $6, $7, $7)
             ON CONFLICT (concept) DO UPDATE SET
                 summary = EXCLUDED.summary,
                 link = EXCLUDED.link,
                 concept_vector = EXCLUDED.concept_vector,
                 summary_vector = EXCLUDED.summary_vector,
                 updated_at = EXCLUDED.updated_at
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(&concept.concept)
        .bind(&concept.summary)
        .bind(&concept.link)
        .bind(Vector::from(concept.concept_vector))
        .bind(Vector::from(concept.summary_vector))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(record_from_row(&row))
    }

    async fn search_strict(
        &self,
        concept_vector: &[f32],
        opts: SearchOptions,
    ) -> Result<Vec<ScoredConcept>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS}, 1.0 - (concept_vector <=> $1::vector) AS score
             FROM concept_registry
             WHERE 1.0 - (concept_vector <=> $1::vector) >= $2
             ORDER BY concept_vector <=> $1::vector
             LIMIT $3"
        ))
        .bind(Vector::from(concept_vector.to_vec()))
        .bind(opts.threshold as f64)
        .bind(opts.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(hits = rows.len(), threshold = opts.threshold, "Strict search complete");
        Ok(rows.iter().map(scored_from_row).collect())
    }

    async fn search_loose(
        &self,
        concept_vector: &[f32],
        summary_vector: &[f32],
        opts: SearchOptions,
    ) -> Result<Vec<ScoredConcept>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM (
                 SELECT {RECORD_COLUMNS},
                        ((1.0 - (concept_vector <=> $1::vector))
                          + (1.0 - (summary_vector <=> $2::vector))) / 2.0 AS score
                 FROM concept_registry
             ) ranked
             WHERE score >= $3
             ORDER BY score DESC
             LIMIT $4"
        ))
        .bind(Vector::from(concept_vector.to_vec()))
        .bind(Vector::from(summary_vector.to_vec()))
        .bind(opts.threshold as f64)
        .bind(opts.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(hits = rows.len(), threshold = opts.threshold, "Loose search complete");
        Ok(rows.iter().map(scored_from_row).collect())
    }

    async fn scroll(&self, req: ScrollRequest) -> Result<ConceptPage> {
        // One extra row tells whether another page exists.
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM concept_registry
             ORDER BY concept
             LIMIT $1 OFFSET $2"
        ))
        .bind(req.limit as i64 + 1)
        .bind(req.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut records: Vec<ConceptRecord> = rows.iter().map(record_from_row).collect();
        let next_offset = if records.len() > req.limit {
            records.truncate(req.limit);
            Some(req.offset + req.limit)
        } else {
            None
        };
        Ok(ConceptPage {
            records,
            next_offset,
        })
    }

    async fn get_concept(&self, name: &str) -> Result<Option<ConceptRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM concept_registry WHERE concept = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn update_usage_with_vectors(
        &self,
        name: &str,
        concept_vector: Option<&[f32]>,
        summary_vector: &[f32],
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE concept_registry SET
                 usage_count = usage_count + 1,
                 concept_vector = COALESCE($2, concept_vector),
                 summary_vector = $3,
                 updated_at = now()
             WHERE concept = $1",
        )
        .bind(name)
        .bind(concept_vector.map(|v| Vector::from(v.to_vec())))
        .bind(Vector::from(summary_vector.to_vec()))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("concept '{}'", name)));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(true)
    }
}
