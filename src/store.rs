//! Diagnosis record store and the transaction that brackets an import run.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use crate::model::{CodingSystemVersion, DiagnosisEntry, DiagnosisRecord};
use crate::time::now_ms;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored record {id} has unknown coding system version {version:?}")]
    UnknownVersion { id: String, version: String },
}

/// Lookup and write access to diagnosis records.
#[allow(async_fn_in_trait)]
pub trait DiagnosisStore {
    async fn find(
        &mut self,
        code: &str,
        version: CodingSystemVersion,
    ) -> Result<Option<DiagnosisRecord>, StoreError>;

    async fn create(
        &mut self,
        entry: &DiagnosisEntry,
        version: CodingSystemVersion,
    ) -> Result<DiagnosisRecord, StoreError>;

    /// Overwrite description and category and reactivate the record.
    async fn update(
        &mut self,
        existing: &DiagnosisRecord,
        entry: &DiagnosisEntry,
    ) -> Result<(), StoreError>;
}

/// Commit/rollback for the batch of writes made through a store.
#[allow(async_fn_in_trait)]
pub trait TransactionBoundary {
    async fn commit(self) -> Result<(), StoreError>;
    async fn rollback(self) -> Result<(), StoreError>;
}

/// SQLite-backed store whose writes all land in one open transaction.
pub struct SqliteDiagnosisStore {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteDiagnosisStore {
    pub async fn begin(pool: &SqlitePool) -> Result<Self, StoreError> {
        let tx = pool.begin().await?;
        tracing::info!(target: "icd10_import", event = "db_tx_begin");
        Ok(Self { tx })
    }
}

const SELECT_COLUMNS: &str =
    "id, code, description, category, icd_version, active, created_at, updated_at";

fn record_from_row(row: &SqliteRow) -> Result<DiagnosisRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let raw_version: String = row.try_get("icd_version")?;
    let coding_system_version =
        raw_version
            .parse()
            .map_err(|_| StoreError::UnknownVersion {
                id: id.clone(),
                version: raw_version.clone(),
            })?;
    Ok(DiagnosisRecord {
        id,
        code: row.try_get("code")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        coding_system_version,
        is_active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl DiagnosisStore for SqliteDiagnosisStore {
    async fn find(
        &mut self,
        code: &str,
        version: CodingSystemVersion,
    ) -> Result<Option<DiagnosisRecord>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM his_icd_diagnosis WHERE code = ? AND icd_version = ? LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(code)
            .bind(version.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn create(
        &mut self,
        entry: &DiagnosisEntry,
        version: CodingSystemVersion,
    ) -> Result<DiagnosisRecord, StoreError> {
        let now = now_ms();
        let record = DiagnosisRecord {
            id: uuid::Uuid::now_v7().to_string(),
            code: entry.code().to_string(),
            description: entry.description().to_string(),
            category: entry.category().to_string(),
            coding_system_version: version,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO his_icd_diagnosis \
             (id, code, description, category, icd_version, active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.code)
        .bind(&record.description)
        .bind(&record.category)
        .bind(version.as_str())
        .bind(record.is_active)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn update(
        &mut self,
        existing: &DiagnosisRecord,
        entry: &DiagnosisEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE his_icd_diagnosis \
             SET description = ?, category = ?, active = 1, updated_at = ? \
             WHERE id = ?",
        )
        .bind(entry.description())
        .bind(entry.category())
        .bind(now_ms())
        .bind(&existing.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

impl TransactionBoundary for SqliteDiagnosisStore {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        tracing::info!(target: "icd10_import", event = "db_tx_commit");
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        tracing::warn!(target: "icd10_import", event = "db_tx_rollback");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionStats {
    pub version: String,
    pub total: i64,
    pub active: i64,
}

/// Record counts per coding system version, ordered by version.
pub async fn stats(pool: &SqlitePool) -> Result<Vec<VersionStats>, StoreError> {
    let rows = sqlx::query(
        "SELECT icd_version, COUNT(*) AS total, COALESCE(SUM(active), 0) AS active \
         FROM his_icd_diagnosis GROUP BY icd_version ORDER BY icd_version",
    )
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|r| -> Result<VersionStats, StoreError> {
            Ok(VersionStats {
                version: r.try_get("icd_version")?,
                total: r.try_get("total")?,
                active: r.try_get("active")?,
            })
        })
        .collect()
}

/// Fetch a committed record outside any import transaction.
pub async fn get_record(
    pool: &SqlitePool,
    code: &str,
    version: CodingSystemVersion,
) -> Result<Option<DiagnosisRecord>, StoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM his_icd_diagnosis WHERE code = ? AND icd_version = ? LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(code)
        .bind(version.as_str())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}
