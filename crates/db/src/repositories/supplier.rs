use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use treadline_core::domain::supplier::{Supplier, SupplierDraft, SupplierId};
use treadline_core::store::{StoreError, SupplierDirectory, WriteOutcome};

use super::{decode_error, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlSupplierRepository {
    pool: DbPool,
}

impl SqlSupplierRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: SupplierId) -> Result<Option<Supplier>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, phone, formspree_key FROM supplier WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_supplier).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Supplier>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, email, phone, formspree_key FROM supplier ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_supplier).collect()
    }

    pub async fn insert(&self, draft: &SupplierDraft) -> Result<SupplierId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO supplier (name, email, phone, formspree_key, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&draft.name)
        .bind(&draft.email)
        .bind(&draft.phone)
        .bind(&draft.endpoint_key)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(SupplierId(result.last_insert_rowid()))
    }

    pub async fn update(
        &self,
        id: SupplierId,
        draft: &SupplierDraft,
    ) -> Result<WriteOutcome, RepositoryError> {
        let result = sqlx::query(
            "UPDATE supplier SET name = ?, email = ?, phone = ?, formspree_key = ? WHERE id = ?",
        )
        .bind(&draft.name)
        .bind(&draft.email)
        .bind(&draft.phone)
        .bind(&draft.endpoint_key)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(written(result.rows_affected()))
    }

    /// Refuses to remove a supplier that a recorded order still names.
    pub async fn delete(&self, id: SupplierId) -> Result<WriteOutcome, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM supplier
             WHERE id = ?1
               AND NOT EXISTS (SELECT 1 FROM requests WHERE order_supplier_id = ?1)",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(written(result.rows_affected()))
    }
}

fn written(rows_affected: u64) -> WriteOutcome {
    if rows_affected == 1 {
        WriteOutcome::Applied
    } else {
        WriteOutcome::Conflict
    }
}

#[async_trait]
impl SupplierDirectory for SqlSupplierRepository {
    async fn find_supplier(&self, id: SupplierId) -> Result<Option<Supplier>, StoreError> {
        Ok(self.find_by_id(id).await?)
    }

    async fn list_suppliers(&self) -> Result<Vec<Supplier>, StoreError> {
        Ok(self.list().await?)
    }

    async fn insert_supplier(&self, draft: &SupplierDraft) -> Result<SupplierId, StoreError> {
        Ok(self.insert(draft).await?)
    }

    async fn update_supplier(
        &self,
        id: SupplierId,
        draft: &SupplierDraft,
    ) -> Result<WriteOutcome, StoreError> {
        Ok(self.update(id, draft).await?)
    }

    async fn delete_supplier(&self, id: SupplierId) -> Result<WriteOutcome, StoreError> {
        Ok(self.delete(id).await?)
    }
}

fn row_to_supplier(row: &SqliteRow) -> Result<Supplier, RepositoryError> {
    Ok(Supplier {
        id: SupplierId(row.try_get("id").map_err(decode_error)?),
        name: row.try_get("name").map_err(decode_error)?,
        email: row.try_get("email").map_err(decode_error)?,
        phone: row.try_get("phone").map_err(decode_error)?,
        endpoint_key: row.try_get("formspree_key").map_err(decode_error)?,
    })
}
