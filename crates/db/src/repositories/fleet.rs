use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use treadline_core::domain::fleet::{User, UserId, Vehicle, VehicleDraft, VehicleId};
use treadline_core::store::{FleetDirectory, StoreError};

use super::{decode_error, RepositoryError};
use crate::DbPool;

/// Users and vehicles. Users are provisioned by the identity provider and
/// only read here; vehicles are registered through the API.
#[derive(Clone)]
pub struct SqlFleetRepository {
    pool: DbPool,
}

impl SqlFleetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, azure_id, email, name, role FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn find_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, vehicle_number, make, model, year, tire_size, department, registered_by
             FROM vehicles WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_vehicle).transpose()
    }

    /// The `UNIQUE` constraint on `vehicle_number` decides duplicates, so two
    /// concurrent registrations of one number cannot both succeed.
    pub async fn insert_vehicle(
        &self,
        draft: &VehicleDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Option<VehicleId>, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO vehicles (
                vehicle_number, make, model, year, tire_size, department, registered_by, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.vehicle_number)
        .bind(&draft.make)
        .bind(&draft.model)
        .bind(draft.year)
        .bind(&draft.tire_size)
        .bind(&draft.department)
        .bind(draft.registered_by.map(|user| user.0))
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(Some(VehicleId(done.last_insert_rowid()))),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl FleetDirectory for SqlFleetRepository {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(SqlFleetRepository::find_user(self, id).await?)
    }

    async fn find_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        Ok(SqlFleetRepository::find_vehicle(self, id).await?)
    }

    async fn insert_vehicle(
        &self,
        draft: &VehicleDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Option<VehicleId>, StoreError> {
        Ok(SqlFleetRepository::insert_vehicle(self, draft, created_at).await?)
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(row.try_get("id").map_err(decode_error)?),
        azure_id: row.try_get("azure_id").map_err(decode_error)?,
        email: row.try_get("email").map_err(decode_error)?,
        name: row.try_get("name").map_err(decode_error)?,
        role: row.try_get("role").map_err(decode_error)?,
    })
}

fn row_to_vehicle(row: &SqliteRow) -> Result<Vehicle, RepositoryError> {
    let registered_by: Option<i64> = row.try_get("registered_by").map_err(decode_error)?;
    Ok(Vehicle {
        id: VehicleId(row.try_get("id").map_err(decode_error)?),
        vehicle_number: row.try_get("vehicle_number").map_err(decode_error)?,
        make: row.try_get("make").map_err(decode_error)?,
        model: row.try_get("model").map_err(decode_error)?,
        year: row.try_get("year").map_err(decode_error)?,
        tire_size: row.try_get("tire_size").map_err(decode_error)?,
        department: row.try_get("department").map_err(decode_error)?,
        registered_by: registered_by.map(UserId),
    })
}
