use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use treadline_core::domain::fleet::{UserId, VehicleId};
use treadline_core::domain::request::{
    OdometerReadings, OrderRecord, OrderStatus, RequestId, RequestImage, RequestStatus,
    RequesterContact, StageNotes, TireRequest, TireSpecification, VehicleSnapshot,
};
use treadline_core::domain::supplier::SupplierId;
use treadline_core::intake::ValidatedSubmission;
use treadline_core::store::{OrderCommit, RequestStore, StoreError, TransitionWrite, WriteOutcome};

use super::{decode_error, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, user_id, vehicle_id, vehicle_number, quantity, tubes_quantity,
    tire_size, request_reason, requester_name, requester_email, requester_phone, year,
    vehicle_brand, vehicle_model, user_section, last_replacement_date, existing_tire_make,
    tire_size_required, cost_center, present_km_reading, previous_km_reading, tire_wear_pattern,
    comments, status, supervisor_notes, technical_manager_note, engineer_note, order_status,
    order_timestamp, order_supplier_id, order_notes, submitted_at, updated_at";

/// Requests table access. Every workflow write is a single `UPDATE` whose
/// `WHERE` clause carries the expected prior state, so competing writers are
/// serialized by SQLite and losers observe zero affected rows.
#[derive(Clone)]
pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: RequestId) -> Result<Option<TireRequest>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    pub async fn images_for(&self, id: RequestId) -> Result<Vec<RequestImage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, image_path, image_index
             FROM request_images
             WHERE request_id = ?
             ORDER BY image_index ASC, id ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_image).collect()
    }

    pub async fn insert(
        &self,
        submission: &ValidatedSubmission,
        submitted_at: DateTime<Utc>,
    ) -> Result<RequestId, RepositoryError> {
        let timestamp = submitted_at.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO requests (
                user_id, vehicle_id, vehicle_number, quantity, tubes_quantity, tire_size,
                request_reason, requester_name, requester_email, requester_phone, year,
                vehicle_brand, vehicle_model, user_section, last_replacement_date,
                existing_tire_make, tire_size_required, cost_center, present_km_reading,
                previous_km_reading, tire_wear_pattern, comments, status, order_status,
                submitted_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                       'pending', 'pending', ?, ?)",
        )
        .bind(submission.user_id.0)
        .bind(submission.vehicle_id.0)
        .bind(&submission.vehicle.vehicle_number)
        .bind(i64::from(submission.tires.quantity))
        .bind(i64::from(submission.tires.tubes_quantity))
        .bind(&submission.tires.tire_size)
        .bind(&submission.request_reason)
        .bind(&submission.requester.name)
        .bind(&submission.requester.email)
        .bind(&submission.requester.phone)
        .bind(submission.vehicle.year)
        .bind(&submission.vehicle.brand)
        .bind(&submission.vehicle.model)
        .bind(&submission.requester.section)
        .bind(submission.odometer.last_replacement_date.format("%Y-%m-%d").to_string())
        .bind(&submission.tires.existing_tire_make)
        .bind(&submission.tires.tire_size_required)
        .bind(&submission.requester.cost_center)
        .bind(submission.odometer.present_km)
        .bind(submission.odometer.previous_km)
        .bind(&submission.tires.tire_wear_pattern)
        .bind(&submission.comments)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await?;

        let request_id = result.last_insert_rowid();
        for image in &submission.images {
            sqlx::query(
                "INSERT INTO request_images (request_id, image_path, image_index, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(request_id)
            .bind(&image.image_path)
            .bind(i64::from(image.image_index))
            .bind(&timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(RequestId(request_id))
    }

    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<TireRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests
             WHERE user_id = ?
             ORDER BY submitted_at DESC, id DESC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    pub async fn latest_for_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<TireRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests
             WHERE vehicle_id = ?
             ORDER BY last_replacement_date DESC, id DESC
             LIMIT 1"
        ))
        .bind(vehicle_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    /// Requests whose order reservation was never committed or released.
    pub async fn count_stuck_reservations(&self) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM requests WHERE order_status = 'dispatching'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn transition(&self, write: &TransitionWrite) -> Result<WriteOutcome, RepositoryError> {
        let updated_at = write.updated_at.to_rfc3339();
        let result = match &write.note {
            Some((field, text)) => {
                let sql = format!(
                    "UPDATE requests SET status = ?, {column} = ?, updated_at = ?
                     WHERE id = ? AND status = ? AND order_status = 'pending'",
                    column = field.column()
                );
                sqlx::query(&sql)
                    .bind(write.status.as_str())
                    .bind(text)
                    .bind(&updated_at)
                    .bind(write.request_id.0)
                    .bind(write.expected_status.as_str())
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(
                    "UPDATE requests SET status = ?, updated_at = ?
                     WHERE id = ? AND status = ? AND order_status = 'pending'",
                )
                .bind(write.status.as_str())
                .bind(&updated_at)
                .bind(write.request_id.0)
                .bind(write.expected_status.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        Ok(outcome(result.rows_affected()))
    }

    async fn reserve(&self, id: RequestId) -> Result<WriteOutcome, RepositoryError> {
        let result = sqlx::query(
            "UPDATE requests SET order_status = 'dispatching', updated_at = ?
             WHERE id = ? AND status = 'complete' AND order_status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(outcome(result.rows_affected()))
    }

    async fn commit(&self, commit: &OrderCommit) -> Result<WriteOutcome, RepositoryError> {
        let placed_at = commit.placed_at.to_rfc3339();
        let result = sqlx::query(
            "UPDATE requests
             SET order_status = 'placed', status = 'order placed', order_timestamp = ?,
                 order_supplier_id = ?, order_notes = ?, updated_at = ?
             WHERE id = ? AND order_status = 'dispatching'",
        )
        .bind(&placed_at)
        .bind(commit.supplier_id.0)
        .bind(&commit.notes)
        .bind(&placed_at)
        .bind(commit.request_id.0)
        .execute(&self.pool)
        .await?;

        Ok(outcome(result.rows_affected()))
    }

    async fn release(&self, id: RequestId) -> Result<WriteOutcome, RepositoryError> {
        let result = sqlx::query(
            "UPDATE requests SET order_status = 'pending'
             WHERE id = ? AND order_status = 'dispatching'",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(outcome(result.rows_affected()))
    }
}

fn outcome(rows_affected: u64) -> WriteOutcome {
    if rows_affected == 1 {
        WriteOutcome::Applied
    } else {
        WriteOutcome::Conflict
    }
}

#[async_trait]
impl RequestStore for SqlRequestRepository {
    async fn find_request(&self, id: RequestId) -> Result<Option<TireRequest>, StoreError> {
        Ok(self.find_by_id(id).await?)
    }

    async fn list_images(&self, id: RequestId) -> Result<Vec<RequestImage>, StoreError> {
        Ok(self.images_for(id).await?)
    }

    async fn list_requests_by_user(&self, user_id: UserId) -> Result<Vec<TireRequest>, StoreError> {
        Ok(self.list_by_user(user_id).await?)
    }

    async fn latest_request_for_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<TireRequest>, StoreError> {
        Ok(self.latest_for_vehicle(vehicle_id).await?)
    }

    async fn insert_request(
        &self,
        submission: &ValidatedSubmission,
        submitted_at: DateTime<Utc>,
    ) -> Result<RequestId, StoreError> {
        Ok(self.insert(submission, submitted_at).await?)
    }

    async fn apply_transition(&self, write: &TransitionWrite) -> Result<WriteOutcome, StoreError> {
        Ok(self.transition(write).await?)
    }

    async fn reserve_order(&self, id: RequestId) -> Result<WriteOutcome, StoreError> {
        Ok(self.reserve(id).await?)
    }

    async fn commit_order(&self, commit: &OrderCommit) -> Result<WriteOutcome, StoreError> {
        Ok(self.commit(commit).await?)
    }

    async fn release_order(&self, id: RequestId) -> Result<WriteOutcome, StoreError> {
        Ok(self.release(id).await?)
    }
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn to_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column}: {value} out of range")))
}

fn row_to_request(row: &SqliteRow) -> Result<TireRequest, RepositoryError> {
    let status_str: String = row.try_get("status").map_err(decode_error)?;
    let status = RequestStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_str}`")))?;
    let order_status_str: String = row.try_get("order_status").map_err(decode_error)?;
    let order_status = OrderStatus::parse(&order_status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown order status `{order_status_str}`"))
    })?;

    let last_replacement_str: String =
        row.try_get("last_replacement_date").map_err(decode_error)?;
    let last_replacement_date = NaiveDate::parse_from_str(&last_replacement_str, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("last_replacement_date: {e}")))?;

    let order_timestamp: Option<String> = row.try_get("order_timestamp").map_err(decode_error)?;
    let placed_at =
        order_timestamp.as_deref().map(|raw| parse_timestamp("order_timestamp", raw)).transpose()?;
    let order_supplier_id: Option<i64> =
        row.try_get("order_supplier_id").map_err(decode_error)?;

    let submitted_at_str: String = row.try_get("submitted_at").map_err(decode_error)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode_error)?;

    Ok(TireRequest {
        id: RequestId(row.try_get("id").map_err(decode_error)?),
        user_id: UserId(row.try_get("user_id").map_err(decode_error)?),
        vehicle_id: VehicleId(row.try_get("vehicle_id").map_err(decode_error)?),
        requester: RequesterContact {
            name: row.try_get("requester_name").map_err(decode_error)?,
            email: row.try_get("requester_email").map_err(decode_error)?,
            phone: row.try_get("requester_phone").map_err(decode_error)?,
            section: row.try_get("user_section").map_err(decode_error)?,
            cost_center: row.try_get("cost_center").map_err(decode_error)?,
        },
        vehicle: VehicleSnapshot {
            vehicle_number: row.try_get("vehicle_number").map_err(decode_error)?,
            brand: row.try_get("vehicle_brand").map_err(decode_error)?,
            model: row.try_get("vehicle_model").map_err(decode_error)?,
            year: row.try_get("year").map_err(decode_error)?,
        },
        tires: TireSpecification {
            tire_size: row.try_get("tire_size").map_err(decode_error)?,
            tire_size_required: row.try_get("tire_size_required").map_err(decode_error)?,
            quantity: to_u32("quantity", row.try_get("quantity").map_err(decode_error)?)?,
            tubes_quantity: to_u32(
                "tubes_quantity",
                row.try_get("tubes_quantity").map_err(decode_error)?,
            )?,
            existing_tire_make: row.try_get("existing_tire_make").map_err(decode_error)?,
            tire_wear_pattern: row.try_get("tire_wear_pattern").map_err(decode_error)?,
        },
        odometer: OdometerReadings {
            present_km: row.try_get("present_km_reading").map_err(decode_error)?,
            previous_km: row.try_get("previous_km_reading").map_err(decode_error)?,
            last_replacement_date,
        },
        request_reason: row.try_get("request_reason").map_err(decode_error)?,
        comments: row.try_get("comments").map_err(decode_error)?,
        status,
        notes: StageNotes {
            supervisor: row.try_get("supervisor_notes").map_err(decode_error)?,
            technical_manager: row.try_get("technical_manager_note").map_err(decode_error)?,
            engineer: row.try_get("engineer_note").map_err(decode_error)?,
        },
        order: OrderRecord {
            status: order_status,
            placed_at,
            supplier_id: order_supplier_id.map(SupplierId),
            notes: row.try_get("order_notes").map_err(decode_error)?,
        },
        submitted_at: parse_timestamp("submitted_at", &submitted_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
    })
}

fn row_to_image(row: &SqliteRow) -> Result<RequestImage, RepositoryError> {
    let image_index: i64 = row.try_get("image_index").map_err(decode_error)?;
    Ok(RequestImage {
        request_id: RequestId(row.try_get("request_id").map_err(decode_error)?),
        image_path: row.try_get("image_path").map_err(decode_error)?,
        image_index: to_u32("image_index", image_index)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use treadline_core::domain::fleet::{UserId, VehicleId};
    use treadline_core::domain::request::{
        NoteField, OdometerReadings, OrderStatus, RequestId, RequestStatus, RequesterContact,
        TireSpecification, VehicleSnapshot,
    };
    use treadline_core::domain::supplier::SupplierId;
    use treadline_core::intake::{ImageReference, ValidatedSubmission};
    use treadline_core::store::{OrderCommit, RequestStore, TransitionWrite, WriteOutcome};

    use super::SqlRequestRepository;
    use crate::{connect_with_settings, migrations, DbPool, FleetSeedDataset};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        FleetSeedDataset::load(&pool).await.expect("seed");
        pool
    }

    fn submission(images: Vec<ImageReference>) -> ValidatedSubmission {
        ValidatedSubmission {
            user_id: UserId(1),
            vehicle_id: VehicleId(2),
            requester: RequesterContact {
                name: "Nimal Perera".to_string(),
                email: "nimal@fleet.example".to_string(),
                phone: "+94 77 123 4567".to_string(),
                section: "Logistics".to_string(),
                cost_center: "CC-410".to_string(),
            },
            vehicle: VehicleSnapshot {
                vehicle_number: "WP-LH-7730".to_string(),
                brand: "Isuzu".to_string(),
                model: "Elf".to_string(),
                year: 2016,
            },
            tires: TireSpecification {
                tire_size: "7.00R16".to_string(),
                tire_size_required: "7.00R16".to_string(),
                quantity: 2,
                tubes_quantity: 2,
                existing_tire_make: "MRF".to_string(),
                tire_wear_pattern: "Inner edge".to_string(),
            },
            odometer: OdometerReadings {
                present_km: 160_000,
                previous_km: 152_300,
                last_replacement_date: NaiveDate::from_ymd_opt(2024, 3, 9).expect("date"),
            },
            request_reason: "Cut on front tire".to_string(),
            comments: None,
            images,
        }
    }

    #[tokio::test]
    async fn inserted_request_starts_pending_with_ordered_images() {
        let pool = seeded_pool().await;
        let repo = SqlRequestRepository::new(pool);

        let id = repo
            .insert_request(
                &submission(vec![
                    ImageReference { image_path: "uploads/b.jpg".to_string(), image_index: 2 },
                    ImageReference { image_path: "uploads/a.jpg".to_string(), image_index: 0 },
                ]),
                Utc::now(),
            )
            .await
            .expect("insert");

        let request = repo.find_request(id).await.expect("find").expect("exists");
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.order.status, OrderStatus::Pending);
        assert!(!request.order_placed());
        assert_eq!(request.tires.tubes_quantity, 2);

        let images = repo.list_images(id).await.expect("images");
        let paths: Vec<_> = images.iter().map(|image| image.image_path.as_str()).collect();
        assert_eq!(paths, vec!["uploads/a.jpg", "uploads/b.jpg"]);
    }

    #[tokio::test]
    async fn transition_write_is_guarded_on_expected_status() {
        let pool = seeded_pool().await;
        let repo = SqlRequestRepository::new(pool);

        let write = TransitionWrite {
            request_id: RequestId(1),
            expected_status: RequestStatus::Pending,
            status: RequestStatus::SupervisorApproved,
            note: Some((NoteField::Supervisor, "looks right".to_string())),
            updated_at: Utc::now(),
        };
        assert_eq!(repo.apply_transition(&write).await.expect("first"), WriteOutcome::Applied);
        assert_eq!(repo.apply_transition(&write).await.expect("second"), WriteOutcome::Conflict);

        let request = repo.find_request(RequestId(1)).await.expect("find").expect("exists");
        assert_eq!(request.status, RequestStatus::SupervisorApproved);
        assert_eq!(request.notes.supervisor.as_deref(), Some("looks right"));
        assert_eq!(request.notes.engineer, None);
    }

    #[tokio::test]
    async fn reserve_commit_sequence_records_the_order() {
        let pool = seeded_pool().await;
        let repo = SqlRequestRepository::new(pool);

        assert_eq!(repo.reserve_order(RequestId(2)).await.expect("reserve"), WriteOutcome::Conflict);
        assert_eq!(repo.reserve_order(RequestId(3)).await.expect("reserve"), WriteOutcome::Applied);
        assert_eq!(repo.reserve_order(RequestId(3)).await.expect("reserve"), WriteOutcome::Conflict);

        let commit = OrderCommit {
            request_id: RequestId(3),
            supplier_id: SupplierId(1),
            notes: Some("deliver to depot".to_string()),
            placed_at: Utc::now(),
        };
        assert_eq!(repo.commit_order(&commit).await.expect("commit"), WriteOutcome::Applied);
        assert_eq!(repo.commit_order(&commit).await.expect("commit"), WriteOutcome::Conflict);

        let request = repo.find_request(RequestId(3)).await.expect("find").expect("exists");
        assert_eq!(request.status, RequestStatus::OrderPlaced);
        assert!(request.order_placed());
        assert_eq!(request.order.supplier_id, Some(SupplierId(1)));
        assert_eq!(request.order.notes.as_deref(), Some("deliver to depot"));
        assert!(request.order.placed_at.is_some());
    }

    #[tokio::test]
    async fn release_returns_a_reservation_to_pending() {
        let pool = seeded_pool().await;
        let repo = SqlRequestRepository::new(pool);

        repo.reserve_order(RequestId(3)).await.expect("reserve");
        assert_eq!(repo.release_order(RequestId(3)).await.expect("release"), WriteOutcome::Applied);
        assert_eq!(repo.release_order(RequestId(3)).await.expect("release"), WriteOutcome::Conflict);

        let request = repo.find_request(RequestId(3)).await.expect("find").expect("exists");
        assert_eq!(request.order.status, OrderStatus::Pending);
        assert_eq!(request.status, RequestStatus::Complete);
    }

    #[tokio::test]
    async fn transitions_are_refused_while_dispatching() {
        let pool = seeded_pool().await;
        let repo = SqlRequestRepository::new(pool);
        repo.reserve_order(RequestId(3)).await.expect("reserve");

        let write = TransitionWrite {
            request_id: RequestId(3),
            expected_status: RequestStatus::Complete,
            status: RequestStatus::Rejected,
            note: None,
            updated_at: Utc::now(),
        };
        assert_eq!(repo.apply_transition(&write).await.expect("write"), WriteOutcome::Conflict);
    }

    #[tokio::test]
    async fn user_history_is_newest_first() {
        let pool = seeded_pool().await;
        let repo = SqlRequestRepository::new(pool);

        let newest = repo.insert_request(&submission(vec![]), Utc::now()).await.expect("insert");
        let ids: Vec<_> = repo
            .list_requests_by_user(UserId(1))
            .await
            .expect("list")
            .into_iter()
            .map(|request| request.id)
            .collect();

        assert_eq!(ids, vec![newest, RequestId(3), RequestId(2), RequestId(1)]);
        assert!(repo.list_requests_by_user(UserId(42)).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn latest_vehicle_request_follows_last_replacement_date() {
        let pool = seeded_pool().await;
        let repo = SqlRequestRepository::new(pool);

        let latest = repo.latest_request_for_vehicle(VehicleId(1)).await.expect("latest");
        assert_eq!(latest.map(|request| request.id), Some(RequestId(3)));

        let replaced = repo.insert_request(&submission(vec![]), Utc::now()).await.expect("insert");
        let latest = repo.latest_request_for_vehicle(VehicleId(2)).await.expect("latest");
        assert_eq!(latest.map(|request| request.id), Some(replaced));

        assert_eq!(repo.latest_request_for_vehicle(VehicleId(99)).await.expect("latest"), None);
    }

    #[tokio::test]
    async fn unreleased_reservations_are_counted() {
        let pool = seeded_pool().await;
        let repo = SqlRequestRepository::new(pool);
        assert_eq!(repo.count_stuck_reservations().await.expect("count"), 0);

        repo.reserve_order(RequestId(3)).await.expect("reserve");
        assert_eq!(repo.count_stuck_reservations().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn storage_rejects_statuses_outside_the_enumeration() {
        let pool = seeded_pool().await;

        let result = sqlx::query("UPDATE requests SET status = 'banana' WHERE id = 1")
            .execute(&pool)
            .await;
        assert!(result.is_err(), "status CHECK constraint should reject unknown values");
    }
}
