use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Seeded requests, one per workflow stage the demo exercises.
const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        label: "request-1-pending",
        request_id: 1,
        status: "pending",
        order_status: "pending",
        expected_image_count: 0,
        description: "Fresh submission awaiting supervisor review",
    },
    SeedRequestContract {
        label: "request-2-engineer-approved",
        request_id: 2,
        status: "engineer approved",
        order_status: "pending",
        expected_image_count: 0,
        description: "Mid-chain request with supervisor, manager and engineer notes",
    },
    SeedRequestContract {
        label: "request-3-complete",
        request_id: 3,
        status: "complete",
        order_status: "pending",
        expected_image_count: 2,
        description: "Fully approved request ready for order placement",
    },
];

const SEED_USER_IDS: &[i64] = &[1];
const SEED_VEHICLE_IDS: &[i64] = &[1, 2];
const SEED_SUPPLIER_IDS: &[i64] = &[1, 2];
const SEED_IMAGE_IDS: &[i64] = &[1, 2];

/// Deterministic demo fleet used by `treadline seed` and integration tests.
pub struct FleetSeedDataset;

impl FleetSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/fleet_seed_data.sql");

    /// Loads the dataset. Rows are inserted with `INSERT OR IGNORE`, so a
    /// second load leaves existing rows untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let requests_seeded = SEED_REQUESTS
            .iter()
            .map(|request| RequestSeedInfo {
                request_id: request.request_id,
                status: request.status,
                description: request.description,
            })
            .collect();

        Ok(SeedResult { requests_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        checks.push(("users", count_ids(pool, "users", SEED_USER_IDS).await?));
        checks.push(("vehicles", count_ids(pool, "vehicles", SEED_VEHICLE_IDS).await?));
        checks.push(("suppliers", count_ids(pool, "supplier", SEED_SUPPLIER_IDS).await?));
        checks.push(("request-images", count_ids(pool, "request_images", SEED_IMAGE_IDS).await?));

        let keyed_supplier: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM supplier WHERE id = 1 AND formspree_key IS NOT NULL)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("supplier-1-endpoint-key", keyed_supplier == 1));

        for request in SEED_REQUESTS {
            let state_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM requests WHERE id = ?1 AND status = ?2 AND order_status = ?3)",
            )
            .bind(request.request_id)
            .bind(request.status)
            .bind(request.order_status)
            .fetch_one(pool)
            .await?;

            let image_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM request_images WHERE request_id = ?1")
                    .bind(request.request_id)
                    .fetch_one(pool)
                    .await?;

            checks.push((request.label, state_ok == 1 && image_count == request.expected_image_count));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows, children first.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let request_ids: Vec<i64> = SEED_REQUESTS.iter().map(|request| request.request_id).collect();
        for (table, ids) in [
            ("request_images", SEED_IMAGE_IDS),
            ("requests", request_ids.as_slice()),
            ("supplier", SEED_SUPPLIER_IDS),
            ("vehicles", SEED_VEHICLE_IDS),
            ("users", SEED_USER_IDS),
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE id IN {}", sql_id_list(ids)))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn count_ids(pool: &DbPool, table: &str, ids: &[i64]) -> Result<bool, RepositoryError> {
    let count: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table} WHERE id IN {}", sql_id_list(ids)))
            .fetch_one(pool)
            .await?;
    Ok(count == ids.len() as i64)
}

fn sql_id_list(ids: &[i64]) -> String {
    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

#[derive(Debug, Clone, Copy)]
struct SeedRequestContract {
    label: &'static str,
    request_id: i64,
    status: &'static str,
    order_status: &'static str,
    expected_image_count: i64,
    description: &'static str,
}

#[derive(Debug)]
pub struct SeedResult {
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: i64,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[test]
    fn sql_fixture_is_not_empty() {
        assert!(FleetSeedDataset::SQL.contains("INSERT OR IGNORE INTO requests"));
    }

    #[tokio::test]
    async fn seed_verifies_and_reload_is_idempotent() {
        let pool = migrated_pool().await;

        let first = FleetSeedDataset::load(&pool).await.expect("load seed");
        let first_verification = FleetSeedDataset::verify(&pool).await.expect("verify seed");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.requests_seeded.len(), 3);

        FleetSeedDataset::load(&pool).await.expect("reload seed");
        let second_verification = FleetSeedDataset::verify(&pool).await.expect("re-verify seed");
        assert_eq!(first_verification.checks, second_verification.checks);

        let request_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM requests")
            .fetch_one(&pool)
            .await
            .expect("count requests");
        assert_eq!(request_count, 3);
    }

    #[tokio::test]
    async fn verification_fails_on_empty_database() {
        let pool = migrated_pool().await;

        let verification = FleetSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, present)| !present));
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = migrated_pool().await;
        FleetSeedDataset::load(&pool).await.expect("load seed");

        FleetSeedDataset::clean(&pool).await.expect("clean seed");

        let verification = FleetSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let supplier_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM supplier")
            .fetch_one(&pool)
            .await
            .expect("count suppliers");
        assert_eq!(supplier_count, 0);
    }
}
