use serde::Serialize;
use treadline_core::config::{AppConfig, LoadOptions};
use treadline_db::{
    connect_with_config, migrations, DbPool, SqlRequestRepository, SqlSupplierRepository,
};

use crate::commands::{CommandResult, EXIT_VERIFICATION};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self::new(name, CheckStatus::Skipped, format!("skipped because {reason}"))
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { EXIT_VERIFICATION } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let mut checks = vec![DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            )];
            checks.extend(database_checks(&config));
            checks
        }
        Err(error) => vec![
            DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()),
            DoctorCheck::skipped("database_connectivity", "configuration did not load"),
            DoctorCheck::skipped("schema_migrations", "configuration did not load"),
            DoctorCheck::skipped("supplier_endpoint_keys", "configuration did not load"),
            DoctorCheck::skipped("stuck_reservations", "configuration did not load"),
        ],
    };

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::new(
                    "database_connectivity",
                    CheckStatus::Fail,
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema_migrations", "the async runtime did not start"),
                DoctorCheck::skipped("supplier_endpoint_keys", "the async runtime did not start"),
                DoctorCheck::skipped("stuck_reservations", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
                    DoctorCheck::skipped("supplier_endpoint_keys", "the database is unreachable"),
                    DoctorCheck::skipped("stuck_reservations", "the database is unreachable"),
                ];
            }
        };

        let mut checks = vec![DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected using `{}`", config.database.url),
        )];
        let schema = check_schema(&pool).await;
        let migrated = schema.status == CheckStatus::Pass;
        checks.push(schema);
        if migrated {
            checks.push(check_supplier_keys(&pool).await);
            checks.push(check_stuck_reservations(&pool).await);
        } else {
            checks.push(DoctorCheck::skipped("supplier_endpoint_keys", "the schema is not migrated"));
            checks.push(DoctorCheck::skipped("stuck_reservations", "the schema is not migrated"));
        }

        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let known = migrations::MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .count() as i64;
    let applied = sqlx_applied_count(pool).await;

    match applied {
        Ok(count) if count >= known => DoctorCheck::new(
            "schema_migrations",
            CheckStatus::Pass,
            format!("{count} of {known} migrations applied"),
        ),
        Ok(count) => DoctorCheck::new(
            "schema_migrations",
            CheckStatus::Fail,
            format!("{count} of {known} migrations applied; run `treadline migrate`"),
        ),
        Err(_) => DoctorCheck::new(
            "schema_migrations",
            CheckStatus::Fail,
            "migration history not found; run `treadline migrate`",
        ),
    }
}

async fn sqlx_applied_count(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
}

async fn check_supplier_keys(pool: &DbPool) -> DoctorCheck {
    let suppliers = match SqlSupplierRepository::new(pool.clone()).list().await {
        Ok(suppliers) => suppliers,
        Err(error) => {
            return DoctorCheck::new(
                "supplier_endpoint_keys",
                CheckStatus::Fail,
                format!("failed to list suppliers: {error}"),
            );
        }
    };

    let misconfigured: Vec<String> = suppliers
        .iter()
        .filter_map(|supplier| {
            supplier.endpoint_key().err().map(|error| format!("{} ({error})", supplier.name))
        })
        .collect();

    if misconfigured.is_empty() {
        DoctorCheck::new(
            "supplier_endpoint_keys",
            CheckStatus::Pass,
            format!("{} supplier(s) have usable endpoint keys", suppliers.len()),
        )
    } else {
        DoctorCheck::new(
            "supplier_endpoint_keys",
            CheckStatus::Warn,
            format!("orders cannot be placed with: {}", misconfigured.join(", ")),
        )
    }
}

/// A reservation left in `dispatching` blocks every retry of its request.
async fn check_stuck_reservations(pool: &DbPool) -> DoctorCheck {
    match SqlRequestRepository::new(pool.clone()).count_stuck_reservations().await {
        Ok(0) => DoctorCheck::new(
            "stuck_reservations",
            CheckStatus::Pass,
            "no order reservations awaiting reconciliation",
        ),
        Ok(count) => DoctorCheck::new(
            "stuck_reservations",
            CheckStatus::Warn,
            format!(
                "{count} request(s) stuck in `dispatching`; confirm with the supplier, then reconcile"
            ),
        ),
        Err(error) => DoctorCheck::new(
            "stuck_reservations",
            CheckStatus::Fail,
            format!("failed to count order reservations: {error}"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
