use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use treadline_core::approvals::ApprovalService;
use treadline_core::audit::{AuditSink, TracingAuditSink};
use treadline_core::config::{AppConfig, ConfigError, LoadOptions};
use treadline_core::intake::RequestIntake;
use treadline_core::orders::{OrderError, OrderWorkflow, OrderWorkflowConfig};
use treadline_core::registry::{SupplierRegistry, VehicleRegistry};
use treadline_db::{
    connect_with_config, migrations, DbPool, SqlFleetRepository, SqlRequestRepository,
    SqlSupplierRepository,
};

use crate::gateway::FormspreeGateway;
use crate::routes::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification gateway client could not be built: {0}")]
    Gateway(#[source] reqwest::Error),
    #[error("order workflow could not be initialised: {0}")]
    Workflow(#[source] OrderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let api = wire_services(&config, db_pool.clone())?;
    info!(
        event_name = "system.bootstrap.services_wired",
        correlation_id = "bootstrap",
        gateway_base_url = %config.gateway.base_url,
        gateway_timeout_secs = config.gateway.timeout_secs,
        "approval, intake, order and registry services wired"
    );

    Ok(Application { config, db_pool, api })
}

fn wire_services(config: &AppConfig, db_pool: DbPool) -> Result<ApiState, BootstrapError> {
    let requests = Arc::new(SqlRequestRepository::new(db_pool.clone()));
    let suppliers = Arc::new(SqlSupplierRepository::new(db_pool.clone()));
    let fleet = Arc::new(SqlFleetRepository::new(db_pool));
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let gateway = FormspreeGateway::new(Duration::from_secs(config.gateway.timeout_secs))
        .map_err(BootstrapError::Gateway)?;

    let orders = OrderWorkflow::new(
        requests.clone(),
        suppliers.clone(),
        Arc::new(gateway),
        OrderWorkflowConfig::from_gateway(&config.gateway),
        audit.clone(),
    )
    .map_err(BootstrapError::Workflow)?;

    Ok(ApiState {
        approvals: Arc::new(ApprovalService::new(requests.clone(), audit.clone())),
        orders: Arc::new(orders),
        intake: Arc::new(RequestIntake::new(requests, audit.clone())),
        suppliers: Arc::new(SupplierRegistry::new(suppliers, audit.clone())),
        vehicles: Arc::new(VehicleRegistry::new(fleet, audit)),
    })
}
