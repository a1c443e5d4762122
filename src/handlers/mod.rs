pub mod auth;
pub mod catalog;
pub mod common;
pub mod health;
pub mod materials;
pub mod operations;
pub mod orders;
pub mod reports;
pub mod tech_processes;
pub mod users;
pub mod work_times;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    services::{
        catalog_sync::CatalogSyncService, materials::MaterialService,
        operations::OperationService, orders::OrderService, reports::ReportService,
        tech_processes::TechProcessService, users::UserService, work_time::WorkTimeService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub work_time: Arc<WorkTimeService>,
    pub reports: Arc<ReportService>,
    pub users: Arc<UserService>,
    pub operations: Arc<OperationService>,
    pub materials: Arc<MaterialService>,
    pub tech_processes: Arc<TechProcessService>,
    pub catalog: Arc<CatalogSyncService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Result<Self, ServiceError> {
        let catalog = CatalogSyncService::from_config(db_pool.clone(), &config.catalog)?;
        Ok(Self::with_catalog(db_pool, catalog))
    }

    /// Same as [`AppServices::new`] but with a prebuilt catalog sync service.
    pub fn with_catalog(db_pool: Arc<DbPool>, catalog: CatalogSyncService) -> Self {
        Self {
            orders: Arc::new(OrderService::new(db_pool.clone())),
            work_time: Arc::new(WorkTimeService::new(db_pool.clone())),
            reports: Arc::new(ReportService::new(db_pool.clone())),
            users: Arc::new(UserService::new(db_pool.clone())),
            operations: Arc::new(OperationService::new(db_pool.clone())),
            materials: Arc::new(MaterialService::new(db_pool.clone())),
            tech_processes: Arc::new(TechProcessService::new(db_pool)),
            catalog: Arc::new(catalog),
        }
    }
}
