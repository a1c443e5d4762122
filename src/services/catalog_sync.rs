use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::map_write_error;
use crate::{
    config::CatalogConfig,
    entities::material::{self, Entity as MaterialEntity, DEFAULT_UNIT},
    errors::ServiceError,
};

/// Product row as returned by the remote catalog
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub uom: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteStockItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stock: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct Rows<T> {
    rows: Vec<T>,
}

/// Remote product with local defaults applied
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
    pub code: String,
    pub article: Option<String>,
    pub description: Option<String>,
    pub price: Decimal,
    pub unit: String,
}

impl From<RemoteProduct> for CatalogProduct {
    fn from(p: RemoteProduct) -> Self {
        Self {
            id: p.id,
            name: p.name,
            code: p.code.unwrap_or_default(),
            article: p.article,
            description: p.description,
            price: p.price.unwrap_or_default(),
            unit: p.uom.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        }
    }
}

/// Outcome of a batch sync. Item failures are counted, not fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    pub details: Vec<String>,
}

/// Read access to the external product catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn check_connection(&self) -> Result<(), ServiceError>;
    async fn list_products(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RemoteProduct>, ServiceError>;
    async fn list_stock(&self) -> Result<Vec<RemoteStockItem>, ServiceError>;
}

/// HTTP client for the catalog's JSON API (Basic auth).
#[derive(Clone)]
pub struct HttpCatalogClient {
    client: Client,
    api_url: String,
    login: String,
    password: String,
}

impl HttpCatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build catalog HTTP client: {}", e))
            })?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &CatalogConfig, client: Client) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            login: config.login.clone(),
            password: config.password.clone(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let url = format!("{}/{}", self.api_url, path);
        debug!(%url, "Calling catalog API");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.login, Some(&self.password))
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!(%url, "Catalog request failed: {}", e);
                ServiceError::ExternalServiceError(format!("Catalog request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%url, %status, "Catalog API returned an error");
            return Err(ServiceError::ExternalServiceError(format!(
                "Catalog API error (status: {}): {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response.json::<T>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Unexpected catalog response: {}", e))
        })
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn check_connection(&self) -> Result<(), ServiceError> {
        self.get_json::<serde_json::Value>("entity/organization", &[])
            .await
            .map(|_| ())
    }

    async fn list_products(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RemoteProduct>, ServiceError> {
        let page: Rows<RemoteProduct> = self
            .get_json(
                "entity/product",
                &[("limit", limit.to_string()), ("offset", offset.to_string())],
            )
            .await?;
        Ok(page.rows)
    }

    async fn list_stock(&self) -> Result<Vec<RemoteStockItem>, ServiceError> {
        let page: Rows<RemoteStockItem> = self.get_json("report/stock/all", &[]).await?;
        Ok(page.rows)
    }
}

enum Upsert {
    Created,
    Updated,
}

/// Imports products and stock levels from the external catalog into materials.
#[derive(Clone)]
pub struct CatalogSyncService {
    db: Arc<DatabaseConnection>,
    client: Option<Arc<dyn CatalogClient>>,
    page_size: u32,
}

impl CatalogSyncService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        client: Option<Arc<dyn CatalogClient>>,
        page_size: u32,
    ) -> Self {
        Self {
            db,
            client,
            page_size,
        }
    }

    /// Builds the HTTP-backed service; without credentials every call fails
    /// with `ExternalServiceError`.
    pub fn from_config(
        db: Arc<DatabaseConnection>,
        config: &CatalogConfig,
    ) -> Result<Self, ServiceError> {
        let client: Option<Arc<dyn CatalogClient>> = if config.is_configured() {
            Some(Arc::new(HttpCatalogClient::new(config)?))
        } else {
            warn!("Catalog credentials not configured; catalog sync disabled");
            None
        };
        Ok(Self::new(db, client, config.import_page_size))
    }

    fn client(&self) -> Result<&Arc<dyn CatalogClient>, ServiceError> {
        self.client.as_ref().ok_or_else(|| {
            ServiceError::ExternalServiceError("Catalog integration is not configured".to_string())
        })
    }

    #[instrument(skip(self), err)]
    pub async fn check_connection(&self) -> Result<(), ServiceError> {
        self.client()?.check_connection().await?;
        info!("Catalog connection check succeeded");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn list_products(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<CatalogProduct>, ServiceError> {
        let limit = limit.unwrap_or(self.page_size).clamp(1, 1000);
        let products = self
            .client()?
            .list_products(limit, offset.unwrap_or(0))
            .await?;
        Ok(products.into_iter().map(CatalogProduct::from).collect())
    }

    /// Creates or updates one material per remote product, keyed by external id.
    #[instrument(skip(self), err)]
    pub async fn import_products(&self) -> Result<SyncResult, ServiceError> {
        let products = self.client()?.list_products(self.page_size, 0).await?;
        let mut result = SyncResult {
            total: products.len(),
            ..Default::default()
        };

        for product in &products {
            match self.upsert_material(product).await {
                Ok(Upsert::Created) => result.created += 1,
                Ok(Upsert::Updated) => result.updated += 1,
                Err(e) => {
                    warn!(external_id = %product.id, "Product import failed: {}", e);
                    result.errors += 1;
                    result
                        .details
                        .push(format!("Error processing {}: {}", product.name, e));
                }
            }
        }

        info!(
            total = result.total,
            created = result.created,
            updated = result.updated,
            errors = result.errors,
            "Catalog products imported"
        );
        Ok(result)
    }

    /// Copies remote stock levels onto materials with a matching external id.
    #[instrument(skip(self), err)]
    pub async fn sync_stock(&self) -> Result<SyncResult, ServiceError> {
        let items = self.client()?.list_stock().await?;
        let mut result = SyncResult {
            total: items.len(),
            ..Default::default()
        };

        for item in &items {
            match self.apply_stock(item).await {
                Ok(true) => result.updated += 1,
                Ok(false) => {
                    result.errors += 1;
                    result
                        .details
                        .push(format!("Material with external ID {} not found", item.id));
                }
                Err(e) => {
                    warn!(external_id = %item.id, "Stock sync failed: {}", e);
                    result.errors += 1;
                    result.details.push(format!(
                        "Error syncing stock for {}: {}",
                        item.name.as_deref().unwrap_or(&item.id),
                        e
                    ));
                }
            }
        }

        info!(
            total = result.total,
            updated = result.updated,
            errors = result.errors,
            "Catalog stock synchronized"
        );
        Ok(result)
    }

    async fn upsert_material(&self, product: &RemoteProduct) -> Result<Upsert, ServiceError> {
        let db = &*self.db;
        let existing = MaterialEntity::find()
            .filter(material::Column::ExternalId.eq(product.id.as_str()))
            .one(db)
            .await?;
        let unit = product
            .uom
            .clone()
            .unwrap_or_else(|| DEFAULT_UNIT.to_string());
        let price = product.price.unwrap_or_default();

        match existing {
            Some(found) => {
                let mut active = found.into_active_model();
                active.name = Set(product.name.clone());
                active.price = Set(Some(price));
                active.unit = Set(unit);
                if let Some(description) = &product.description {
                    active.description = Set(Some(description.clone()));
                }
                active.update(db).await?;
                Ok(Upsert::Updated)
            }
            None => {
                let code = match product.code.as_deref() {
                    Some(code) if !code.is_empty() => code.to_string(),
                    _ => product.id.chars().take(10).collect(),
                };
                material::ActiveModel {
                    name: Set(product.name.clone()),
                    code: Set(code.clone()),
                    unit: Set(unit),
                    description: Set(product.description.clone()),
                    price: Set(Some(price)),
                    quantity: Set(Some(Decimal::ZERO)),
                    external_id: Set(Some(product.id.clone())),
                    ..Default::default()
                }
                .insert(db)
                .await
                .map_err(|e| map_write_error(e, || format!("Material code '{}' already exists", code)))?;
                Ok(Upsert::Created)
            }
        }
    }

    async fn apply_stock(&self, item: &RemoteStockItem) -> Result<bool, ServiceError> {
        let db = &*self.db;
        let Some(found) = MaterialEntity::find()
            .filter(material::Column::ExternalId.eq(item.id.as_str()))
            .one(db)
            .await?
        else {
            return Ok(false);
        };

        let mut active = found.into_active_model();
        active.quantity = Set(Some(item.stock.unwrap_or_default()));
        active.update(db).await?;
        Ok(true)
    }
}
