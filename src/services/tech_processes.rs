use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{map_write_error, materials::load_materials, operations::load_operations};
use crate::{
    entities::tech_process::{
        self, Entity as TechProcessEntity, TechProcessMaterial, TechProcessMaterials,
        TechProcessOperation, TechProcessOperations,
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTechProcessInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub article_number: String,
    pub description: Option<String>,
    #[serde(default)]
    pub operations: Vec<TechProcessOperation>,
    #[serde(default)]
    pub materials: Vec<TechProcessMaterial>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTechProcessInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub article_number: Option<String>,
    pub description: Option<String>,
    pub operations: Option<Vec<TechProcessOperation>>,
    pub materials: Option<Vec<TechProcessMaterial>>,
    pub is_active: Option<bool>,
}

/// Production templates keyed by article number
#[derive(Clone)]
pub struct TechProcessService {
    db: Arc<DatabaseConnection>,
}

impl TechProcessService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_tech_processes(&self) -> Result<Vec<tech_process::Model>, ServiceError> {
        TechProcessEntity::find()
            .order_by_asc(tech_process::Column::ArticleNumber)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to list tech processes: {}", e);
                ServiceError::db_error(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn get_tech_process(&self, id: Uuid) -> Result<tech_process::Model, ServiceError> {
        TechProcessEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Tech process {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn get_by_article_number(
        &self,
        article_number: &str,
    ) -> Result<tech_process::Model, ServiceError> {
        TechProcessEntity::find()
            .filter(tech_process::Column::ArticleNumber.eq(article_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Tech process for article {} not found",
                    article_number
                ))
            })
    }

    #[instrument(skip(self, input), fields(article_number = %input.article_number), err)]
    pub async fn create_tech_process(
        &self,
        input: CreateTechProcessInput,
    ) -> Result<tech_process::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        self.ensure_article_free(&input.article_number, None).await?;
        let operations = self.checked_steps(input.operations).await?;
        let materials = self.checked_materials(input.materials).await?;

        let article = input.article_number.clone();
        let created = tech_process::ActiveModel {
            name: Set(input.name),
            article_number: Set(input.article_number),
            description: Set(input.description),
            operations: Set(operations),
            materials: Set(materials),
            is_active: Set(input.is_active.unwrap_or(true)),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| {
            map_write_error(e, || {
                format!("Tech process for article {} already exists", article)
            })
        })?;

        info!(
            tech_process_id = %created.id,
            article_number = %created.article_number,
            steps = created.operations.0.len(),
            "Tech process created"
        );
        Ok(created)
    }

    #[instrument(skip(self, input), err)]
    pub async fn update_tech_process(
        &self,
        id: Uuid,
        input: UpdateTechProcessInput,
    ) -> Result<tech_process::Model, ServiceError> {
        input.validate()?;

        let existing = self.get_tech_process(id).await?;
        if let Some(article) = &input.article_number {
            if *article != existing.article_number {
                self.ensure_article_free(article, Some(id)).await?;
            }
        }

        let mut active = existing.into_active_model();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(article) = input.article_number {
            active.article_number = Set(article);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(steps) = input.operations {
            active.operations = Set(self.checked_steps(steps).await?);
        }
        if let Some(materials) = input.materials {
            active.materials = Set(self.checked_materials(materials).await?);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(&*self.db).await.map_err(|e| {
            map_write_error(e, || "Tech process article number already exists".to_string())
        })?;

        info!(tech_process_id = %id, "Tech process updated");
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_tech_process(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = TechProcessEntity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Tech process {} not found",
                id
            )));
        }
        info!(tech_process_id = %id, "Tech process deleted");
        Ok(())
    }

    /// Verifies the referenced operations and orders the steps by sequence.
    async fn checked_steps(
        &self,
        mut steps: Vec<TechProcessOperation>,
    ) -> Result<TechProcessOperations, ServiceError> {
        load_operations(&*self.db, steps.iter().map(|s| s.operation_id)).await?;
        steps.sort_by_key(|s| s.sequence);
        Ok(TechProcessOperations(steps))
    }

    async fn checked_materials(
        &self,
        materials: Vec<TechProcessMaterial>,
    ) -> Result<TechProcessMaterials, ServiceError> {
        if materials
            .iter()
            .any(|m| m.quantity_per_unit.is_sign_negative() && !m.quantity_per_unit.is_zero())
        {
            return Err(ServiceError::ValidationError(
                "Material quantity per unit cannot be negative".to_string(),
            ));
        }
        load_materials(&*self.db, materials.iter().map(|m| m.material_id)).await?;
        Ok(TechProcessMaterials(materials))
    }

    async fn ensure_article_free(
        &self,
        article_number: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = TechProcessEntity::find()
            .filter(tech_process::Column::ArticleNumber.eq(article_number));
        if let Some(id) = except {
            query = query.filter(tech_process::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Tech process for article {} already exists",
                article_number
            )));
        }
        Ok(())
    }
}

/// The active template for an article, if one exists.
pub(crate) async fn find_active_for_article<C: ConnectionTrait>(
    conn: &C,
    article_number: &str,
) -> Result<Option<tech_process::Model>, ServiceError> {
    Ok(TechProcessEntity::find()
        .filter(tech_process::Column::ArticleNumber.eq(article_number))
        .filter(tech_process::Column::IsActive.eq(true))
        .one(conn)
        .await?)
}
