use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, ModelTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{map_write_error, validate_non_negative};
use crate::{
    entities::{
        operation::{self, Entity as OperationEntity},
        user::Entity as UserEntity,
        user_rate::{self, Entity as UserRateEntity},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative")]
    #[serde(default)]
    pub default_rate: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOperationInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub default_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertUserRateInput {
    pub user_id: Uuid,
    pub operation_id: Uuid,
    #[validate(custom = "validate_non_negative")]
    pub rate: Decimal,
}

/// Operations catalog plus per-worker rate overrides
#[derive(Clone)]
pub struct OperationService {
    db: Arc<DatabaseConnection>,
}

impl OperationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_operations(&self) -> Result<Vec<operation::Model>, ServiceError> {
        OperationEntity::find()
            .order_by_asc(operation::Column::Name)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to list operations: {}", e);
                ServiceError::db_error(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn get_operation(&self, id: Uuid) -> Result<operation::Model, ServiceError> {
        OperationEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Operation {} not found", id)))
    }

    #[instrument(skip(self, input), fields(name = %input.name), err)]
    pub async fn create_operation(
        &self,
        input: CreateOperationInput,
    ) -> Result<operation::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        self.ensure_name_free(&input.name, None).await?;

        let name = input.name.clone();
        let created = operation::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            default_rate: Set(input.default_rate),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| map_write_error(e, || format!("Operation '{}' already exists", name)))?;

        info!(operation_id = %created.id, name = %created.name, "Operation created");
        Ok(created)
    }

    #[instrument(skip(self, input), err)]
    pub async fn update_operation(
        &self,
        id: Uuid,
        input: UpdateOperationInput,
    ) -> Result<operation::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let existing = self.get_operation(id).await?;
        if let Some(name) = &input.name {
            if *name != existing.name {
                self.ensure_name_free(name, Some(id)).await?;
            }
        }

        let mut active = existing.into_active_model();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(rate) = input.default_rate {
            active.default_rate = Set(rate);
        }

        let updated = active
            .update(db)
            .await
            .map_err(|e| map_write_error(e, || "Operation name already exists".to_string()))?;

        info!(operation_id = %id, "Operation updated");
        Ok(updated)
    }

    /// Removes the operation together with every rate override that points at it.
    #[instrument(skip(self), err)]
    pub async fn delete_operation(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let existing = OperationEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Operation {} not found", id)))?;

        let removed_rates = UserRateEntity::delete_many()
            .filter(user_rate::Column::OperationId.eq(id))
            .exec(&txn)
            .await?
            .rows_affected;

        existing.delete(&txn).await?;
        txn.commit().await?;

        info!(operation_id = %id, removed_rates, "Operation deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_user_rates(
        &self,
        operation_id: Uuid,
    ) -> Result<Vec<user_rate::Model>, ServiceError> {
        self.get_operation(operation_id).await?;
        UserRateEntity::find()
            .filter(user_rate::Column::OperationId.eq(operation_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Creates or replaces the override for `(user, operation)`.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, operation_id = %input.operation_id), err)]
    pub async fn upsert_user_rate(
        &self,
        input: UpsertUserRateInput,
    ) -> Result<user_rate::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        UserEntity::find_by_id(input.user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", input.user_id)))?;
        self.get_operation(input.operation_id).await?;

        let existing = UserRateEntity::find()
            .filter(user_rate::Column::UserId.eq(input.user_id))
            .filter(user_rate::Column::OperationId.eq(input.operation_id))
            .one(db)
            .await?;

        let saved = match existing {
            Some(rate) => {
                let mut active = rate.into_active_model();
                active.rate = Set(input.rate);
                active.update(db).await?
            }
            None => user_rate::ActiveModel {
                user_id: Set(input.user_id),
                operation_id: Set(input.operation_id),
                rate: Set(input.rate),
                ..Default::default()
            }
            .insert(db)
            .await
            .map_err(|e| map_write_error(e, || "Rate for this user already exists".to_string()))?,
        };

        info!(rate_id = %saved.id, rate = %saved.rate, "User rate saved");
        Ok(saved)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_user_rate(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = UserRateEntity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("User rate {} not found", id)));
        }
        info!(rate_id = %id, "User rate deleted");
        Ok(())
    }

    async fn ensure_name_free(&self, name: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = OperationEntity::find().filter(operation::Column::Name.eq(name));
        if let Some(id) = except {
            query = query.filter(operation::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Operation '{}' already exists",
                name
            )));
        }
        Ok(())
    }
}

/// Loads the referenced operations, failing with `NotFound` on the first unknown id.
pub(crate) async fn load_operations<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, operation::Model>, ServiceError> {
    let mut wanted: Vec<Uuid> = ids.into_iter().collect();
    wanted.sort_unstable();
    wanted.dedup();
    if wanted.is_empty() {
        return Ok(HashMap::new());
    }

    let found: HashMap<Uuid, operation::Model> = OperationEntity::find()
        .filter(operation::Column::Id.is_in(wanted.clone()))
        .all(conn)
        .await?
        .into_iter()
        .map(|op| (op.id, op))
        .collect();

    match wanted.iter().find(|id| !found.contains_key(id)) {
        Some(missing) => Err(ServiceError::NotFound(format!(
            "Operation {} not found",
            missing
        ))),
        None => Ok(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user::{self, Role};
    use crate::services::test_support::memory_db;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn cut() -> CreateOperationInput {
        CreateOperationInput {
            name: "Cut".into(),
            description: None,
            default_rate: dec!(100),
        }
    }

    async fn worker(db: &DatabaseConnection) -> user::Model {
        user::ActiveModel {
            username: Set("welder".into()),
            password_hash: Set("x".into()),
            full_name: Set("Welder".into()),
            role: Set(Role::Worker),
            hourly_rate: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn names_are_unique() {
        let service = OperationService::new(memory_db().await);
        service.create_operation(cut()).await.unwrap();

        assert_matches!(
            service.create_operation(cut()).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn negative_rates_are_rejected() {
        let service = OperationService::new(memory_db().await);
        let mut input = cut();
        input.default_rate = dec!(-1);

        assert_matches!(
            service.create_operation(input).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn upsert_replaces_the_existing_override() {
        let db = memory_db().await;
        let service = OperationService::new(db.clone());
        let op = service.create_operation(cut()).await.unwrap();
        let user = worker(&db).await;

        let first = service
            .upsert_user_rate(UpsertUserRateInput {
                user_id: user.id,
                operation_id: op.id,
                rate: dec!(120),
            })
            .await
            .unwrap();
        let second = service
            .upsert_user_rate(UpsertUserRateInput {
                user_id: user.id,
                operation_id: op.id,
                rate: dec!(140),
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let rates = service.list_user_rates(op.id).await.unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].rate, dec!(140));
    }

    #[tokio::test]
    async fn deleting_an_operation_drops_its_overrides() {
        let db = memory_db().await;
        let service = OperationService::new(db.clone());
        let op = service.create_operation(cut()).await.unwrap();
        let user = worker(&db).await;
        let rate = service
            .upsert_user_rate(UpsertUserRateInput {
                user_id: user.id,
                operation_id: op.id,
                rate: dec!(120),
            })
            .await
            .unwrap();

        service.delete_operation(op.id).await.unwrap();

        assert!(UserRateEntity::find_by_id(rate.id)
            .one(&*db)
            .await
            .unwrap()
            .is_none());
        assert_matches!(
            service.get_operation(op.id).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
