use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::{map_write_error, validate_non_negative};
use crate::{
    auth::{hash_password, verify_password, Actor},
    entities::user::{self, Entity as UserEntity, Role},
    errors::{ForbiddenReason, ServiceError},
};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    pub role: Option<Role>,
    #[validate(custom = "validate_non_negative")]
    pub hourly_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    pub role: Option<Role>,
    #[validate(custom = "validate_non_negative")]
    pub hourly_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    pub current_password: String,
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

/// Account management. Password hashes never leave this service.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Admin-only account creation.
    #[instrument(skip(self, input), fields(username = %input.username), err)]
    pub async fn create_user(
        &self,
        actor: Actor,
        input: CreateUserInput,
    ) -> Result<user::Model, ServiceError> {
        actor.require_admin()?;
        self.register(input).await
    }

    /// Creates an account without an authorization check. Used by the
    /// migration CLI to seed the first administrator.
    #[instrument(skip(self, input), fields(username = %input.username), err)]
    pub async fn register(&self, input: CreateUserInput) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let taken = UserEntity::find()
            .filter(user::Column::Username.eq(input.username.as_str()))
            .one(db)
            .await?;
        if taken.is_some() {
            return Err(ServiceError::Conflict(format!(
                "User '{}' already exists",
                input.username
            )));
        }

        let password_hash = hash_password(&input.password).map_err(|e| {
            error!("Failed to hash password: {}", e);
            ServiceError::InternalError("Failed to hash password".to_string())
        })?;

        let username = input.username.clone();
        let created = user::ActiveModel {
            username: Set(input.username),
            password_hash: Set(password_hash),
            full_name: Set(input.full_name),
            role: Set(input.role.unwrap_or_default()),
            hourly_rate: Set(input.hourly_rate),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| map_write_error(e, || format!("User '{}' already exists", username)))?;

        info!(user_id = %created.id, role = %created.role, "User created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn list_users(&self, actor: Actor) -> Result<Vec<user::Model>, ServiceError> {
        actor.require_admin()?;
        UserEntity::find()
            .order_by_asc(user::Column::Username)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to list users: {}", e);
                ServiceError::db_error(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, actor: Actor, id: Uuid) -> Result<user::Model, ServiceError> {
        actor.require_self_or_admin(id)?;
        self.find(id).await
    }

    /// Workers may only rename themselves; role and hourly rate belong to admins.
    #[instrument(skip(self, input), err)]
    pub async fn update_user(
        &self,
        actor: Actor,
        id: Uuid,
        input: UpdateUserInput,
    ) -> Result<user::Model, ServiceError> {
        actor.require_self_or_admin(id)?;
        input.validate()?;
        if input.role.is_some() && !actor.is_admin() {
            return Err(ServiceError::Forbidden(ForbiddenReason::AdminOnly));
        }

        let existing = self.find(id).await?;
        let mut active = existing.into_active_model();
        if let Some(full_name) = input.full_name {
            active.full_name = Set(full_name);
        }
        if actor.is_admin() {
            if let Some(role) = input.role {
                active.role = Set(role);
            }
            if let Some(rate) = input.hourly_rate {
                active.hourly_rate = Set(Some(rate));
            }
        } else if input.hourly_rate.is_some() {
            debug!(user_id = %id, "Ignoring hourly rate change requested by a worker");
        }

        let updated = active.update(&*self.db).await?;
        info!(user_id = %id, "User updated");
        Ok(updated)
    }

    /// Only the account owner may change the password, and only with the current one.
    #[instrument(skip(self, input), err)]
    pub async fn change_password(
        &self,
        actor: Actor,
        id: Uuid,
        input: ChangePasswordInput,
    ) -> Result<(), ServiceError> {
        if actor.user_id != id {
            return Err(ServiceError::Forbidden(ForbiddenReason::NotOwner));
        }
        input.validate()?;

        let existing = self.find(id).await?;
        if !verify_password(&input.current_password, &existing.password_hash) {
            warn!(user_id = %id, "Password change rejected: wrong current password");
            return Err(ServiceError::ValidationError(
                "Current password is incorrect".to_string(),
            ));
        }

        let password_hash = hash_password(&input.new_password).map_err(|e| {
            error!("Failed to hash password: {}", e);
            ServiceError::InternalError("Failed to hash password".to_string())
        })?;

        let mut active = existing.into_active_model();
        active.password_hash = Set(password_hash);
        active.update(&*self.db).await?;

        info!(user_id = %id, "Password changed");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn delete_user(&self, actor: Actor, id: Uuid) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let result = UserEntity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("User {} not found", id)));
        }
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        UserEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_db;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn input(username: &str, role: Role) -> CreateUserInput {
        CreateUserInput {
            username: username.into(),
            password: "long-enough-password".into(),
            full_name: "Anna Smirnova".into(),
            role: Some(role),
            hourly_rate: Some(dec!(180)),
        }
    }

    #[tokio::test]
    async fn register_hashes_password_and_rejects_duplicates() {
        let users = UserService::new(memory_db().await);

        let created = users.register(input("anna", Role::Worker)).await.unwrap();
        assert_ne!(created.password_hash, "long-enough-password");
        assert!(verify_password("long-enough-password", &created.password_hash));

        assert_matches!(
            users.register(input("anna", Role::Admin)).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn worker_rate_changes_are_ignored_and_role_changes_refused() {
        let users = UserService::new(memory_db().await);
        let worker = users.register(input("anna", Role::Worker)).await.unwrap();
        let actor = Actor::worker(worker.id);

        let updated = users
            .update_user(
                actor,
                worker.id,
                UpdateUserInput {
                    full_name: Some("Anna S.".into()),
                    role: None,
                    hourly_rate: Some(dec!(999)),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Anna S.");
        assert_eq!(updated.hourly_rate, Some(dec!(180)));

        assert_matches!(
            users
                .update_user(
                    actor,
                    worker.id,
                    UpdateUserInput {
                        full_name: None,
                        role: Some(Role::Admin),
                        hourly_rate: None,
                    },
                )
                .await,
            Err(ServiceError::Forbidden(ForbiddenReason::AdminOnly))
        );
    }

    #[tokio::test]
    async fn admin_manages_accounts() {
        let users = UserService::new(memory_db().await);
        let admin = users.register(input("root", Role::Admin)).await.unwrap();
        let worker = users.register(input("anna", Role::Worker)).await.unwrap();
        let as_admin = Actor::admin(admin.id);

        let promoted = users
            .update_user(
                as_admin,
                worker.id,
                UpdateUserInput {
                    full_name: None,
                    role: Some(Role::Admin),
                    hourly_rate: Some(dec!(210)),
                },
            )
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert_eq!(promoted.hourly_rate, Some(dec!(210)));

        assert_matches!(
            users.list_users(Actor::worker(worker.id)).await,
            Err(ServiceError::Forbidden(_))
        );
        assert_eq!(users.list_users(as_admin).await.unwrap().len(), 2);

        users.delete_user(as_admin, worker.id).await.unwrap();
        assert_matches!(
            users.get_user(as_admin, worker.id).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
