use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, ModelTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    auth::Actor,
    entities::{
        order::Entity as OrderEntity,
        user::Entity as UserEntity,
        work_time::{self, Entity as WorkTimeEntity},
    },
    errors::{ForbiddenReason, ServiceError},
};

const MAX_HOURS_PER_ENTRY: Decimal = dec!(24);

fn validate_hours(hours: &Decimal) -> Result<(), ValidationError> {
    if (hours.is_sign_negative() && !hours.is_zero()) || *hours > MAX_HOURS_PER_ENTRY {
        return Err(ValidationError::new("hours_out_of_range"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkTimeInput {
    pub order_id: Option<Uuid>,
    pub date: NaiveDate,
    #[validate(custom = "validate_hours")]
    pub hours: Decimal,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkTimeInput {
    pub order_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    #[validate(custom = "validate_hours")]
    pub hours: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkTimeFilter {
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub approved: Option<bool>,
}

/// Hourly time tracking. Approved entries are frozen until an admin unapproves them.
#[derive(Clone)]
pub struct WorkTimeService {
    db: Arc<DatabaseConnection>,
}

impl WorkTimeService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Logs hours for the acting user at their current hourly rate.
    #[instrument(skip(self, input), fields(user_id = %actor.user_id, date = %input.date), err)]
    pub async fn create_entry(
        &self,
        actor: Actor,
        input: CreateWorkTimeInput,
    ) -> Result<work_time::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let user = UserEntity::find_by_id(actor.user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", actor.user_id)))?;
        let hourly_rate = user.hourly_rate.ok_or_else(|| {
            ServiceError::ValidationError("User has no hourly rate configured".to_string())
        })?;
        if let Some(order_id) = input.order_id {
            self.ensure_order_exists(order_id).await?;
        }

        let created = work_time::ActiveModel {
            user_id: Set(actor.user_id),
            order_id: Set(input.order_id),
            date: Set(input.date),
            hours: Set(input.hours),
            hourly_rate: Set(hourly_rate),
            description: Set(input.description),
            approved: Set(false),
            approved_by: Set(None),
            approved_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!("Failed to create work time entry: {}", e);
            ServiceError::db_error(e)
        })?;

        info!(entry_id = %created.id, hours = %created.hours, rate = %created.hourly_rate, "Work time logged");
        Ok(created)
    }

    /// Entries sorted by date, newest first. Workers only see their own.
    #[instrument(skip(self))]
    pub async fn list_entries(
        &self,
        actor: Actor,
        filter: WorkTimeFilter,
    ) -> Result<Vec<work_time::Model>, ServiceError> {
        let owner = match filter.user_id {
            Some(user_id) => {
                actor.require_self_or_admin(user_id)?;
                Some(user_id)
            }
            None if actor.is_admin() => None,
            None => Some(actor.user_id),
        };

        let mut query = WorkTimeEntity::find();
        if let Some(user_id) = owner {
            query = query.filter(work_time::Column::UserId.eq(user_id));
        }
        if let Some(order_id) = filter.order_id {
            query = query.filter(work_time::Column::OrderId.eq(order_id));
        }
        if let Some(start) = filter.start_date {
            query = query.filter(work_time::Column::Date.gte(start));
        }
        if let Some(end) = filter.end_date {
            query = query.filter(work_time::Column::Date.lte(end));
        }
        if let Some(approved) = filter.approved {
            query = query.filter(work_time::Column::Approved.eq(approved));
        }

        query
            .order_by_desc(work_time::Column::Date)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to list work time entries: {}", e);
                ServiceError::db_error(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn get_entry(&self, actor: Actor, id: Uuid) -> Result<work_time::Model, ServiceError> {
        let entry = self.find(id).await?;
        actor.require_self_or_admin(entry.user_id)?;
        Ok(entry)
    }

    #[instrument(skip(self, input), err)]
    pub async fn update_entry(
        &self,
        actor: Actor,
        id: Uuid,
        input: UpdateWorkTimeInput,
    ) -> Result<work_time::Model, ServiceError> {
        input.validate()?;
        let entry = self.editable(actor, id).await?;
        if let Some(order_id) = input.order_id {
            self.ensure_order_exists(order_id).await?;
        }

        let mut active = entry.into_active_model();
        if let Some(order_id) = input.order_id {
            active.order_id = Set(Some(order_id));
        }
        if let Some(date) = input.date {
            active.date = Set(date);
        }
        if let Some(hours) = input.hours {
            active.hours = Set(hours);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }

        let updated = active.update(&*self.db).await?;
        info!(entry_id = %id, "Work time entry updated");
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_entry(&self, actor: Actor, id: Uuid) -> Result<(), ServiceError> {
        let entry = self.editable(actor, id).await?;
        entry.delete(&*self.db).await?;
        info!(entry_id = %id, "Work time entry deleted");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn approve_entry(
        &self,
        actor: Actor,
        id: Uuid,
    ) -> Result<work_time::Model, ServiceError> {
        actor.require_admin()?;
        let entry = self.find(id).await?;

        let mut active = entry.into_active_model();
        active.approved = Set(true);
        active.approved_by = Set(Some(actor.user_id));
        active.approved_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(entry_id = %id, approved_by = %actor.user_id, "Work time entry approved");
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    pub async fn unapprove_entry(
        &self,
        actor: Actor,
        id: Uuid,
    ) -> Result<work_time::Model, ServiceError> {
        actor.require_admin()?;
        let entry = self.find(id).await?;

        let mut active = entry.into_active_model();
        active.approved = Set(false);
        active.approved_by = Set(None);
        active.approved_at = Set(None);
        let updated = active.update(&*self.db).await?;

        info!(entry_id = %id, "Work time entry unapproved");
        Ok(updated)
    }

    /// Loads an entry the actor may still change.
    async fn editable(&self, actor: Actor, id: Uuid) -> Result<work_time::Model, ServiceError> {
        let entry = self.find(id).await?;
        actor.require_self_or_admin(entry.user_id)?;
        if entry.approved {
            return Err(ServiceError::Forbidden(ForbiddenReason::RecordApproved));
        }
        Ok(entry)
    }

    async fn find(&self, id: Uuid) -> Result<work_time::Model, ServiceError> {
        WorkTimeEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Work time entry {} not found", id)))
    }

    async fn ensure_order_exists(&self, order_id: Uuid) -> Result<(), ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}
