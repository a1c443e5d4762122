use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::{
    map_write_error, materials::load_materials, operations::load_operations,
    tech_processes::find_active_for_article,
};
use crate::{
    auth::Actor,
    entities::{
        order::{
            self, ChildOrderLink, ChildOrderLinks, Entity as OrderEntity, OrderMaterial,
            OrderMaterials, OrderOperation, OrderOperations, OrderStatus,
        },
        tech_process,
        user::Entity as UserEntity,
        user_rate::{self, Entity as UserRateEntity},
    },
    errors::{ForbiddenReason, ServiceError},
    lifecycle::{
        apply_completion, derive_materials, derive_operations, plan_branch, roll_up,
        CatalogSnapshot, OrderProgress,
    },
    middleware_helpers::{with_retry, RetryConfig, ServiceRetryPolicy},
};

/// Operation line as supplied by a client. Omitted fields fall back to the
/// order quantity, the catalog default rate, or the line being replaced.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOperationInput {
    /// Existing line to replace; ignored on creation
    pub id: Option<Uuid>,
    pub operation_id: Uuid,
    pub quantity: Option<i32>,
    pub completed_quantity: Option<i32>,
    pub rate: Option<Decimal>,
    pub assigned_to: Option<Uuid>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMaterialInput {
    pub material_id: Uuid,
    pub quantity: Decimal,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    #[validate(length(min = 1, max = 100))]
    pub order_number: String,
    #[validate(length(min = 1, max = 100))]
    pub article_number: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[serde(default)]
    pub operations: Vec<OrderOperationInput>,
    #[serde(default)]
    pub materials: Vec<OrderMaterialInput>,
    pub status: Option<OrderStatus>,
    pub comments: Option<String>,
    pub parent_order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderInput {
    #[validate(length(min = 1, max = 100))]
    pub order_number: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub article_number: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: Option<i32>,
    pub operations: Option<Vec<OrderOperationInput>>,
    pub materials: Option<Vec<OrderMaterialInput>>,
    pub status: Option<OrderStatus>,
    pub end_date: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BranchOrderInput {
    #[validate(length(min = 1, max = 100))]
    pub order_number: String,
    pub quantity: i32,
    pub reason: String,
    pub article_number: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgressInput {
    pub completed_quantity: Option<i32>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignOperationInput {
    /// `None` removes the assignee
    pub user_id: Option<Uuid>,
}

/// Exact-match filters; the date range applies to `start_date`, whole days inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub order_number: Option<String>,
    pub article_number: Option<String>,
    pub status: Option<OrderStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub user_id: Option<Uuid>,
}

/// Order lifecycle engine: creation, branching, progress and assignment.
///
/// Every read-modify-write of an order runs in a transaction and is committed
/// only if the row still carries the version that was read. Lost races are
/// retried a few times before `ConcurrentModification` reaches the caller.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    retry: RetryConfig,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Creates an order. Without explicit operations or materials the active
    /// tech process for the article fills them in.
    #[instrument(skip(self, input), fields(order_number = %input.order_number), err)]
    pub async fn create_order(
        &self,
        actor: Actor,
        input: CreateOrderInput,
    ) -> Result<order::Model, ServiceError> {
        actor.require_admin()?;
        input.validate()?;
        let db = &*self.db;

        ensure_order_number_free(db, &input.order_number, None).await?;
        if let Some(parent_id) = input.parent_order_id {
            find_order(db, parent_id).await?;
        }

        let now = Utc::now();
        let (operations, materials) = self.resolve_contents(&input, now).await?;
        let status = input.status.unwrap_or_default();

        let order_number = input.order_number.clone();
        let created = order::ActiveModel {
            order_number: Set(input.order_number),
            article_number: Set(input.article_number),
            quantity: Set(input.quantity),
            operations: Set(OrderOperations(operations)),
            materials: Set(OrderMaterials(materials)),
            status: Set(status),
            start_date: Set(now),
            end_date: Set((status == OrderStatus::Completed).then_some(now)),
            comments: Set(input.comments),
            parent_order_id: Set(input.parent_order_id),
            child_orders: Set(ChildOrderLinks::default()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| {
            map_write_error(e, || {
                format!("Order number {} already exists", order_number)
            })
        })?;

        info!(
            order_id = %created.id,
            order_number = %created.order_number,
            quantity = created.quantity,
            operations = created.operations.0.len(),
            materials = created.materials.0.len(),
            "Order created"
        );
        Ok(created)
    }

    /// Lists orders, newest first. Workers only see orders they are assigned to.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        actor: Actor,
        filter: OrderFilter,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let assignee = match filter.user_id {
            Some(user_id) => {
                actor.require_self_or_admin(user_id)?;
                Some(user_id)
            }
            None if actor.is_admin() => None,
            None => Some(actor.user_id),
        };

        let mut query = OrderEntity::find();
        if let Some(number) = &filter.order_number {
            query = query.filter(order::Column::OrderNumber.eq(number.as_str()));
        }
        if let Some(article) = &filter.article_number {
            query = query.filter(order::Column::ArticleNumber.eq(article.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(start) = filter.start_date {
            query = query.filter(order::Column::StartDate.gte(start_of_day(start)));
        }
        if let Some(end) = filter.end_date {
            query = query.filter(order::Column::StartDate.lt(start_of_day(end) + Duration::days(1)));
        }

        let orders = query
            .order_by_desc(order::Column::StartDate)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to list orders: {}", e);
                ServiceError::db_error(e)
            })?;

        Ok(match assignee {
            Some(user_id) => orders
                .into_iter()
                .filter(|o| o.is_assigned_to(user_id))
                .collect(),
            None => orders,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, actor: Actor, id: Uuid) -> Result<order::Model, ServiceError> {
        let order = find_order(&*self.db, id).await?;
        if !actor.is_admin() && !order.is_assigned_to(actor.user_id) {
            return Err(ServiceError::Forbidden(ForbiddenReason::NotAssignee));
        }
        Ok(order)
    }

    /// Admin full edit. Replaced operation lines keep the progress of the line
    /// they replace unless the input overrides it.
    #[instrument(skip(self, input), err)]
    pub async fn update_order(
        &self,
        actor: Actor,
        id: Uuid,
        input: UpdateOrderInput,
    ) -> Result<order::Model, ServiceError> {
        actor.require_admin()?;
        input.validate()?;

        with_retry(&self.retry, ServiceRetryPolicy, || self.update_order_once(id, &input)).await
    }

    async fn update_order_once(
        &self,
        id: Uuid,
        input: &UpdateOrderInput,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let mut order = find_order(&txn, id).await?;
        let now = Utc::now();

        if let Some(number) = &input.order_number {
            if *number != order.order_number {
                ensure_order_number_free(&txn, number, Some(id)).await?;
            }
            order.order_number = number.clone();
        }
        if let Some(article) = &input.article_number {
            order.article_number = article.clone();
        }
        if let Some(quantity) = input.quantity {
            let branched = order.branched_quantity();
            if quantity < branched {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity {} is below the {} units already branched off",
                    quantity, branched
                )));
            }
            order.quantity = quantity;
        }
        if let Some(lines) = &input.operations {
            let catalog = load_operations(&txn, lines.iter().map(|l| l.operation_id)).await?;
            ensure_users_exist(&txn, lines.iter().filter_map(|l| l.assigned_to)).await?;
            let mut rebuilt = Vec::with_capacity(lines.len());
            for line in lines {
                let previous = line.id.and_then(|line_id| order.operation(line_id));
                let default_rate = catalog
                    .get(&line.operation_id)
                    .map(|op| op.default_rate)
                    .unwrap_or_default();
                rebuilt.push(build_operation_line(
                    line,
                    order.quantity,
                    default_rate,
                    previous,
                    now,
                )?);
            }
            order.operations = OrderOperations(rebuilt);
        }
        if let Some(materials) = &input.materials {
            order.materials = OrderMaterials(build_materials(&txn, materials).await?);
        }
        if let Some(comments) = &input.comments {
            order.comments = Some(comments.clone());
        }
        if let Some(end_date) = input.end_date {
            order.end_date = Some(end_date);
        }
        if let Some(status) = input.status {
            order.status = status;
            if status == OrderStatus::Completed && input.end_date.is_none() {
                order.end_date = Some(now);
            }
        }

        let saved = save_versioned(&txn, order).await?;
        txn.commit().await?;

        info!(order_id = %saved.id, version = saved.version, "Order updated");
        Ok(saved)
    }

    /// Deletes a leaf order and unlinks it from its parent in the same transaction.
    #[instrument(skip(self), err)]
    pub async fn delete_order(&self, actor: Actor, id: Uuid) -> Result<(), ServiceError> {
        actor.require_admin()?;
        with_retry(&self.retry, ServiceRetryPolicy, || self.delete_order_once(id)).await
    }

    async fn delete_order_once(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let order = find_order(&txn, id).await?;

        if !order.child_orders.0.is_empty() {
            return Err(ServiceError::Conflict(format!(
                "Order {} has {} child orders; delete them first",
                order.order_number,
                order.child_orders.0.len()
            )));
        }

        if let Some(parent_id) = order.parent_order_id {
            match OrderEntity::find_by_id(parent_id).one(&txn).await? {
                Some(mut parent) => {
                    parent.child_orders.0.retain(|link| link.order_id != id);
                    save_versioned(&txn, parent).await?;
                }
                None => warn!(order_id = %id, %parent_id, "Parent order already gone"),
            }
        }

        delete_versioned(&txn, &order).await?;
        txn.commit().await?;
        let order_number = order.order_number;

        info!(order_id = %id, %order_number, "Order deleted");
        Ok(())
    }

    /// Splits `quantity` units of the parent into a new child order.
    ///
    /// The child insert and the parent's link append share one transaction, so
    /// a rejected or failed branch leaves no trace.
    #[instrument(skip(self, input), fields(order_number = %input.order_number, quantity = input.quantity), err)]
    pub async fn branch_order(
        &self,
        actor: Actor,
        parent_id: Uuid,
        input: BranchOrderInput,
    ) -> Result<order::Model, ServiceError> {
        actor.require_admin()?;
        input.validate()?;
        if input.reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Branch reason is required".to_string(),
            ));
        }

        with_retry(&self.retry, ServiceRetryPolicy, || {
            self.branch_order_once(parent_id, &input)
        })
        .await
    }

    async fn branch_order_once(
        &self,
        parent_id: Uuid,
        input: &BranchOrderInput,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        ensure_order_number_free(&txn, &input.order_number, None).await?;
        let mut parent = find_order(&txn, parent_id).await?;
        let plan = plan_branch(&parent, input.quantity)?;

        let now = Utc::now();
        let order_number = input.order_number.clone();
        let child = order::ActiveModel {
            order_number: Set(input.order_number.clone()),
            article_number: Set(input
                .article_number
                .clone()
                .unwrap_or_else(|| parent.article_number.clone())),
            quantity: Set(plan.quantity),
            operations: Set(OrderOperations(plan.operations)),
            materials: Set(OrderMaterials(plan.materials)),
            status: Set(OrderStatus::Created),
            start_date: Set(now),
            end_date: Set(None),
            comments: Set(input.comments.clone()),
            parent_order_id: Set(Some(parent.id)),
            child_orders: Set(ChildOrderLinks::default()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            map_write_error(e, || {
                format!("Order number {} already exists", order_number)
            })
        })?;

        parent.child_orders.0.push(ChildOrderLink {
            order_id: child.id,
            reason: input.reason.trim().to_string(),
            quantity: plan.quantity,
        });
        let parent = save_versioned(&txn, parent).await?;
        txn.commit().await?;

        info!(
            parent_id = %parent.id,
            child_id = %child.id,
            quantity = child.quantity,
            remaining = parent.quantity - parent.branched_quantity(),
            "Order branched"
        );
        Ok(child)
    }

    /// Records progress on one operation line and rolls the order status up.
    /// Only admins and the line's assignee may report progress.
    #[instrument(skip(self, input), err)]
    pub async fn update_operation_progress(
        &self,
        actor: Actor,
        order_id: Uuid,
        line_id: Uuid,
        input: OperationProgressInput,
    ) -> Result<order::Model, ServiceError> {
        with_retry(&self.retry, ServiceRetryPolicy, || {
            self.update_operation_progress_once(actor, order_id, line_id, &input)
        })
        .await
    }

    async fn update_operation_progress_once(
        &self,
        actor: Actor,
        order_id: Uuid,
        line_id: Uuid,
        input: &OperationProgressInput,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let mut order = find_order(&txn, order_id).await?;
        let now = Utc::now();

        let line = order
            .operations
            .0
            .iter_mut()
            .find(|op| op.id == line_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Operation {} not found in order {}",
                    line_id, order_id
                ))
            })?;

        if !actor.is_admin() && line.assigned_to != Some(actor.user_id) {
            return Err(ServiceError::Forbidden(ForbiddenReason::NotAssignee));
        }

        if let Some(completed) = input.completed_quantity {
            apply_completion(line, completed, now)?;
        }
        if let Some(comments) = &input.comments {
            line.comments = Some(comments.clone());
        }
        let line_status = line.status;

        let progress = roll_up(
            OrderProgress {
                status: order.status,
                end_date: order.end_date,
            },
            &order.operations.0,
            now,
        );
        let previous_status = order.status;
        order.status = progress.status;
        order.end_date = progress.end_date;

        let saved = save_versioned(&txn, order).await?;
        txn.commit().await?;

        info!(
            order_id = %saved.id,
            %line_id,
            operation_status = %line_status,
            order_status = %saved.status,
            status_changed = previous_status != saved.status,
            "Operation progress recorded"
        );
        Ok(saved)
    }

    /// Sets or clears the assignee of an operation line. A per-worker rate
    /// override, when one exists, replaces the line's rate.
    #[instrument(skip(self, input), err)]
    pub async fn assign_operation(
        &self,
        actor: Actor,
        order_id: Uuid,
        line_id: Uuid,
        input: AssignOperationInput,
    ) -> Result<order::Model, ServiceError> {
        actor.require_admin()?;
        if let Some(user_id) = input.user_id {
            ensure_users_exist(&*self.db, [user_id]).await?;
        }

        with_retry(&self.retry, ServiceRetryPolicy, || {
            self.assign_operation_once(order_id, line_id, input.user_id)
        })
        .await
    }

    async fn assign_operation_once(
        &self,
        order_id: Uuid,
        line_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let mut order = find_order(&txn, order_id).await?;

        let line = order
            .operations
            .0
            .iter_mut()
            .find(|op| op.id == line_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Operation {} not found in order {}",
                    line_id, order_id
                ))
            })?;

        if let Some(user_id) = user_id {
            let override_rate = UserRateEntity::find()
                .filter(user_rate::Column::UserId.eq(user_id))
                .filter(user_rate::Column::OperationId.eq(line.operation_id))
                .one(&txn)
                .await?;

            if let Some(rate) = override_rate {
                if line.completed_quantity > 0 && line.rate != rate.rate {
                    warn!(
                        %order_id,
                        %line_id,
                        old_rate = %line.rate,
                        new_rate = %rate.rate,
                        completed = line.completed_quantity,
                        "Reassignment replaces the rate of already completed units"
                    );
                }
                line.rate = rate.rate;
            }
        }
        line.assigned_to = user_id;

        let saved = save_versioned(&txn, order).await?;
        txn.commit().await?;

        info!(order_id = %saved.id, %line_id, assignee = ?user_id, "Operation assigned");
        Ok(saved)
    }

    async fn resolve_contents(
        &self,
        input: &CreateOrderInput,
        now: DateTime<Utc>,
    ) -> Result<(Vec<OrderOperation>, Vec<OrderMaterial>), ServiceError> {
        let db = &*self.db;

        let catalog = load_operations(db, input.operations.iter().map(|l| l.operation_id)).await?;
        ensure_users_exist(db, input.operations.iter().filter_map(|l| l.assigned_to)).await?;
        let mut operations = input
            .operations
            .iter()
            .map(|line| {
                let default_rate = catalog
                    .get(&line.operation_id)
                    .map(|op| op.default_rate)
                    .unwrap_or_default();
                build_operation_line(line, input.quantity, default_rate, None, now)
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;
        let mut materials = build_materials(db, &input.materials).await?;

        let needs_operations = operations.is_empty();
        let needs_materials = materials.is_empty();
        if needs_operations || needs_materials {
            if let Some(process) = find_active_for_article(db, &input.article_number).await? {
                let snapshot =
                    catalog_snapshot(db, &process, needs_operations, needs_materials).await?;
                if needs_operations {
                    operations = derive_operations(&process, input.quantity, &snapshot)?;
                }
                if needs_materials {
                    materials = derive_materials(&process, input.quantity, &snapshot)?;
                }
                info!(
                    tech_process_id = %process.id,
                    article_number = %process.article_number,
                    needs_operations,
                    needs_materials,
                    "Order contents derived from tech process"
                );
            }
        }

        Ok((operations, materials))
    }
}

/// Writes the whole order back if nobody changed it since it was read.
async fn save_versioned(
    txn: &DatabaseTransaction,
    mut order: order::Model,
) -> Result<order::Model, ServiceError> {
    let id = order.id;
    let read_version = order.version;
    order.version = read_version + 1;
    order.updated_at = Utc::now();

    let active = order.clone().into_active_model().reset_all();
    let result = OrderEntity::update_many()
        .set(active)
        .filter(order::Column::Id.eq(id))
        .filter(order::Column::Version.eq(read_version))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        warn!(order_id = %id, read_version, "Order changed concurrently");
        return Err(ServiceError::ConcurrentModification(id));
    }
    Ok(order)
}

/// Deletes the order only if it still carries the version that was read, so a
/// child branched off in the meantime is never orphaned.
async fn delete_versioned(
    txn: &DatabaseTransaction,
    order: &order::Model,
) -> Result<(), ServiceError> {
    let result = OrderEntity::delete_many()
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Version.eq(order.version))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        warn!(order_id = %order.id, read_version = order.version, "Order changed before delete");
        return Err(ServiceError::ConcurrentModification(order.id));
    }
    Ok(())
}

async fn find_order<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<order::Model, ServiceError> {
    OrderEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
}

async fn ensure_order_number_free<C: ConnectionTrait>(
    conn: &C,
    order_number: &str,
    except: Option<Uuid>,
) -> Result<(), ServiceError> {
    let mut query = OrderEntity::find().filter(order::Column::OrderNumber.eq(order_number));
    if let Some(id) = except {
        query = query.filter(order::Column::Id.ne(id));
    }
    if query.one(conn).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "Order number {} already exists",
            order_number
        )));
    }
    Ok(())
}

async fn ensure_users_exist<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<(), ServiceError> {
    let ids: Vec<Uuid> = ids.into_iter().collect();
    for id in ids {
        if UserEntity::find_by_id(id).one(conn).await?.is_none() {
            return Err(ServiceError::NotFound(format!("User {} not found", id)));
        }
    }
    Ok(())
}

async fn catalog_snapshot<C: ConnectionTrait>(
    conn: &C,
    process: &tech_process::Model,
    with_operations: bool,
    with_materials: bool,
) -> Result<CatalogSnapshot, ServiceError> {
    let operations = if with_operations {
        load_operations(conn, process.operations.0.iter().map(|s| s.operation_id)).await?
    } else {
        HashMap::new()
    };
    let materials = if with_materials {
        load_materials(conn, process.materials.0.iter().map(|m| m.material_id)).await?
    } else {
        HashMap::new()
    };

    Ok(CatalogSnapshot {
        operation_rates: operations
            .into_iter()
            .map(|(id, op)| (id, op.default_rate))
            .collect(),
        material_units: materials
            .into_iter()
            .map(|(id, m)| (id, m.unit))
            .collect(),
    })
}

async fn build_materials<C: ConnectionTrait>(
    conn: &C,
    inputs: &[OrderMaterialInput],
) -> Result<Vec<OrderMaterial>, ServiceError> {
    let catalog = load_materials(conn, inputs.iter().map(|m| m.material_id)).await?;
    inputs
        .iter()
        .map(|input| {
            if input.quantity.is_sign_negative() && !input.quantity.is_zero() {
                return Err(ServiceError::ValidationError(
                    "Material quantity cannot be negative".to_string(),
                ));
            }
            let unit = match &input.unit {
                Some(unit) => unit.clone(),
                None => catalog
                    .get(&input.material_id)
                    .map(|m| m.unit.clone())
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Material {} not found", input.material_id))
                    })?,
            };
            Ok(OrderMaterial {
                material_id: input.material_id,
                quantity: input.quantity,
                unit,
            })
        })
        .collect()
}

fn build_operation_line(
    input: &OrderOperationInput,
    order_quantity: i32,
    default_rate: Decimal,
    previous: Option<&OrderOperation>,
    now: DateTime<Utc>,
) -> Result<OrderOperation, ServiceError> {
    let quantity = input.quantity.unwrap_or(order_quantity);
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Operation quantity must be greater than zero".to_string(),
        ));
    }
    let rate = input
        .rate
        .or_else(|| previous.map(|p| p.rate))
        .unwrap_or(default_rate);
    if rate.is_sign_negative() && !rate.is_zero() {
        return Err(ServiceError::ValidationError(
            "Operation rate cannot be negative".to_string(),
        ));
    }

    let mut line = previous
        .cloned()
        .unwrap_or_else(|| OrderOperation::new(input.operation_id, quantity, rate));
    line.operation_id = input.operation_id;
    line.quantity = quantity;
    line.rate = rate;
    if input.assigned_to.is_some() {
        line.assigned_to = input.assigned_to;
    }
    if input.comments.is_some() {
        line.comments = input.comments.clone();
    }

    let completed_before = line.completion_date;
    let completed = input.completed_quantity.unwrap_or(line.completed_quantity);
    apply_completion(&mut line, completed, now)?;
    if line.completion_date.is_some() && completed_before.is_some() {
        line.completion_date = completed_before;
    }
    Ok(line)
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::OperationStatus;
    use crate::services::test_support::memory_db;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn line_input(operation_id: Uuid) -> OrderOperationInput {
        OrderOperationInput {
            id: None,
            operation_id,
            quantity: None,
            completed_quantity: None,
            rate: None,
            assigned_to: None,
            comments: None,
        }
    }

    #[test]
    fn new_lines_default_to_order_quantity_and_catalog_rate() {
        let op = Uuid::new_v4();
        let line = build_operation_line(&line_input(op), 10, dec!(100), None, Utc::now()).unwrap();

        assert_eq!(line.quantity, 10);
        assert_eq!(line.rate, dec!(100));
        assert_eq!(line.completed_quantity, 0);
        assert_eq!(line.status, OperationStatus::Pending);
    }

    #[test]
    fn replaced_lines_keep_progress_and_completion_date() {
        let op = Uuid::new_v4();
        let done_at = Utc::now() - Duration::days(2);
        let mut previous = OrderOperation::new(op, 5, dec!(40));
        previous.completed_quantity = 5;
        previous.status = OperationStatus::Completed;
        previous.completion_date = Some(done_at);

        let mut input = line_input(op);
        input.id = Some(previous.id);
        let line = build_operation_line(&input, 5, dec!(10), Some(&previous), Utc::now()).unwrap();

        assert_eq!(line.id, previous.id);
        assert_eq!(line.rate, dec!(40));
        assert_eq!(line.status, OperationStatus::Completed);
        assert_eq!(line.completion_date, Some(done_at));
    }

    #[test]
    fn explicit_lines_cannot_overshoot_quantity() {
        let mut input = line_input(Uuid::new_v4());
        input.quantity = Some(3);
        input.completed_quantity = Some(4);

        let err = build_operation_line(&input, 10, dec!(1), None, Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn day_bounds_are_utc_midnight() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(start_of_day(day).to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    async fn seeded_order(service: &OrderService, number: &str, quantity: i32) -> order::Model {
        service
            .create_order(
                Actor::admin(Uuid::new_v4()),
                CreateOrderInput {
                    order_number: number.into(),
                    article_number: "NO-TEMPLATE".into(),
                    quantity,
                    operations: vec![],
                    materials: vec![],
                    status: None,
                    comments: None,
                    parent_order_id: None,
                },
            )
            .await
            .unwrap()
    }

    fn assert_send<T: Send>(_: T) {}

    #[tokio::test]
    async fn writes_with_assignees_can_run_in_handlers() {
        let service = OrderService::new(memory_db().await);
        let admin = Actor::admin(Uuid::new_v4());
        let mut line = line_input(Uuid::new_v4());
        line.assigned_to = Some(Uuid::new_v4());

        assert_send(service.create_order(
            admin,
            CreateOrderInput {
                order_number: "ORD-A".into(),
                article_number: "NO-TEMPLATE".into(),
                quantity: 1,
                operations: vec![line.clone()],
                materials: vec![],
                status: None,
                comments: None,
                parent_order_id: None,
            },
        ));
        assert_send(service.update_order(
            admin,
            Uuid::new_v4(),
            UpdateOrderInput {
                operations: Some(vec![line]),
                ..Default::default()
            },
        ));
    }

    #[tokio::test]
    async fn stale_write_is_a_concurrent_modification() {
        let db = memory_db().await;
        let service = OrderService::new(db.clone());
        let order = seeded_order(&service, "ORD-S", 5).await;
        let stale = order.clone();

        let txn = db.begin().await.unwrap();
        let mut first = order;
        first.comments = Some("first writer".into());
        let saved = save_versioned(&txn, first).await.unwrap();
        assert_eq!(saved.version, stale.version + 1);

        let result = save_versioned(&txn, stale).await;
        assert!(matches!(
            result,
            Err(ServiceError::ConcurrentModification(id)) if id == saved.id
        ));
        txn.commit().await.unwrap();

        let stored = find_order(&*db, saved.id).await.unwrap();
        assert_eq!(stored.version, saved.version);
        assert_eq!(stored.comments.as_deref(), Some("first writer"));
    }

    #[tokio::test]
    async fn lost_race_is_retried_against_a_fresh_read() {
        let db = memory_db().await;
        let service = OrderService::new(db.clone());
        let order = seeded_order(&service, "ORD-R", 5).await;
        let attempts = AtomicU32::new(0);
        let fast = RetryConfig {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            backoff_factor: 2.0,
        };

        let saved = with_retry(&fast, ServiceRetryPolicy, || async {
            let snapshot = find_order(&*db, order.id).await?;
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                // another writer commits between our read and our write
                let txn = db.begin().await?;
                let mut other = snapshot.clone();
                other.comments = Some("other writer".into());
                save_versioned(&txn, other).await?;
                txn.commit().await?;
            }

            let txn = db.begin().await?;
            let mut mine = snapshot;
            mine.status = OrderStatus::InProgress;
            let saved = save_versioned(&txn, mine).await?;
            txn.commit().await?;
            Ok::<_, ServiceError>(saved)
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(saved.version, order.version + 2);
        assert_eq!(saved.status, OrderStatus::InProgress);
        assert_eq!(saved.comments.as_deref(), Some("other writer"));
    }

    #[tokio::test]
    async fn delete_from_a_stale_read_never_orphans_a_new_child() {
        let db = memory_db().await;
        let service = OrderService::new(db.clone());
        let admin = Actor::admin(Uuid::new_v4());
        let parent = seeded_order(&service, "ORD-P", 10).await;
        let snapshot = find_order(&*db, parent.id).await.unwrap();
        assert!(snapshot.child_orders.0.is_empty());

        let child = service
            .branch_order(
                admin,
                parent.id,
                BranchOrderInput {
                    order_number: "ORD-C".into(),
                    quantity: 3,
                    reason: "rush".into(),
                    article_number: None,
                    comments: None,
                },
            )
            .await
            .unwrap();

        let txn = db.begin().await.unwrap();
        let result = delete_versioned(&txn, &snapshot).await;
        assert!(matches!(result, Err(ServiceError::ConcurrentModification(_))));
        txn.rollback().await.unwrap();

        assert!(find_order(&*db, parent.id).await.is_ok());
        let child = find_order(&*db, child.id).await.unwrap();
        assert_eq!(child.parent_order_id, Some(parent.id));

        // a fresh read sees the child and refuses
        assert!(matches!(
            service.delete_order(admin, parent.id).await,
            Err(ServiceError::Conflict(_))
        ));
    }
}
