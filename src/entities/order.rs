use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{FromJsonQueryResult, Set};
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// A unit of work inside an order. `id` identifies the line, `operation_id` the catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOperation {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub completed_quantity: i32,
    /// Snapshot taken at creation or assignment
    pub rate: Decimal,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub status: OperationStatus,
}

impl OrderOperation {
    pub fn new(operation_id: Uuid, quantity: i32, rate: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_id,
            quantity,
            completed_quantity: 0,
            rate,
            assigned_to: None,
            completion_date: None,
            comments: None,
            status: OperationStatus::Pending,
        }
    }

    /// Labor cost of the completed part
    pub fn earned(&self) -> Decimal {
        Decimal::from(self.completed_quantity) * self.rate
    }
}

/// Absolute material requirement of an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMaterial {
    pub material_id: Uuid,
    pub quantity: Decimal,
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildOrderLink {
    pub order_id: Uuid,
    pub reason: String,
    pub quantity: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct OrderOperations(pub Vec<OrderOperation>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct OrderMaterials(pub Vec<OrderMaterial>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ChildOrderLinks(pub Vec<ChildOrderLink>);

/// Work order aggregate. Operations, materials and child links live inside the row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub article_number: String,
    pub quantity: i32,
    #[sea_orm(column_type = "JsonBinary")]
    pub operations: OrderOperations,
    #[sea_orm(column_type = "JsonBinary")]
    pub materials: OrderMaterials,
    pub status: OrderStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub parent_order_id: Option<Uuid>,
    #[sea_orm(column_type = "JsonBinary")]
    pub child_orders: ChildOrderLinks,
    /// Bumped on every write; guards read-modify-write cycles
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn operation(&self, line_id: Uuid) -> Option<&OrderOperation> {
        self.operations.0.iter().find(|op| op.id == line_id)
    }

    pub fn is_assigned_to(&self, user_id: Uuid) -> bool {
        self.operations
            .0
            .iter()
            .any(|op| op.assigned_to == Some(user_id))
    }

    /// Sum of quantities already split off into child orders
    pub fn branched_quantity(&self) -> i32 {
        self.child_orders.0.iter().map(|c| c.quantity).sum()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        if insert {
            if self.id.is_not_set() {
                self.id = Set(Uuid::new_v4());
            }
            if self.version.is_not_set() {
                self.version = Set(1);
            }
            self.created_at = Set(now);
        }
        self.updated_at = Set(now);
        Ok(self)
    }
}
