mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use common::TestApp;
use futures::future::join_all;
use rust_decimal_macros::dec;
use sklad_api::{
    entities::order::{OperationStatus, OrderStatus},
    errors::{ForbiddenReason, ServiceError},
    services::{
        operations::{CreateOperationInput, UpsertUserRateInput},
        orders::{
            AssignOperationInput, BranchOrderInput, CreateOrderInput, OperationProgressInput,
            OrderFilter, OrderOperationInput,
        },
        reports::OrderReportQuery,
    },
};
use uuid::Uuid;

fn order_from_article(number: &str, article: &str, quantity: i32) -> CreateOrderInput {
    CreateOrderInput {
        order_number: number.to_string(),
        article_number: article.to_string(),
        quantity,
        operations: vec![],
        materials: vec![],
        status: None,
        comments: None,
        parent_order_id: None,
    }
}

fn line(operation_id: Uuid) -> OrderOperationInput {
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

fn progress(completed: i32) -> OperationProgressInput {
    OperationProgressInput {
        completed_quantity: Some(completed),
        comments: None,
    }
}

fn branch(number: &str, quantity: i32) -> BranchOrderInput {
    BranchOrderInput {
        order_number: number.to_string(),
        quantity,
        reason: "Split for second shift".to_string(),
        article_number: None,
        comments: None,
    }
}

#[tokio::test]
async fn order_contents_come_from_tech_process() {
    let app = TestApp::new().await;
    let catalog = app.seed_tp1().await;

    let order = app
        .state
        .services
        .orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Created);
    assert!(order.end_date.is_none());
    assert_eq!(order.operations.0.len(), 1);
    let op = &order.operations.0[0];
    assert_eq!(op.operation_id, catalog.cut.id);
    assert_eq!(op.quantity, 10);
    assert_eq!(op.completed_quantity, 0);
    assert_eq!(op.rate, dec!(100));
    assert_eq!(op.status, OperationStatus::Pending);

    assert_eq!(order.materials.0.len(), 1);
    assert_eq!(order.materials.0[0].material_id, catalog.m1.id);
    assert_eq!(order.materials.0[0].quantity, dec!(20));
    assert_eq!(order.materials.0[0].unit, "kg");
}

#[tokio::test]
async fn completing_all_operations_completes_order_and_feeds_report() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let order = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    let line_id = order.operations.0[0].id;

    let done = orders
        .update_operation_progress(app.admin_actor(), order.id, line_id, progress(10))
        .await
        .unwrap();

    assert_eq!(done.status, OrderStatus::Completed);
    assert!(done.end_date.is_some());
    assert_eq!(done.operations.0[0].status, OperationStatus::Completed);
    assert!(done.operations.0[0].completion_date.is_some());

    let today = Utc::now().date_naive();
    let report = app
        .state
        .services
        .reports
        .order_report(
            app.admin_actor(),
            OrderReportQuery {
                start_date: Some(today),
                end_date: Some(today),
                status: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.statistics.total_orders, 1);
    assert_eq!(report.statistics.completed_orders, 1);
    assert_eq!(report.statistics.total_material_cost, dec!(1000));
    assert_eq!(report.statistics.total_work_cost, dec!(1000));
    assert_eq!(report.statistics.total_cost, dec!(2000));
    assert_eq!(report.orders[0].completion_percentage, 100);
}

#[tokio::test]
async fn partial_progress_moves_order_forward_and_never_back_to_created() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let order = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    let line_id = order.operations.0[0].id;

    let half = orders
        .update_operation_progress(app.admin_actor(), order.id, line_id, progress(5))
        .await
        .unwrap();
    assert_eq!(half.status, OrderStatus::InProgress);
    assert_eq!(half.operations.0[0].status, OperationStatus::InProgress);

    let reset = orders
        .update_operation_progress(app.admin_actor(), order.id, line_id, progress(0))
        .await
        .unwrap();
    assert_eq!(reset.status, OrderStatus::InProgress);
    assert_eq!(reset.operations.0[0].status, OperationStatus::Pending);
    assert!(reset.end_date.is_none());
}

#[tokio::test]
async fn reopening_a_completed_operation_reopens_the_order() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let order = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    let line_id = order.operations.0[0].id;

    orders
        .update_operation_progress(app.admin_actor(), order.id, line_id, progress(10))
        .await
        .unwrap();
    let reopened = orders
        .update_operation_progress(app.admin_actor(), order.id, line_id, progress(9))
        .await
        .unwrap();

    assert_eq!(reopened.status, OrderStatus::InProgress);
    assert!(reopened.end_date.is_none());
    assert!(reopened.operations.0[0].completion_date.is_none());
}

#[tokio::test]
async fn over_completion_is_rejected_without_changes() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let order = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    let line_id = order.operations.0[0].id;

    let result = orders
        .update_operation_progress(app.admin_actor(), order.id, line_id, progress(11))
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let negative = orders
        .update_operation_progress(app.admin_actor(), order.id, line_id, progress(-1))
        .await;
    assert_matches!(negative, Err(ServiceError::ValidationError(_)));

    let stored = orders.get_order(app.admin_actor(), order.id).await.unwrap();
    assert_eq!(stored.version, order.version);
    assert_eq!(stored.status, OrderStatus::Created);
    assert_eq!(stored.operations.0[0].completed_quantity, 0);
    assert_eq!(stored.operations.0[0].status, OperationStatus::Pending);
}

#[tokio::test]
async fn unknown_operation_line_is_not_found() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let order = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();

    let result = orders
        .update_operation_progress(app.admin_actor(), order.id, Uuid::new_v4(), progress(1))
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn branching_splits_quantity_and_scales_materials() {
    let app = TestApp::new().await;
    let catalog = app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let parent = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();

    let child = orders
        .branch_order(app.admin_actor(), parent.id, branch("ORD2", 4))
        .await
        .unwrap();

    assert_eq!(child.quantity, 4);
    assert_eq!(child.parent_order_id, Some(parent.id));
    assert_eq!(child.article_number, "TP1");
    assert_eq!(child.status, OrderStatus::Created);
    assert_eq!(child.operations.0.len(), 1);
    assert_eq!(child.operations.0[0].operation_id, catalog.cut.id);
    assert_eq!(child.operations.0[0].quantity, 4);
    assert_eq!(child.operations.0[0].completed_quantity, 0);
    assert_eq!(child.materials.0[0].quantity, dec!(8));

    let parent = orders.get_order(app.admin_actor(), parent.id).await.unwrap();
    assert_eq!(parent.quantity, 10);
    assert_eq!(parent.child_orders.0.len(), 1);
    assert_eq!(parent.child_orders.0[0].order_id, child.id);
    assert_eq!(parent.child_orders.0[0].quantity, 4);
    assert_eq!(parent.child_orders.0[0].reason, "Split for second shift");
}

#[tokio::test]
async fn branching_beyond_capacity_is_rejected_atomically() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let parent = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    orders
        .branch_order(app.admin_actor(), parent.id, branch("ORD2", 4))
        .await
        .unwrap();

    let result = orders
        .branch_order(app.admin_actor(), parent.id, branch("ORD3", 7))
        .await;
    assert_matches!(
        result,
        Err(ServiceError::CapacityExceeded {
            requested: 7,
            available: 6
        })
    );

    let parent = orders.get_order(app.admin_actor(), parent.id).await.unwrap();
    assert_eq!(parent.child_orders.0.len(), 1);
    let stray = orders
        .list_orders(
            app.admin_actor(),
            OrderFilter {
                order_number: Some("ORD3".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(stray.is_empty());

    // the remaining six still fit
    orders
        .branch_order(app.admin_actor(), parent.id, branch("ORD3", 6))
        .await
        .unwrap();
}

#[tokio::test]
async fn branch_requires_positive_quantity_and_reason() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let parent = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();

    let zero = orders
        .branch_order(app.admin_actor(), parent.id, branch("ORD2", 0))
        .await;
    assert_matches!(zero, Err(ServiceError::ValidationError(_)));

    let mut no_reason = branch("ORD2", 2);
    no_reason.reason = "   ".into();
    let result = orders
        .branch_order(app.admin_actor(), parent.id, no_reason)
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn orders_with_children_cannot_be_deleted() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let parent = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    let child = orders
        .branch_order(app.admin_actor(), parent.id, branch("ORD2", 4))
        .await
        .unwrap();

    let result = orders.delete_order(app.admin_actor(), parent.id).await;
    assert_matches!(result, Err(ServiceError::Conflict(_)));

    orders.delete_order(app.admin_actor(), child.id).await.unwrap();
    let parent_after = orders.get_order(app.admin_actor(), parent.id).await.unwrap();
    assert!(parent_after.child_orders.0.is_empty());

    orders.delete_order(app.admin_actor(), parent.id).await.unwrap();
    assert_matches!(
        orders.get_order(app.admin_actor(), parent.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn concurrent_progress_on_different_lines_keeps_both_updates() {
    let app = TestApp::new().await;
    let catalog = app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let mut input = order_from_article("ORD1", "TP1", 10);
    input.operations = vec![line(catalog.cut.id), line(catalog.cut.id)];
    let order = orders.create_order(app.admin_actor(), input).await.unwrap();
    let first = order.operations.0[0].id;
    let second = order.operations.0[1].id;

    let results = join_all([
        orders.update_operation_progress(app.admin_actor(), order.id, first, progress(10)),
        orders.update_operation_progress(app.admin_actor(), order.id, second, progress(10)),
    ])
    .await;
    for result in results {
        result.unwrap();
    }

    let stored = orders.get_order(app.admin_actor(), order.id).await.unwrap();
    assert!(stored
        .operations
        .0
        .iter()
        .all(|op| op.completed_quantity == 10 && op.status == OperationStatus::Completed));
    assert_eq!(stored.status, OrderStatus::Completed);
    assert_eq!(stored.version, order.version + 2);
}

#[tokio::test]
async fn only_the_assignee_may_report_progress() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    let order = orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    let line_id = order.operations.0[0].id;

    let denied = orders
        .update_operation_progress(app.worker_actor(), order.id, line_id, progress(3))
        .await;
    assert_matches!(
        denied,
        Err(ServiceError::Forbidden(ForbiddenReason::NotAssignee))
    );
    assert_matches!(
        orders.get_order(app.worker_actor(), order.id).await,
        Err(ServiceError::Forbidden(_))
    );

    orders
        .assign_operation(
            app.admin_actor(),
            order.id,
            line_id,
            AssignOperationInput {
                user_id: Some(app.worker.id),
            },
        )
        .await
        .unwrap();

    let updated = orders
        .update_operation_progress(app.worker_actor(), order.id, line_id, progress(3))
        .await
        .unwrap();
    assert_eq!(updated.operations.0[0].completed_quantity, 3);

    let visible = orders
        .list_orders(app.worker_actor(), OrderFilter::default())
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, order.id);
}

#[tokio::test]
async fn assignment_applies_worker_rate_override() {
    let app = TestApp::new().await;
    let catalog = app.seed_tp1().await;
    let services = &app.state.services;

    services
        .operations
        .upsert_user_rate(UpsertUserRateInput {
            user_id: app.worker.id,
            operation_id: catalog.cut.id,
            rate: dec!(130),
        })
        .await
        .unwrap();

    let order = services
        .orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    let line_id = order.operations.0[0].id;

    let assigned = services
        .orders
        .assign_operation(
            app.admin_actor(),
            order.id,
            line_id,
            AssignOperationInput {
                user_id: Some(app.worker.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(assigned.operations.0[0].assigned_to, Some(app.worker.id));
    assert_eq!(assigned.operations.0[0].rate, dec!(130));

    let cleared = services
        .orders
        .assign_operation(
            app.admin_actor(),
            order.id,
            line_id,
            AssignOperationInput { user_id: None },
        )
        .await
        .unwrap();
    assert_eq!(cleared.operations.0[0].assigned_to, None);
}

#[tokio::test]
async fn workers_cannot_create_orders_and_numbers_are_unique() {
    let app = TestApp::new().await;
    app.seed_tp1().await;
    let orders = &app.state.services.orders;

    assert_matches!(
        orders
            .create_order(app.worker_actor(), order_from_article("ORD1", "TP1", 10))
            .await,
        Err(ServiceError::Forbidden(ForbiddenReason::AdminOnly))
    );

    orders
        .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 10))
        .await
        .unwrap();
    assert_matches!(
        orders
            .create_order(app.admin_actor(), order_from_article("ORD1", "TP1", 5))
            .await,
        Err(ServiceError::Conflict(_))
    );
}

#[tokio::test]
async fn order_without_tech_process_starts_empty() {
    let app = TestApp::new().await;

    let order = app
        .state
        .services
        .orders
        .create_order(app.admin_actor(), order_from_article("ORD9", "UNKNOWN", 3))
        .await
        .unwrap();

    assert!(order.operations.0.is_empty());
    assert!(order.materials.0.is_empty());
    assert_eq!(order.status, OrderStatus::Created);
}

#[tokio::test]
async fn explicit_operations_do_not_need_the_template_operations() {
    let app = TestApp::new().await;
    let catalog = app.seed_tp1().await;
    let services = &app.state.services;

    let weld = services
        .operations
        .create_operation(CreateOperationInput {
            name: "Weld".into(),
            description: None,
            default_rate: dec!(60),
        })
        .await
        .unwrap();
    // TP1 still lists Cut
    services
        .operations
        .delete_operation(catalog.cut.id)
        .await
        .unwrap();

    let mut input = order_from_article("ORD1", "TP1", 10);
    input.operations = vec![line(weld.id)];
    let order = services
        .orders
        .create_order(app.admin_actor(), input)
        .await
        .unwrap();

    assert_eq!(order.operations.0.len(), 1);
    assert_eq!(order.operations.0[0].operation_id, weld.id);
    assert_eq!(order.operations.0[0].rate, dec!(60));
    assert_eq!(order.materials.0.len(), 1);
    assert_eq!(order.materials.0[0].material_id, catalog.m1.id);
    assert_eq!(order.materials.0[0].quantity, dec!(20));
}
