//! Integration tests for the order-level lifecycle operations: confirmation,
//! cancellation, the admin mark-delivered path, and backorder decisions.

mod common;

use common::*;
use fulfillment_core::constants::{audit, events};
use fulfillment_core::models::ProductId;
use fulfillment_core::{
    BackorderApproval, BackorderDecision, CancelOptions, FulfillmentError, MarkDeliveredOptions,
    NewOrder, OrderStatus,
};
use std::collections::BTreeMap;

fn new_order() -> NewOrder {
    NewOrder {
        order_number: unique_order_number(),
        customer_name: "Harbour Cafe".to_string(),
        items: vec![
            fulfillment_core::OrderItem::new("sku-flour", "Flour 10kg", 10, 2_500),
            fulfillment_core::OrderItem::new("sku-oil", "Canola Oil 5L", 2, 1_800),
        ],
        area_id: None,
        delivery_date: None,
    }
}

#[tokio::test]
async fn test_create_and_confirm_order() {
    let harness = test_system();
    let admin = admin();

    let order = harness
        .system
        .create_order(&admin, new_order())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingApproval);
    assert_eq!(order.version, 1);
    assert_eq!(order.status_history.len(), 1);

    let confirmed = harness
        .system
        .confirm_order(&admin, order.id, Some("confirmed by phone".to_string()))
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    assert_eq!(confirmed.version, 2);
    assert_eq!(confirmed.status_history.len(), 2);
    let last = confirmed.status_history.last().unwrap();
    assert_eq!(last.status, OrderStatus::Confirmed);
    assert_eq!(last.notes.as_deref(), Some("confirmed by phone"));
}

#[tokio::test]
async fn test_confirm_publishes_notification() {
    let harness = test_system();
    let admin = admin();
    let order = harness
        .system
        .create_order(&admin, new_order())
        .await
        .unwrap();

    let mut rx = harness.system.subscribe();
    harness
        .system
        .confirm_order(&admin, order.id, None)
        .await
        .unwrap();

    // Audit first, then the customer notification
    let first = rx.recv().await.unwrap();
    assert_eq!(first.name, audit::STATUS_CHANGED);
    let second = rx.recv().await.unwrap();
    assert_eq!(second.name, events::ORDER_CONFIRMED);
    assert_eq!(second.context["order_number"], order.order_number);
}

#[tokio::test]
async fn test_confirm_is_not_idempotent() {
    let harness = test_system();
    let admin = admin();
    let order = harness
        .system
        .create_order(&admin, new_order())
        .await
        .unwrap();
    harness
        .system
        .confirm_order(&admin, order.id, None)
        .await
        .unwrap();

    let err = harness
        .system
        .confirm_order(&admin, order.id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::InvalidState {
            current: OrderStatus::Confirmed,
            ..
        }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_pending_backorder_blocks_confirmation() {
    let harness = test_system();
    let order = OrderBuilder::new()
        .item("sku-flour", "Flour 10kg", 10, 2_500)
        .short("sku-flour", 10, 4)
        .seed(&harness.store)
        .await;

    let err = harness
        .system
        .confirm_order(&admin(), order.id, None)
        .await
        .unwrap_err();
    match err {
        FulfillmentError::InvalidState { reason, .. } => {
            assert!(reason.contains("backorder"));
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[tokio::test]
async fn test_confirmation_allowed_after_backorder_rejection() {
    let harness = test_system();
    let admin = admin();
    let order = OrderBuilder::new()
        .item("sku-flour", "Flour 10kg", 10, 2_500)
        .short("sku-flour", 10, 4)
        .seed(&harness.store)
        .await;

    let rejected = harness
        .system
        .reject_backorder(&admin, order.id, "supplier discontinued the line")
        .await
        .unwrap();
    assert_eq!(rejected.backorder_decision(), BackorderDecision::Rejected);
    assert_eq!(rejected.status, OrderStatus::AwaitingApproval);

    let confirmed = harness
        .system
        .confirm_order(&admin, order.id, None)
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    // Confirmation clears the stale resolution record
    assert!(confirmed.backorder_resolution.is_none());
}

#[tokio::test]
async fn test_cancel_from_every_cancellable_status() {
    let harness = test_system();
    let admin = admin();
    for status in [
        OrderStatus::AwaitingApproval,
        OrderStatus::Confirmed,
        OrderStatus::Packing,
        OrderStatus::ReadyForDelivery,
        OrderStatus::OutForDelivery,
    ] {
        let order = OrderBuilder::new().status(status).seed(&harness.store).await;
        let cancelled = harness
            .system
            .cancel_order(&admin, order.id, "customer withdrew", CancelOptions::default())
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled, "from {status}");
        let last = cancelled.status_history.last().unwrap();
        assert_eq!(last.notes.as_deref(), Some("Cancelled: customer withdrew"));
    }
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let harness = test_system();
    let admin = admin();
    let order = OrderBuilder::new()
        .status(OrderStatus::Confirmed)
        .seed(&harness.store)
        .await;

    let first = harness
        .system
        .cancel_order(&admin, order.id, "duplicate order", CancelOptions::default())
        .await
        .unwrap();
    let second = harness
        .system
        .cancel_order(&admin, order.id, "duplicate order", CancelOptions::default())
        .await
        .unwrap();

    assert_eq!(second.status, OrderStatus::Cancelled);
    // The replay changed nothing
    assert_eq!(second.version, first.version);
    assert_eq!(second.status_history.len(), first.status_history.len());
}

#[tokio::test]
async fn test_cancel_delivered_requires_force() {
    let harness = test_system();
    let admin = admin();
    let order = OrderBuilder::new()
        .status(OrderStatus::Delivered)
        .seed(&harness.store)
        .await;

    let err = harness
        .system
        .cancel_order(&admin, order.id, "billing dispute", CancelOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidState { .. }));

    let cancelled = harness
        .system
        .cancel_order(
            &admin,
            order.id,
            "billing dispute",
            CancelOptions {
                force_delivered: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_clears_driver_claim() {
    let harness = test_system();
    let tane = driver("drv_tane", "Tane Hohepa");
    let order = OrderBuilder::new()
        .status(OrderStatus::ReadyForDelivery)
        .claimed_by(&tane)
        .seed(&harness.store)
        .await;

    let cancelled = harness
        .system
        .cancel_order(&admin(), order.id, "route dropped", CancelOptions::default())
        .await
        .unwrap();
    assert!(!cancelled.delivery.is_claimed());
    assert!(cancelled.delivery.assigned_at.is_none());
}

#[tokio::test]
async fn test_cancel_requires_reason() {
    let harness = test_system();
    let order = OrderBuilder::new().seed(&harness.store).await;

    let err = harness
        .system
        .cancel_order(&admin(), order.id, "   ", CancelOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation { .. }));
}

#[tokio::test]
async fn test_mark_delivered_enforces_same_day_packing() {
    let harness = test_system();
    let admin = admin();
    let order = OrderBuilder::new()
        .status(OrderStatus::ReadyForDelivery)
        .seed(&harness.store)
        .await;

    let err = harness
        .system
        .mark_delivered(&admin, order.id, None, MarkDeliveredOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation { .. }));

    // The failed attempt wrote nothing
    let unchanged = harness.system.get_order(order.id).await.unwrap();
    assert_eq!(unchanged.status, OrderStatus::ReadyForDelivery);
    assert_eq!(unchanged.version, order.version);

    let delivered = harness
        .system
        .mark_delivered(
            &admin,
            order.id,
            None,
            MarkDeliveredOptions {
                admin_override: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.delivery.delivered_at.is_some());
}

#[tokio::test]
async fn test_mark_delivered_packed_today_needs_no_override() {
    let harness = test_system();
    let order = OrderBuilder::new()
        .status(OrderStatus::ReadyForDelivery)
        .packed_today()
        .seed(&harness.store)
        .await;

    let delivered = harness
        .system
        .mark_delivered(&admin(), order.id, None, MarkDeliveredOptions::default())
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_mark_delivered_is_idempotent() {
    let harness = test_system();
    let admin = admin();
    let order = OrderBuilder::new()
        .status(OrderStatus::ReadyForDelivery)
        .packed_today()
        .seed(&harness.store)
        .await;

    let first = harness
        .system
        .mark_delivered(&admin, order.id, None, MarkDeliveredOptions::default())
        .await
        .unwrap();
    let second = harness
        .system
        .mark_delivered(&admin, order.id, None, MarkDeliveredOptions::default())
        .await
        .unwrap();

    assert_eq!(second.version, first.version);
    assert_eq!(second.delivery.delivered_at, first.delivery.delivered_at);
}

#[tokio::test]
async fn test_mark_delivered_rejected_from_early_statuses() {
    let harness = test_system();
    for status in [
        OrderStatus::AwaitingApproval,
        OrderStatus::Confirmed,
        OrderStatus::Packing,
        OrderStatus::Cancelled,
    ] {
        let order = OrderBuilder::new()
            .status(status)
            .packed_today()
            .seed(&harness.store)
            .await;
        let err = harness
            .system
            .mark_delivered(&admin(), order.id, None, MarkDeliveredOptions::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, FulfillmentError::InvalidState { .. }),
            "from {status}: {err:?}"
        );
    }
}

#[tokio::test]
async fn test_full_backorder_approval() {
    let harness = test_system();
    let order = OrderBuilder::new()
        .item("sku-flour", "Flour 10kg", 10, 2_500)
        .short("sku-flour", 10, 4)
        .seed(&harness.store)
        .await;

    let approved = harness
        .system
        .approve_backorder(&admin(), order.id, BackorderApproval::default())
        .await
        .unwrap();

    assert_eq!(approved.backorder_decision(), BackorderDecision::Approved);
    assert!(approved.stock_shortfall.is_none());
    // Quantities and totals untouched on full approval
    assert_eq!(approved.items[0].quantity, 10);
    assert_eq!(approved.totals, order.totals);
    // Approval never confirms
    assert_eq!(approved.status, OrderStatus::AwaitingApproval);
    let last = approved.status_history.last().unwrap();
    assert_eq!(last.notes.as_deref(), Some("Backorder approved"));
}

#[tokio::test]
async fn test_partial_approval_rewrites_quantities_and_totals() {
    let harness = test_system();
    let order = OrderBuilder::new()
        .item("sku-flour", "Flour 10kg", 10, 2_500)
        .item("sku-oil", "Canola Oil 5L", 2, 1_800)
        .short("sku-flour", 10, 6)
        .seed(&harness.store)
        .await;

    let mut rx = harness.system.subscribe();
    let mut quantities = BTreeMap::new();
    quantities.insert(ProductId::new("sku-flour"), 5);
    let approved = harness
        .system
        .approve_backorder(
            &admin(),
            order.id,
            BackorderApproval {
                approved_quantities: Some(quantities),
                ..BackorderApproval::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        approved.backorder_decision(),
        BackorderDecision::PartialApproved
    );
    assert_eq!(approved.items[0].quantity, 5);
    assert_eq!(approved.items[1].quantity, 2);
    // 5 * 2500 + 2 * 1800 = 16_100; GST at 15% = 2_415
    assert_eq!(approved.totals.subtotal_cents, 16_100);
    assert_eq!(approved.totals.gst_cents, 2_415);
    assert_eq!(approved.totals.total_cents, 18_515);

    let audit_event = rx.recv().await.unwrap();
    assert_eq!(audit_event.name, audit::BACKORDER_DECIDED);
    let notification = rx.recv().await.unwrap();
    assert_eq!(notification.name, events::BACKORDER_PARTIALLY_APPROVED);
}

#[tokio::test]
async fn test_approval_respects_reported_availability() {
    let harness = test_system();
    let order = OrderBuilder::new()
        .item("sku-flour", "Flour 10kg", 10, 2_500)
        .short("sku-flour", 10, 6)
        .seed(&harness.store)
        .await;

    let mut quantities = BTreeMap::new();
    quantities.insert(ProductId::new("sku-flour"), 8);

    let err = harness
        .system
        .approve_backorder(
            &admin(),
            order.id,
            BackorderApproval {
                approved_quantities: Some(quantities.clone()),
                ..BackorderApproval::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation { .. }));

    // Bypass lets the operator approve beyond the reported stock
    let approved = harness
        .system
        .approve_backorder(
            &admin(),
            order.id,
            BackorderApproval {
                approved_quantities: Some(quantities),
                bypass_stock_check: true,
                ..BackorderApproval::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.items[0].quantity, 8);
}

#[tokio::test]
async fn test_reject_backorder_requires_substantive_reason() {
    let harness = test_system();
    let order = OrderBuilder::new()
        .short("sku-flour", 10, 4)
        .seed(&harness.store)
        .await;

    let err = harness
        .system
        .reject_backorder(&admin(), order.id, "no")
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation { .. }));

    let rejected = harness
        .system
        .reject_backorder(&admin(), order.id, "supplier discontinued the line")
        .await
        .unwrap();
    assert_eq!(rejected.backorder_decision(), BackorderDecision::Rejected);
    let last = rejected.status_history.last().unwrap();
    assert!(last
        .notes
        .as_deref()
        .unwrap()
        .contains("supplier discontinued the line"));
}

#[tokio::test]
async fn test_backorder_decisions_need_a_pending_shortfall() {
    let harness = test_system();
    let order = OrderBuilder::new().seed(&harness.store).await;

    let err = harness
        .system
        .approve_backorder(&admin(), order.id, BackorderApproval::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidState { .. }));

    let err = harness
        .system
        .reject_backorder(&admin(), order.id, "supplier discontinued the line")
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidState { .. }));
}

#[tokio::test]
async fn test_deciding_twice_is_rejected() {
    let harness = test_system();
    let order = OrderBuilder::new()
        .short("sku-flour", 10, 4)
        .seed(&harness.store)
        .await;

    harness
        .system
        .approve_backorder(&admin(), order.id, BackorderApproval::default())
        .await
        .unwrap();

    let err = harness
        .system
        .reject_backorder(&admin(), order.id, "changed our minds entirely")
        .await
        .unwrap_err();
    match err {
        FulfillmentError::InvalidState { reason, .. } => {
            assert!(reason.contains("approved"));
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[tokio::test]
async fn test_role_gates_on_order_operations() {
    let harness = test_system();
    let tane = driver("drv_tane", "Tane Hohepa");

    let err = harness
        .system
        .create_order(&tane, new_order())
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Forbidden { .. }));

    // Sales carries the manage-orders capability
    let order = harness
        .system
        .create_order(&sales(), new_order())
        .await
        .unwrap();
    let confirmed = harness
        .system
        .confirm_order(&sales(), order.id, None)
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    let err = harness
        .system
        .confirm_order(&tane, order.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Forbidden { .. }));
}

#[tokio::test]
async fn test_history_records_every_transition_in_order() {
    let harness = test_system();
    let admin = admin();
    let tane = driver("drv_tane", "Tane Hohepa");

    let order = harness
        .system
        .create_order(&admin, new_order())
        .await
        .unwrap();
    harness
        .system
        .confirm_order(&admin, order.id, None)
        .await
        .unwrap();

    // Packing workflow edges happen outside this crate; seed them directly
    let packed = OrderBuilder::new()
        .status(OrderStatus::ReadyForDelivery)
        .seed(&harness.store)
        .await;
    harness
        .system
        .start_delivery(&tane, packed.id)
        .await
        .unwrap();
    harness
        .system
        .upload_proof_of_delivery(
            &tane,
            packed.id,
            fulfillment_core::ProofKind::Photo,
            "https://pod.example/photos/1.jpg",
        )
        .await
        .unwrap();
    let done = harness
        .system
        .complete_delivery(&tane, packed.id, None)
        .await
        .unwrap();

    let statuses: Vec<OrderStatus> = done.status_history.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::AwaitingApproval,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ]
    );
    // Timestamps never run backwards
    for pair in done.status_history.windows(2) {
        assert!(pair[0].changed_at <= pair[1].changed_at);
    }
}

#[tokio::test]
async fn test_every_applied_write_bumps_version() {
    let harness = test_system();
    let order = OrderBuilder::new()
        .short("sku-flour", 10, 4)
        .seed(&harness.store)
        .await;
    assert_eq!(order.version, 1);

    let approved = harness
        .system
        .approve_backorder(&admin(), order.id, BackorderApproval::default())
        .await
        .unwrap();
    assert_eq!(approved.version, 2);

    let confirmed = harness
        .system
        .confirm_order(&admin(), order.id, None)
        .await
        .unwrap();
    assert_eq!(confirmed.version, 3);

    let cancelled = harness
        .system
        .cancel_order(&admin(), order.id, "customer withdrew", CancelOptions::default())
        .await
        .unwrap();
    assert_eq!(cancelled.version, 4);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let harness = test_system();
    let missing = fulfillment_core::OrderId::new();

    let err = harness
        .system
        .confirm_order(&admin(), missing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::NotFound { .. }));
}
