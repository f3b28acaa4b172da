use entity::sea_orm_active_enums::{MembershipTier, OrderStatus, PaymentMethod, PlanType};
use rust_decimal::Decimal;
use time::{Duration, OffsetDateTime};
use tunee_backend::{
    models::order::{ClientInfo, OrderListQuery},
    store::SettlementStore,
    ApiError,
};

use crate::support::{pending_order, seed_user, test_app};

fn query(page: Option<u64>, page_size: Option<u64>, status: Option<&str>) -> OrderListQuery {
    OrderListQuery {
        page,
        page_size,
        status: status.map(str::to_string),
    }
}

#[tokio::test]
async fn test_orders_are_priced_from_catalog() {
    let app = test_app();
    let user_id = seed_user(&app.store, None);
    let service = &app.state.order_service;
    let before = OffsetDateTime::now_utc();

    let monthly = service
        .create_order(
            user_id,
            PlanType::Monthly,
            PaymentMethod::Alipay,
            ClientInfo::default(),
        )
        .await
        .unwrap();
    let yearly = service
        .create_order(
            user_id,
            PlanType::Yearly,
            PaymentMethod::Wechat,
            ClientInfo::default(),
        )
        .await
        .unwrap();

    assert_eq!(monthly.amount, Decimal::new(1990, 2));
    assert_eq!(yearly.amount, Decimal::new(19900, 2));
    assert_eq!(monthly.status, OrderStatus::Pending);
    assert!(monthly.order_no.starts_with("TN"));
    assert_eq!(monthly.order_no.len(), 18);
    assert_ne!(monthly.order_no, yearly.order_no);

    let ttl = monthly.expire_at - before;
    assert!(ttl >= Duration::minutes(30) && ttl < Duration::minutes(31));
    assert_eq!(app.store.order_count(), 2);
}

#[tokio::test]
async fn test_listing_pages_newest_first_and_filters_by_status() {
    let app = test_app();
    let user_id = seed_user(&app.store, None);
    let other_user = seed_user(&app.store, None);
    let now = OffsetDateTime::now_utc();

    for (i, order_no) in ["TN0001", "TN0002", "TN0003"].into_iter().enumerate() {
        let mut order = pending_order(order_no, user_id, PlanType::Monthly, PaymentMethod::Alipay);
        order.created_at = now - Duration::minutes(10 - i as i64);
        if order_no == "TN0002" {
            order.status = OrderStatus::Paid;
            order.paid_at = Some(now);
        }
        app.store.put_order(order);
    }
    app.store.put_order(pending_order(
        "TN9999",
        other_user,
        PlanType::Yearly,
        PaymentMethod::Wechat,
    ));
    let service = &app.state.order_service;

    let first = service
        .list_orders(user_id, query(Some(1), Some(2), None))
        .await
        .unwrap();
    let numbers: Vec<_> = first.list.iter().map(|o| o.order_no.as_str()).collect();
    assert_eq!(numbers, vec!["TN0003", "TN0002"]);
    assert_eq!(first.pagination.total, 3);
    assert_eq!(first.pagination.total_pages, 2);

    let second = service
        .list_orders(user_id, query(Some(2), Some(2), None))
        .await
        .unwrap();
    assert_eq!(second.list.len(), 1);
    assert_eq!(second.list[0].order_no, "TN0001");

    let paid = service
        .list_orders(user_id, query(None, None, Some("paid")))
        .await
        .unwrap();
    assert_eq!(paid.list.len(), 1);
    assert_eq!(paid.list[0].order_no, "TN0002");
    assert_eq!(paid.pagination.page, 1);
    assert_eq!(paid.pagination.page_size, 10);

    let invalid = service
        .list_orders(user_id, query(None, None, Some("bogus")))
        .await;
    assert!(matches!(invalid, Err(ApiError::BadRequest(_))));
}

#[tokio::test]
async fn test_page_size_is_capped() {
    let app = test_app();
    let user_id = seed_user(&app.store, None);

    let page = app
        .state
        .order_service
        .list_orders(user_id, query(Some(0), Some(10_000), None))
        .await
        .unwrap();

    assert_eq!(page.pagination.page, 1);
    assert_eq!(page.pagination.page_size, 100);
    assert_eq!(page.pagination.total, 0);
    assert!(page.list.is_empty());
}

#[tokio::test]
async fn test_purge_drops_only_expired_pending_orders() {
    let app = test_app();
    let user_id = seed_user(&app.store, None);
    let now = OffsetDateTime::now_utc();

    let mut expired = pending_order("TN1001", user_id, PlanType::Monthly, PaymentMethod::Wechat);
    expired.expire_at = now - Duration::minutes(1);
    let mut expired_paid =
        pending_order("TN1002", user_id, PlanType::Monthly, PaymentMethod::Wechat);
    expired_paid.expire_at = now - Duration::minutes(1);
    expired_paid.status = OrderStatus::Paid;
    let fresh = pending_order("TN1003", user_id, PlanType::Monthly, PaymentMethod::Wechat);
    for order in [expired, expired_paid, fresh] {
        app.store.put_order(order);
    }

    let removed = app.state.order_service.purge_expired().await.unwrap();

    assert_eq!(removed, 1);
    assert!(app.store.find_order("TN1001").await.unwrap().is_none());
    assert!(app.store.find_order("TN1002").await.unwrap().is_some());
    assert!(app.store.find_order("TN1003").await.unwrap().is_some());
}

#[tokio::test]
async fn test_order_lookup_is_owner_scoped() {
    let app = test_app();
    let owner = seed_user(&app.store, None);
    let stranger = seed_user(&app.store, None);
    app.store.put_order(pending_order(
        "TN2001",
        owner,
        PlanType::Yearly,
        PaymentMethod::Alipay,
    ));
    let service = &app.state.order_service;

    let summary = service.get_order_status(owner, "TN2001").await.unwrap();
    assert_eq!(summary.status, OrderStatus::Pending);
    assert_eq!(summary.plan_type, PlanType::Yearly);

    let result = service.get_order_status(stranger, "TN2001").await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_membership_info_for_new_user() {
    let app = test_app();
    let user_id = seed_user(&app.store, None);

    let info = app.state.membership_service.get_info(user_id).await.unwrap();

    assert_eq!(info.current_level, MembershipTier::Free);
    assert!(info.is_valid);
    assert!(info.expires_at.is_none());
    assert_eq!(info.daily_limit, 3);
    assert_eq!(info.remaining_today, 3);
    assert_eq!(info.plans.len(), 2);
    assert_eq!(info.plans[1].price, Decimal::new(19900, 2));
}
