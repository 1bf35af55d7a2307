use serde_json::json;
use storefront_api::models::{
    CheckoutRequest, CreateProductRequest, MAX_PAGE_SIZE, OrderDetails, OrderItem, OrderStatus,
    PageMeta, ProductFilter, ProductSort, Role, UpdateProfileRequest, User, slugify,
};
use uuid::Uuid;
use validator::Validate;

// --- Enumerations ---

#[test]
fn test_enums_use_screaming_snake_case() {
    assert_eq!(serde_json::to_value(Role::SuperAdmin).unwrap(), json!("SUPER_ADMIN"));
    assert_eq!(serde_json::to_value(OrderStatus::Canceled).unwrap(), json!("CANCELED"));

    let role: Role = serde_json::from_value(json!("ADMIN")).unwrap();
    assert_eq!(role, Role::Admin);
    assert!(serde_json::from_value::<Role>(json!("admin")).is_err());
}

#[test]
fn test_role_helpers() {
    assert_eq!(Role::default(), Role::Customer);
    assert!(!Role::Customer.is_staff());
    assert!(Role::Admin.is_staff());
    assert!(Role::SuperAdmin.is_staff());
    assert_eq!(Role::SuperAdmin.as_str(), "SUPER_ADMIN");
}

#[test]
fn test_order_lifecycle() {
    use OrderStatus::*;

    assert!(Pending.can_transition_to(Processing));
    assert!(Processing.can_transition_to(Shipped));
    assert!(Shipped.can_transition_to(Delivered));
    assert!(Pending.can_transition_to(Canceled));
    assert!(Processing.can_transition_to(Canceled));

    assert!(!Pending.can_transition_to(Shipped));
    assert!(!Shipped.can_transition_to(Canceled));
    assert!(!Delivered.can_transition_to(Pending));
    assert!(!Pending.can_transition_to(Pending));

    for status in [Pending, Processing, Shipped, Delivered, Canceled] {
        let has_exit = [Pending, Processing, Shipped, Delivered, Canceled]
            .into_iter()
            .any(|next| status.can_transition_to(next));
        assert_eq!(status.is_terminal(), !has_exit, "{status:?}");
    }
}

// --- Serialization shapes ---

#[test]
fn test_user_never_serializes_a_password() {
    let user = User {
        email: "a@example.com".to_string(),
        ..Default::default()
    };
    let value = serde_json::to_value(user).unwrap();
    assert!(value.get("password_hash").is_none());
    assert_eq!(value["role"], "CUSTOMER");
}

#[test]
fn test_order_details_flatten_header() {
    let mut details = OrderDetails::default();
    details.order.total = 4200;
    details.items.push(OrderItem {
        product_name: "Lamp".to_string(),
        quantity: 2,
        ..Default::default()
    });

    let value = serde_json::to_value(details).unwrap();
    assert_eq!(value["total"], 4200);
    assert_eq!(value["status"], "PENDING");
    assert_eq!(value["shipping_address"]["city"], "");
    assert_eq!(value["items"][0]["product_name"], "Lamp");
    assert!(value.get("order").is_none());
}

#[test]
fn test_create_product_defaults() {
    let request: CreateProductRequest = serde_json::from_value(json!({
        "name": "Lamp",
        "price": 1999,
        "stock": 3,
        "category_id": Uuid::nil(),
    }))
    .unwrap();

    assert!(request.is_active);
    assert!(request.features.is_empty());
    assert_eq!(request.description, "");
    assert!(request.validate().is_ok());
}

#[test]
fn test_negative_price_is_invalid() {
    let request: CreateProductRequest = serde_json::from_value(json!({
        "name": "Lamp",
        "price": -1,
        "stock": 3,
        "category_id": Uuid::nil(),
    }))
    .unwrap();

    let errors = request.validate().unwrap_err();
    assert!(errors.field_errors().contains_key("price"));

    let request = CreateProductRequest {
        name: "Lamp".to_string(),
        price: i64::MAX,
        ..Default::default()
    };
    let errors = request.validate().unwrap_err();
    assert!(errors.field_errors().contains_key("price"));
}

#[test]
fn test_profile_update_validates_only_present_fields() {
    assert!(UpdateProfileRequest::default().validate().is_ok());

    let short = UpdateProfileRequest {
        new_password: Some("short".to_string()),
        ..Default::default()
    };
    assert!(short.validate().is_err());
}

#[test]
fn test_empty_cart_is_invalid() {
    let request: CheckoutRequest = serde_json::from_value(json!({
        "items": [],
        "shipping_address": {
            "full_name": "Ada Lovelace",
            "line1": "12 Analytical Row",
            "city": "London",
            "postal_code": "N1 9GU",
            "country": "GB",
            "phone": "+44 20 7946 0000"
        }
    }))
    .unwrap();

    let errors = request.validate().unwrap_err();
    assert!(errors.errors().contains_key("items"));
}

// --- Query helpers ---

#[test]
fn test_product_filter_paging() {
    let default = ProductFilter::default();
    assert_eq!((default.page(), default.limit(), default.offset()), (1, 20, 0));

    let third = ProductFilter {
        page: Some(3),
        limit: Some(10),
        ..Default::default()
    };
    assert_eq!(third.offset(), 20);

    let greedy = ProductFilter {
        page: Some(-4),
        limit: Some(10_000),
        ..Default::default()
    };
    assert_eq!(greedy.page(), 1);
    assert_eq!(greedy.limit(), MAX_PAGE_SIZE);

    let far = ProductFilter {
        page: Some(i64::MAX),
        limit: Some(50),
        ..Default::default()
    };
    assert_eq!(far.offset(), i64::MAX);
}

#[test]
fn test_sort_parses_from_query_value() {
    let sort: ProductSort = serde_json::from_value(json!("price_asc")).unwrap();
    assert_eq!(sort, ProductSort::PriceAsc);
    assert_eq!(ProductSort::default(), ProductSort::Newest);
}

#[test]
fn test_page_meta() {
    assert_eq!(PageMeta::new(1, 20, 0).total_pages, 0);
    assert_eq!(PageMeta::new(1, 20, 20).total_pages, 1);
    assert_eq!(PageMeta::new(2, 20, 41).total_pages, 3);
}

#[test]
fn test_slugify() {
    assert_eq!(slugify("Audio & Video"), "audio-video");
    assert_eq!(slugify("  --Gaming   Mice--  "), "gaming-mice");
    assert_eq!(slugify("USB-C"), "usb-c");
    assert_eq!(slugify("!!!"), "");
}
