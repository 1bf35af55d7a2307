#![allow(dead_code)]

use std::{
    borrow::Cow,
    error::Error as StdError,
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, header},
    response::Response,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::error::{DatabaseError, ErrorKind};
use storefront_api::{
    AppConfig, AppState, create_router,
    auth::issue_token,
    checkout::Quote,
    error::ApiError,
    models::{
        Brand, Category, Coupon, CreateBrandRequest, CreateCategoryRequest, CreateCouponRequest,
        CreateProductRequest, CreateReviewRequest, CreateSubcategoryRequest, DashboardStats,
        DiscountType, NewUser, Order, OrderDetails, OrderItem, OrderStatus, Product, ProductFilter,
        ProductSort, Review, Role, ShippingAddress, Subcategory, UpdateBrandRequest,
        UpdateCategoryRequest, UpdateCouponRequest, UpdateProductRequest, UpdateSubcategoryRequest,
        User, UserWithPassword, slugify,
    },
    payments::{MockPaymentGateway, PaymentState},
    repository::{RepoResult, Repository, RepositoryState},
};
use tower::ServiceExt;
use uuid::Uuid;

// --- Fake driver error ---

/// Stands in for a Postgres error so constraint failures travel through the same
/// `sqlx::Error::Database` path as in production.
#[derive(Debug)]
pub struct FakeDbError {
    pub code: &'static str,
    pub constraint: &'static str,
    pub message: String,
}

impl fmt::Display for FakeDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for FakeDbError {}

impl DatabaseError for FakeDbError {
    fn message(&self) -> &str {
        &self.message
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.code))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn constraint(&self) -> Option<&str> {
        Some(self.constraint)
    }

    fn kind(&self) -> ErrorKind {
        match self.code {
            "23505" => ErrorKind::UniqueViolation,
            "23503" => ErrorKind::ForeignKeyViolation,
            "23502" => ErrorKind::NotNullViolation,
            "23514" => ErrorKind::CheckViolation,
            _ => ErrorKind::Other,
        }
    }
}

pub fn db_error(code: &'static str, constraint: &'static str, message: impl Into<String>) -> sqlx::Error {
    sqlx::Error::Database(Box::new(FakeDbError {
        code,
        constraint,
        message: message.into(),
    }))
}

fn unique_violation(constraint: &'static str) -> ApiError {
    db_error(
        "23505",
        constraint,
        format!("duplicate key value violates unique constraint \"{constraint}\""),
    )
    .into()
}

fn still_referenced(table: &str, constraint: &'static str) -> ApiError {
    db_error(
        "23503",
        constraint,
        format!("update or delete on table \"{table}\" violates foreign key constraint \"{constraint}\""),
    )
    .into()
}

fn missing_reference(table: &str, constraint: &'static str) -> ApiError {
    db_error(
        "23503",
        constraint,
        format!("insert or update on table \"{table}\" violates foreign key constraint \"{constraint}\""),
    )
    .into()
}

// --- In-memory repository ---

#[derive(Default)]
pub struct Store {
    pub users: Vec<(User, String)>,
    pub categories: Vec<Category>,
    pub subcategories: Vec<Subcategory>,
    pub brands: Vec<Brand>,
    pub products: Vec<Product>,
    pub coupons: Vec<Coupon>,
    pub orders: Vec<OrderDetails>,
    pub reviews: Vec<Review>,
}

/// In-memory `Repository` mirroring the constraints of the SQL schema.
#[derive(Default)]
pub struct InMemoryRepo {
    pub store: Mutex<Store>,
    /// When set, `get_stats` fails like a dropped connection.
    pub broken: bool,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, email: &str, role: Role) -> User {
        self.seed_user_with_hash(email, role, "")
    }

    pub fn seed_user_with_hash(&self, email: &str, role: Role, password_hash: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or("user").to_string(),
            role,
            created_at: Utc::now(),
        };
        self.store
            .lock()
            .unwrap()
            .users
            .push((user.clone(), password_hash.to_string()));
        user
    }

    pub fn seed_category(&self, name: &str) -> Category {
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slugify(name),
            description: None,
            created_at: Utc::now(),
        };
        self.store.lock().unwrap().categories.push(category.clone());
        category
    }

    pub fn seed_product(&self, category_id: Uuid, name: &str, price: i64, stock: i32) -> Product {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: format!("{name} description"),
            price,
            stock,
            category_id,
            is_active: true,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        self.store.lock().unwrap().products.push(product.clone());
        product
    }

    pub fn seed_coupon(&self, code: &str, discount_type: DiscountType, value: i64) -> Coupon {
        let coupon = Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_type,
            discount_value: value,
            min_order_amount: 0,
            usage_limit: None,
            usage_count: 0,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.lock().unwrap().coupons.push(coupon.clone());
        coupon
    }

    pub fn product(&self, id: Uuid) -> Option<Product> {
        self.store.lock().unwrap().products.iter().find(|p| p.id == id).cloned()
    }

    pub fn coupon(&self, code: &str) -> Option<Coupon> {
        self.store.lock().unwrap().coupons.iter().find(|c| c.code == code).cloned()
    }

    pub fn order(&self, id: Uuid) -> Option<OrderDetails> {
        self.store.lock().unwrap().orders.iter().find(|o| o.order.id == id).cloned()
    }

    pub fn set_order_status(&self, id: Uuid, status: OrderStatus) {
        let mut store = self.store.lock().unwrap();
        if let Some(details) = store.orders.iter_mut().find(|o| o.order.id == id) {
            details.order.status = status;
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepo {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|(u, _)| u.id == id).map(|(u, _)| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserWithPassword>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .users
            .iter()
            .find(|(u, _)| u.email == email)
            .map(|(user, hash)| UserWithPassword {
                user: user.clone(),
                password_hash: hash.clone(),
            }))
    }

    async fn get_password_hash(&self, id: Uuid) -> RepoResult<Option<String>> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|(u, _)| u.id == id).map(|(_, h)| h.clone()))
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut store = self.store.lock().unwrap();
        if store.users.iter().any(|(u, _)| u.email == user.email) {
            return Err(unique_violation("users_email_key"));
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            role: user.role,
            created_at: Utc::now(),
        };
        store.users.push((created.clone(), user.password_hash));
        Ok(created)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        password_hash: Option<String>,
    ) -> RepoResult<Option<User>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.users.iter_mut().find(|(u, _)| u.id == id).map(|(user, hash)| {
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(new_hash) = password_hash {
                *hash = new_hash;
            }
            user.clone()
        }))
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().map(|(u, _)| u.clone()).collect())
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> RepoResult<Option<User>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.users.iter_mut().find(|(u, _)| u.id == id).map(|(user, _)| {
            user.role = role;
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        if store.orders.iter().any(|o| o.order.user_id == id) {
            return Err(still_referenced("users", "orders_user_id_fkey"));
        }
        let before = store.users.len();
        store.users.retain(|(u, _)| u.id != id);
        Ok(store.users.len() < before)
    }

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        Ok(self.store.lock().unwrap().categories.clone())
    }

    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>> {
        let store = self.store.lock().unwrap();
        Ok(store.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn create_category(&self, req: CreateCategoryRequest) -> RepoResult<Category> {
        let mut store = self.store.lock().unwrap();
        let slug = slugify(&req.name);
        if store.categories.iter().any(|c| c.name == req.name || c.slug == slug) {
            return Err(unique_violation("categories_slug_key"));
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: req.name,
            slug,
            description: req.description,
            created_at: Utc::now(),
        };
        store.categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, req: UpdateCategoryRequest) -> RepoResult<Option<Category>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.categories.iter_mut().find(|c| c.id == id).map(|category| {
            if let Some(name) = req.name {
                category.slug = slugify(&name);
                category.name = name;
            }
            if req.description.is_some() {
                category.description = req.description;
            }
            category.clone()
        }))
    }

    async fn delete_category(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        if store.products.iter().any(|p| p.category_id == id) {
            return Err(still_referenced("categories", "products_category_id_fkey"));
        }
        let before = store.categories.len();
        store.categories.retain(|c| c.id != id);
        Ok(store.categories.len() < before)
    }

    async fn list_subcategories(&self, category_id: Option<Uuid>) -> RepoResult<Vec<Subcategory>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .subcategories
            .iter()
            .filter(|s| category_id.is_none_or(|id| s.category_id == id))
            .cloned()
            .collect())
    }

    async fn create_subcategory(&self, req: CreateSubcategoryRequest) -> RepoResult<Subcategory> {
        let mut store = self.store.lock().unwrap();
        if !store.categories.iter().any(|c| c.id == req.category_id) {
            return Err(missing_reference("subcategories", "subcategories_category_id_fkey"));
        }
        let subcategory = Subcategory {
            id: Uuid::new_v4(),
            category_id: req.category_id,
            slug: slugify(&req.name),
            name: req.name,
            created_at: Utc::now(),
        };
        store.subcategories.push(subcategory.clone());
        Ok(subcategory)
    }

    async fn update_subcategory(
        &self,
        id: Uuid,
        req: UpdateSubcategoryRequest,
    ) -> RepoResult<Option<Subcategory>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.subcategories.iter_mut().find(|s| s.id == id).map(|sub| {
            if let Some(category_id) = req.category_id {
                sub.category_id = category_id;
            }
            if let Some(name) = req.name {
                sub.slug = slugify(&name);
                sub.name = name;
            }
            sub.clone()
        }))
    }

    async fn delete_subcategory(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.subcategories.len();
        store.subcategories.retain(|s| s.id != id);
        Ok(store.subcategories.len() < before)
    }

    async fn list_brands(&self) -> RepoResult<Vec<Brand>> {
        Ok(self.store.lock().unwrap().brands.clone())
    }

    async fn create_brand(&self, req: CreateBrandRequest) -> RepoResult<Brand> {
        let mut store = self.store.lock().unwrap();
        if store.brands.iter().any(|b| b.name == req.name) {
            return Err(unique_violation("brands_name_key"));
        }
        let brand = Brand {
            id: Uuid::new_v4(),
            slug: slugify(&req.name),
            name: req.name,
            logo_url: req.logo_url,
            created_at: Utc::now(),
        };
        store.brands.push(brand.clone());
        Ok(brand)
    }

    async fn update_brand(&self, id: Uuid, req: UpdateBrandRequest) -> RepoResult<Option<Brand>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.brands.iter_mut().find(|b| b.id == id).map(|brand| {
            if let Some(name) = req.name {
                brand.slug = slugify(&name);
                brand.name = name;
            }
            if req.logo_url.is_some() {
                brand.logo_url = req.logo_url;
            }
            brand.clone()
        }))
    }

    async fn delete_brand(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.brands.len();
        store.brands.retain(|b| b.id != id);
        Ok(store.brands.len() < before)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        include_inactive: bool,
    ) -> RepoResult<(Vec<Product>, i64)> {
        let store = self.store.lock().unwrap();
        let search = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut matches: Vec<Product> = store
            .products
            .iter()
            .filter(|p| include_inactive || p.is_active)
            .filter(|p| {
                search.as_deref().is_none_or(|s| {
                    p.name.to_lowercase().contains(s) || p.description.to_lowercase().contains(s)
                })
            })
            .filter(|p| filter.category_id.is_none_or(|id| p.category_id == id))
            .filter(|p| filter.subcategory_id.is_none_or(|id| p.subcategory_id == Some(id)))
            .filter(|p| filter.brand_id.is_none_or(|id| p.brand_id == Some(id)))
            .filter(|p| filter.min_price.is_none_or(|min| p.price >= min))
            .filter(|p| filter.max_price.is_none_or(|max| p.price <= max))
            .filter(|p| filter.in_stock != Some(true) || p.stock > 0)
            .cloned()
            .collect();

        match filter.sort.unwrap_or_default() {
            ProductSort::Newest => matches.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ProductSort::PriceAsc => matches.sort_by_key(|p| p.price),
            ProductSort::PriceDesc => matches.sort_by(|a, b| b.price.cmp(&a.price)),
            ProductSort::Name => matches.sort_by(|a, b| a.name.cmp(&b.name)),
        }

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        Ok(self.product(id))
    }

    async fn get_products_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<Product>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .products
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn create_product(&self, req: CreateProductRequest) -> RepoResult<Product> {
        let mut store = self.store.lock().unwrap();
        if !store.categories.iter().any(|c| c.id == req.category_id) {
            return Err(missing_reference("products", "products_category_id_fkey"));
        }
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
            price: req.price,
            stock: req.stock,
            features: req.features,
            images: req.images,
            category_id: req.category_id,
            subcategory_id: req.subcategory_id,
            brand_id: req.brand_id,
            is_active: req.is_active,
            created_at: now,
            updated_at: now,
        };
        store.products.push(product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, req: UpdateProductRequest) -> RepoResult<Option<Product>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.products.iter_mut().find(|p| p.id == id).map(|product| {
            if let Some(name) = req.name {
                product.name = name;
            }
            if let Some(description) = req.description {
                product.description = description;
            }
            if let Some(price) = req.price {
                product.price = price;
            }
            if let Some(stock) = req.stock {
                product.stock = stock;
            }
            if let Some(is_active) = req.is_active {
                product.is_active = is_active;
            }
            product.updated_at = Utc::now();
            product.clone()
        }))
    }

    async fn delete_product(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        if store
            .orders
            .iter()
            .any(|o| o.items.iter().any(|i| i.product_id == id))
        {
            return Err(still_referenced("products", "order_items_product_id_fkey"));
        }
        let before = store.products.len();
        store.products.retain(|p| p.id != id);
        Ok(store.products.len() < before)
    }

    async fn list_coupons(&self) -> RepoResult<Vec<Coupon>> {
        Ok(self.store.lock().unwrap().coupons.clone())
    }

    async fn get_coupon(&self, id: Uuid) -> RepoResult<Option<Coupon>> {
        let store = self.store.lock().unwrap();
        Ok(store.coupons.iter().find(|c| c.id == id).cloned())
    }

    async fn get_coupon_by_code(&self, code: &str) -> RepoResult<Option<Coupon>> {
        Ok(self.coupon(code))
    }

    async fn create_coupon(&self, req: CreateCouponRequest) -> RepoResult<Coupon> {
        let mut store = self.store.lock().unwrap();
        if store.coupons.iter().any(|c| c.code == req.code) {
            return Err(unique_violation("coupons_code_key"));
        }
        let coupon = Coupon {
            id: Uuid::new_v4(),
            code: req.code,
            discount_type: req.discount_type,
            discount_value: req.discount_value,
            min_order_amount: req.min_order_amount,
            usage_limit: req.usage_limit,
            usage_count: 0,
            expires_at: req.expires_at,
            is_active: req.is_active,
            created_at: Utc::now(),
        };
        store.coupons.push(coupon.clone());
        Ok(coupon)
    }

    async fn update_coupon(&self, id: Uuid, req: UpdateCouponRequest) -> RepoResult<Option<Coupon>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.coupons.iter_mut().find(|c| c.id == id).map(|coupon| {
            if let Some(value) = req.discount_value {
                coupon.discount_value = value;
            }
            if let Some(min) = req.min_order_amount {
                coupon.min_order_amount = min;
            }
            if req.usage_limit.is_some() {
                coupon.usage_limit = req.usage_limit;
            }
            if req.expires_at.is_some() {
                coupon.expires_at = req.expires_at;
            }
            if let Some(active) = req.is_active {
                coupon.is_active = active;
            }
            coupon.clone()
        }))
    }

    async fn delete_coupon(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.coupons.len();
        store.coupons.retain(|c| c.id != id);
        Ok(store.coupons.len() < before)
    }

    async fn place_order(
        &self,
        user_id: Uuid,
        quote: &Quote,
        address: &ShippingAddress,
    ) -> RepoResult<OrderDetails> {
        let mut guard = self.store.lock().unwrap();
        let store = &mut *guard;
        let now = Utc::now();

        // Check everything before mutating, like a rolled-back transaction.
        for line in &quote.lines {
            let available = store
                .products
                .iter()
                .any(|p| p.id == line.product_id && p.is_active && p.stock >= line.quantity);
            if !available {
                return Err(
                    ApiError::conflict(format!("Insufficient stock for {}", line.product_name)).at("items"),
                );
            }
        }
        if let Some(code) = &quote.coupon_code {
            let usable = store.coupons.iter().any(|c| {
                &c.code == code
                    && c.is_active
                    && c.usage_limit.is_none_or(|limit| c.usage_count < limit)
                    && c.expires_at.is_none_or(|expires| expires > now)
            });
            if !usable {
                return Err(ApiError::bad_request("Coupon is no longer available").at("coupon_code"));
            }
        }

        for line in &quote.lines {
            if let Some(product) = store.products.iter_mut().find(|p| p.id == line.product_id) {
                product.stock -= line.quantity;
            }
        }
        if let Some(code) = &quote.coupon_code {
            if let Some(coupon) = store.coupons.iter_mut().find(|c| &c.code == code) {
                coupon.usage_count += 1;
            }
        }

        let order_id = Uuid::new_v4();
        let details = OrderDetails {
            order: Order {
                id: order_id,
                user_id,
                status: OrderStatus::Pending,
                subtotal: quote.subtotal,
                discount: quote.discount,
                total: quote.total,
                coupon_code: quote.coupon_code.clone(),
                shipping_address: address.clone(),
                payment_intent_id: None,
                created_at: now,
                updated_at: now,
            },
            items: quote
                .lines
                .iter()
                .map(|line| OrderItem {
                    id: Uuid::new_v4(),
                    order_id,
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                })
                .collect(),
        };
        store.orders.push(details.clone());
        Ok(details)
    }

    async fn attach_payment_intent(&self, order_id: Uuid, intent_id: &str) -> RepoResult<()> {
        let mut store = self.store.lock().unwrap();
        if let Some(details) = store.orders.iter_mut().find(|o| o.order.id == order_id) {
            details.order.payment_intent_id = Some(intent_id.to_string());
        }
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<OrderDetails>> {
        Ok(self.order(id))
    }

    async fn list_user_orders(&self, user_id: Uuid) -> RepoResult<Vec<Order>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .orders
            .iter()
            .filter(|o| o.order.user_id == user_id)
            .map(|o| o.order.clone())
            .collect())
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> RepoResult<Vec<Order>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .orders
            .iter()
            .filter(|o| status.is_none_or(|s| o.order.status == s))
            .map(|o| o.order.clone())
            .collect())
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepoResult<Option<Order>> {
        let mut guard = self.store.lock().unwrap();
        let store = &mut *guard;
        let Some(details) = store
            .orders
            .iter_mut()
            .find(|o| o.order.id == id && o.order.status == from)
        else {
            return Ok(None);
        };

        details.order.status = to;
        details.order.updated_at = Utc::now();
        if to == OrderStatus::Canceled {
            for item in &details.items {
                if let Some(product) = store.products.iter_mut().find(|p| p.id == item.product_id) {
                    product.stock += item.quantity;
                }
            }
            if let Some(code) = &details.order.coupon_code {
                if let Some(coupon) = store.coupons.iter_mut().find(|c| &c.code == code) {
                    coupon.usage_count = (coupon.usage_count - 1).max(0);
                }
            }
        }
        Ok(Some(details.order.clone()))
    }

    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> RepoResult<bool> {
        let store = self.store.lock().unwrap();
        Ok(store.orders.iter().any(|o| {
            o.order.user_id == user_id
                && o.order.status == OrderStatus::Delivered
                && o.items.iter().any(|i| i.product_id == product_id)
        }))
    }

    async fn create_review(&self, user_id: Uuid, req: CreateReviewRequest) -> RepoResult<Review> {
        let mut store = self.store.lock().unwrap();
        if store
            .reviews
            .iter()
            .any(|r| r.user_id == user_id && r.product_id == req.product_id)
        {
            return Err(unique_violation("reviews_user_product_key"));
        }
        let author_name = store
            .users
            .iter()
            .find(|(u, _)| u.id == user_id)
            .map(|(u, _)| u.name.clone());
        let review = Review {
            id: Uuid::new_v4(),
            user_id,
            product_id: req.product_id,
            author_name,
            rating: req.rating,
            comment: req.comment,
            created_at: Utc::now(),
        };
        store.reviews.push(review.clone());
        Ok(review)
    }

    async fn list_reviews(&self, product_id: Uuid) -> RepoResult<Vec<Review>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn get_stats(&self) -> RepoResult<DashboardStats> {
        if self.broken {
            return Err(sqlx::Error::PoolTimedOut.into());
        }
        let store = self.store.lock().unwrap();
        Ok(DashboardStats {
            total_users: store.users.len() as i64,
            total_products: store.products.len() as i64,
            total_orders: store.orders.len() as i64,
            pending_orders: store
                .orders
                .iter()
                .filter(|o| o.order.status == OrderStatus::Pending)
                .count() as i64,
            low_stock_products: store.products.iter().filter(|p| p.is_active && p.stock < 5).count() as i64,
            total_revenue: store
                .orders
                .iter()
                .filter(|o| o.order.status == OrderStatus::Delivered)
                .map(|o| o.order.total)
                .sum(),
        })
    }
}

// --- Fixtures ---

pub fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Lovelace".to_string(),
        line1: "12 Analytical Row".to_string(),
        line2: None,
        city: "London".to_string(),
        postal_code: "N1 9GU".to_string(),
        country: "GB".to_string(),
        phone: "+44 20 7946 0000".to_string(),
    }
}

pub fn expired_at() -> chrono::DateTime<Utc> {
    Utc::now() - Duration::days(1)
}

// --- Application harness ---

pub struct TestApp {
    pub repo: Arc<InMemoryRepo>,
    pub config: AppConfig,
    pub state: AppState,
    pub router: Router,
}

pub fn test_state(repo: Arc<InMemoryRepo>, gateway: MockPaymentGateway, config: AppConfig) -> AppState {
    let payments: PaymentState = Arc::new(gateway);
    AppState::new(repo as RepositoryState, payments, config)
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(InMemoryRepo::new(), MockPaymentGateway::new())
}

pub fn spawn_app_with(repo: InMemoryRepo, gateway: MockPaymentGateway) -> TestApp {
    spawn_app_with_config(repo, gateway, AppConfig::default())
}

pub fn spawn_app_with_config(repo: InMemoryRepo, gateway: MockPaymentGateway, config: AppConfig) -> TestApp {
    let repo = Arc::new(repo);
    let state = test_state(repo.clone(), gateway, config.clone());
    let router = create_router(state.clone());
    TestApp {
        repo,
        config,
        state,
        router,
    }
}

impl TestApp {
    pub fn token_for(&self, user: &User) -> String {
        issue_token(user, &self.config).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(request(Method::GET, uri, token, None)).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.send(request(Method::POST, uri, token, Some(body))).await
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
