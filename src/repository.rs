use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    checkout::Quote,
    error::ApiError,
    models::{
        Brand, Category, Coupon, CreateBrandRequest, CreateCategoryRequest, CreateCouponRequest,
        CreateProductRequest, CreateReviewRequest, CreateSubcategoryRequest, DashboardStats, NewUser,
        Order, OrderDetails, OrderItem, OrderStatus, Product, ProductFilter, ProductSort, Review,
        Role, ShippingAddress, Subcategory, UpdateBrandRequest, UpdateCategoryRequest,
        UpdateCouponRequest, UpdateProductRequest, UpdateSubcategoryRequest, User, UserWithPassword,
        slugify,
    },
};

pub type RepoResult<T> = Result<T, ApiError>;

/// Repository Trait
///
/// The abstract contract for every persistence operation. Handlers only see
/// `Arc<dyn Repository>`, which keeps them testable against in-memory doubles.
///
/// Store failures are returned as `ApiError::Database` and classified by the error
/// normalizer; methods that enforce a business rule inside a transaction (stock,
/// coupon usage) return application errors directly.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserWithPassword>>;
    async fn get_password_hash(&self, id: Uuid) -> RepoResult<Option<String>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    // Partial update; `None` keeps the stored value.
    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        password_hash: Option<String>,
    ) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> RepoResult<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;

    // --- Catalog taxonomy ---
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>>;
    async fn create_category(&self, req: CreateCategoryRequest) -> RepoResult<Category>;
    async fn update_category(&self, id: Uuid, req: UpdateCategoryRequest) -> RepoResult<Option<Category>>;
    async fn delete_category(&self, id: Uuid) -> RepoResult<bool>;

    async fn list_subcategories(&self, category_id: Option<Uuid>) -> RepoResult<Vec<Subcategory>>;
    async fn create_subcategory(&self, req: CreateSubcategoryRequest) -> RepoResult<Subcategory>;
    async fn update_subcategory(
        &self,
        id: Uuid,
        req: UpdateSubcategoryRequest,
    ) -> RepoResult<Option<Subcategory>>;
    async fn delete_subcategory(&self, id: Uuid) -> RepoResult<bool>;

    async fn list_brands(&self) -> RepoResult<Vec<Brand>>;
    async fn create_brand(&self, req: CreateBrandRequest) -> RepoResult<Brand>;
    async fn update_brand(&self, id: Uuid, req: UpdateBrandRequest) -> RepoResult<Option<Brand>>;
    async fn delete_brand(&self, id: Uuid) -> RepoResult<bool>;

    // --- Products ---
    // Returns one page plus the total number of matches.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        include_inactive: bool,
    ) -> RepoResult<(Vec<Product>, i64)>;
    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>>;
    async fn get_products_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<Product>>;
    async fn create_product(&self, req: CreateProductRequest) -> RepoResult<Product>;
    async fn update_product(&self, id: Uuid, req: UpdateProductRequest) -> RepoResult<Option<Product>>;
    async fn delete_product(&self, id: Uuid) -> RepoResult<bool>;

    // --- Coupons ---
    async fn list_coupons(&self) -> RepoResult<Vec<Coupon>>;
    async fn get_coupon(&self, id: Uuid) -> RepoResult<Option<Coupon>>;
    async fn get_coupon_by_code(&self, code: &str) -> RepoResult<Option<Coupon>>;
    async fn create_coupon(&self, req: CreateCouponRequest) -> RepoResult<Coupon>;
    async fn update_coupon(&self, id: Uuid, req: UpdateCouponRequest) -> RepoResult<Option<Coupon>>;
    async fn delete_coupon(&self, id: Uuid) -> RepoResult<bool>;

    // --- Orders ---
    /// Atomically reserves stock, consumes one coupon use and writes the order.
    async fn place_order(
        &self,
        user_id: Uuid,
        quote: &Quote,
        address: &ShippingAddress,
    ) -> RepoResult<OrderDetails>;
    async fn attach_payment_intent(&self, order_id: Uuid, intent_id: &str) -> RepoResult<()>;
    async fn get_order(&self, id: Uuid) -> RepoResult<Option<OrderDetails>>;
    async fn list_user_orders(&self, user_id: Uuid) -> RepoResult<Vec<Order>>;
    async fn list_orders(&self, status: Option<OrderStatus>) -> RepoResult<Vec<Order>>;
    /// Compare-and-set on the status. `None` when the order is missing or no longer in
    /// `from`. Moving to CANCELED returns the items to stock.
    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepoResult<Option<Order>>;

    // --- Reviews ---
    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> RepoResult<bool>;
    async fn create_review(&self, user_id: Uuid, req: CreateReviewRequest) -> RepoResult<Review>;
    async fn list_reviews(&self, product_id: Uuid) -> RepoResult<Vec<Review>>;

    async fn get_stats(&self) -> RepoResult<DashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, email, name, role, created_at";
const PRODUCT_COLUMNS: &str = "id, name, description, price, stock, features, images, \
     category_id, subcategory_id, brand_id, is_active, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, status, subtotal, discount, total, coupon_code, \
     full_name, line1, line2, city, postal_code, country, phone, payment_intent_id, \
     created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, unit_price, quantity";
const COUPON_COLUMNS: &str = "id, code, discount_type, discount_value, min_order_amount, \
     usage_limit, usage_count, expires_at, is_active, created_at";

/// PostgresRepository
///
/// The concrete implementation of `Repository`, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escapes the `ILIKE` wildcards so user input matches literally.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Appends the WHERE clause shared by the product page query and its count query.
fn push_product_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &ProductFilter,
    include_inactive: bool,
) {
    builder.push(" WHERE TRUE");
    if !include_inactive {
        builder.push(" AND is_active = TRUE");
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR description ILIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(category_id) = filter.category_id {
        builder.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(subcategory_id) = filter.subcategory_id {
        builder.push(" AND subcategory_id = ").push_bind(subcategory_id);
    }
    if let Some(brand_id) = filter.brand_id {
        builder.push(" AND brand_id = ").push_bind(brand_id);
    }
    if let Some(min_price) = filter.min_price {
        builder.push(" AND price >= ").push_bind(min_price);
    }
    if let Some(max_price) = filter.max_price {
        builder.push(" AND price <= ").push_bind(max_price);
    }
    if filter.in_stock == Some(true) {
        builder.push(" AND stock > 0");
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserWithPassword>> {
        let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, UserWithPassword>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_password_hash(&self, id: Uuid) -> RepoResult<Option<String>> {
        Ok(sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, name, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.email)
            .bind(user.name)
            .bind(user.password_hash)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        password_hash: Option<String>,
    ) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), \
             password_hash = COALESCE($3, password_hash) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(name)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> RepoResult<Option<User>> {
        let sql = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- CATALOG TAXONOMY ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, description, created_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, description, created_at FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_category(&self, req: CreateCategoryRequest) -> RepoResult<Category> {
        Ok(sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, slug, description) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, slug, description, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(slugify(&req.name))
        .bind(req.description)
        .fetch_one(&self.pool)
        .await?)
    }

    /// update_category
    ///
    /// Renaming also regenerates the slug.
    async fn update_category(&self, id: Uuid, req: UpdateCategoryRequest) -> RepoResult<Option<Category>> {
        let slug = req.name.as_deref().map(slugify);
        Ok(sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = COALESCE($2, name), slug = COALESCE($3, slug), \
             description = COALESCE($4, description) WHERE id = $1 \
             RETURNING id, name, slug, description, created_at",
        )
        .bind(id)
        .bind(req.name)
        .bind(slug)
        .bind(req.description)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_category(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_subcategories(&self, category_id: Option<Uuid>) -> RepoResult<Vec<Subcategory>> {
        Ok(sqlx::query_as::<_, Subcategory>(
            "SELECT id, category_id, name, slug, created_at FROM subcategories \
             WHERE ($1::uuid IS NULL OR category_id = $1) ORDER BY name",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_subcategory(&self, req: CreateSubcategoryRequest) -> RepoResult<Subcategory> {
        Ok(sqlx::query_as::<_, Subcategory>(
            "INSERT INTO subcategories (id, category_id, name, slug) VALUES ($1, $2, $3, $4) \
             RETURNING id, category_id, name, slug, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(req.category_id)
        .bind(&req.name)
        .bind(slugify(&req.name))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_subcategory(
        &self,
        id: Uuid,
        req: UpdateSubcategoryRequest,
    ) -> RepoResult<Option<Subcategory>> {
        let slug = req.name.as_deref().map(slugify);
        Ok(sqlx::query_as::<_, Subcategory>(
            "UPDATE subcategories SET category_id = COALESCE($2, category_id), \
             name = COALESCE($3, name), slug = COALESCE($4, slug) WHERE id = $1 \
             RETURNING id, category_id, name, slug, created_at",
        )
        .bind(id)
        .bind(req.category_id)
        .bind(req.name)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_subcategory(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM subcategories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_brands(&self) -> RepoResult<Vec<Brand>> {
        Ok(sqlx::query_as::<_, Brand>(
            "SELECT id, name, slug, logo_url, created_at FROM brands ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_brand(&self, req: CreateBrandRequest) -> RepoResult<Brand> {
        Ok(sqlx::query_as::<_, Brand>(
            "INSERT INTO brands (id, name, slug, logo_url) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, slug, logo_url, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(slugify(&req.name))
        .bind(req.logo_url)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_brand(&self, id: Uuid, req: UpdateBrandRequest) -> RepoResult<Option<Brand>> {
        let slug = req.name.as_deref().map(slugify);
        Ok(sqlx::query_as::<_, Brand>(
            "UPDATE brands SET name = COALESCE($2, name), slug = COALESCE($3, slug), \
             logo_url = COALESCE($4, logo_url) WHERE id = $1 \
             RETURNING id, name, slug, logo_url, created_at",
        )
        .bind(id)
        .bind(req.name)
        .bind(slug)
        .bind(req.logo_url)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_brand(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM brands WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- PRODUCTS ---

    /// list_products
    ///
    /// Dynamic filtering with `QueryBuilder`, so every user-supplied value is bound rather
    /// than spliced into the SQL. The count query reuses the same WHERE clause.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        include_inactive: bool,
    ) -> RepoResult<(Vec<Product>, i64)> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, filter, include_inactive);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_product_filters(&mut builder, filter, include_inactive);

        builder.push(match filter.sort.unwrap_or_default() {
            ProductSort::Newest => " ORDER BY created_at DESC",
            ProductSort::PriceAsc => " ORDER BY price ASC, created_at DESC",
            ProductSort::PriceDesc => " ORDER BY price DESC, created_at DESC",
            ProductSort::Name => " ORDER BY name ASC",
        });
        builder
            .push(" LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let products = builder
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;
        Ok((products, total))
    }

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_products_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)");
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_product(&self, req: CreateProductRequest) -> RepoResult<Product> {
        let sql = format!(
            "INSERT INTO products (id, name, description, price, stock, features, images, \
             category_id, subcategory_id, brand_id, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {PRODUCT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.name)
            .bind(req.description)
            .bind(req.price)
            .bind(req.stock)
            .bind(req.features)
            .bind(req.images)
            .bind(req.category_id)
            .bind(req.subcategory_id)
            .bind(req.brand_id)
            .bind(req.is_active)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_product
    ///
    /// Uses `COALESCE` so only the fields present in `req` are written.
    async fn update_product(&self, id: Uuid, req: UpdateProductRequest) -> RepoResult<Option<Product>> {
        let sql = format!(
            "UPDATE products SET name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             price = COALESCE($4, price), \
             stock = COALESCE($5, stock), \
             features = COALESCE($6, features), \
             images = COALESCE($7, images), \
             category_id = COALESCE($8, category_id), \
             subcategory_id = COALESCE($9, subcategory_id), \
             brand_id = COALESCE($10, brand_id), \
             is_active = COALESCE($11, is_active), \
             updated_at = NOW() \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(req.name)
            .bind(req.description)
            .bind(req.price)
            .bind(req.stock)
            .bind(req.features)
            .bind(req.images)
            .bind(req.category_id)
            .bind(req.subcategory_id)
            .bind(req.brand_id)
            .bind(req.is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_product(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- COUPONS ---

    async fn list_coupons(&self) -> RepoResult<Vec<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Coupon>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_coupon(&self, id: Uuid) -> RepoResult<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1");
        Ok(sqlx::query_as::<_, Coupon>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_coupon_by_code(&self, code: &str) -> RepoResult<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1");
        Ok(sqlx::query_as::<_, Coupon>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_coupon(&self, req: CreateCouponRequest) -> RepoResult<Coupon> {
        let sql = format!(
            "INSERT INTO coupons (id, code, discount_type, discount_value, min_order_amount, \
             usage_limit, expires_at, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COUPON_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Coupon>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.code)
            .bind(req.discount_type)
            .bind(req.discount_value)
            .bind(req.min_order_amount)
            .bind(req.usage_limit)
            .bind(req.expires_at)
            .bind(req.is_active)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_coupon(&self, id: Uuid, req: UpdateCouponRequest) -> RepoResult<Option<Coupon>> {
        let sql = format!(
            "UPDATE coupons SET discount_value = COALESCE($2, discount_value), \
             min_order_amount = COALESCE($3, min_order_amount), \
             usage_limit = COALESCE($4, usage_limit), \
             expires_at = COALESCE($5, expires_at), \
             is_active = COALESCE($6, is_active) \
             WHERE id = $1 RETURNING {COUPON_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Coupon>(&sql)
            .bind(id)
            .bind(req.discount_value)
            .bind(req.min_order_amount)
            .bind(req.usage_limit)
            .bind(req.expires_at)
            .bind(req.is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_coupon(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM coupons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- ORDERS ---

    /// place_order
    ///
    /// Runs in a single transaction. Each stock decrement is guarded by `stock >= qty`
    /// and the coupon increment by its usage limit, so two concurrent checkouts can never
    /// oversell. Returning early drops the transaction, which rolls it back.
    async fn place_order(
        &self,
        user_id: Uuid,
        quote: &Quote,
        address: &ShippingAddress,
    ) -> RepoResult<OrderDetails> {
        let mut tx = self.pool.begin().await?;

        for line in &quote.lines {
            let res = sqlx::query(
                "UPDATE products SET stock = stock - $1, updated_at = NOW() \
                 WHERE id = $2 AND is_active = TRUE AND stock >= $1",
            )
            .bind(line.quantity)
            .bind(line.product_id)
            .execute(&mut *tx)
            .await?;
            if res.rows_affected() == 0 {
                return Err(
                    ApiError::conflict(format!("Insufficient stock for {}", line.product_name))
                        .at("items"),
                );
            }
        }

        if let Some(code) = &quote.coupon_code {
            let res = sqlx::query(
                "UPDATE coupons SET usage_count = usage_count + 1 \
                 WHERE code = $1 AND is_active = TRUE \
                 AND (usage_limit IS NULL OR usage_count < usage_limit) \
                 AND (expires_at IS NULL OR expires_at > NOW())",
            )
            .bind(code)
            .execute(&mut *tx)
            .await?;
            if res.rows_affected() == 0 {
                return Err(ApiError::bad_request("Coupon is no longer available").at("coupon_code"));
            }
        }

        let sql = format!(
            "INSERT INTO orders (id, user_id, status, subtotal, discount, total, coupon_code, \
             full_name, line1, line2, city, postal_code, country, phone) \
             VALUES ($1, $2, 'PENDING', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(quote.subtotal)
            .bind(quote.discount)
            .bind(quote.total)
            .bind(&quote.coupon_code)
            .bind(&address.full_name)
            .bind(&address.line1)
            .bind(&address.line2)
            .bind(&address.city)
            .bind(&address.postal_code)
            .bind(&address.country)
            .bind(&address.phone)
            .fetch_one(&mut *tx)
            .await?;

        let item_sql = format!(
            "INSERT INTO order_items (id, order_id, product_id, product_name, unit_price, quantity) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ORDER_ITEM_COLUMNS}"
        );
        let mut items = Vec::with_capacity(quote.lines.len());
        for line in &quote.lines {
            let item = sqlx::query_as::<_, OrderItem>(&item_sql)
                .bind(Uuid::new_v4())
                .bind(order.id)
                .bind(line.product_id)
                .bind(&line.product_name)
                .bind(line.unit_price)
                .bind(line.quantity)
                .fetch_one(&mut *tx)
                .await?;
            items.push(item);
        }

        tx.commit().await?;
        Ok(OrderDetails { order, items })
    }

    async fn attach_payment_intent(&self, order_id: Uuid, intent_id: &str) -> RepoResult<()> {
        sqlx::query("UPDATE orders SET payment_intent_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(intent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<OrderDetails>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let Some(order) = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let item_sql =
            format!("SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY product_name");
        let items = sqlx::query_as::<_, OrderItem>(&item_sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(OrderDetails { order, items }))
    }

    async fn list_user_orders(&self, user_id: Uuid) -> RepoResult<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> RepoResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::order_status IS NULL OR status = $1) ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Order>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepoResult<Option<Order>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE orders SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(canceled) = order.as_ref().filter(|_| to == OrderStatus::Canceled) {
            sqlx::query(
                "UPDATE products p SET stock = p.stock + oi.quantity, updated_at = NOW() \
                 FROM order_items oi WHERE oi.order_id = $1 AND oi.product_id = p.id",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;

            // Give back the coupon use reserved at checkout.
            if let Some(code) = &canceled.coupon_code {
                sqlx::query(
                    "UPDATE coupons SET usage_count = usage_count - 1 \
                     WHERE code = $1 AND usage_count > 0",
                )
                .bind(code)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(order)
    }

    // --- REVIEWS ---

    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM orders o JOIN order_items oi ON oi.order_id = o.id \
             WHERE o.user_id = $1 AND oi.product_id = $2 AND o.status = 'DELIVERED')",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// create_review
    ///
    /// Inserts and joins the author's name in one round trip (CTE). A second review by
    /// the same user trips `reviews_user_product_key`, which surfaces as a 409.
    async fn create_review(&self, user_id: Uuid, req: CreateReviewRequest) -> RepoResult<Review> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (id, user_id, product_id, rating, comment)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, user_id, product_id, rating, comment, created_at
            )
            SELECT i.id, i.user_id, i.product_id, u.name AS author_name,
                   i.rating, i.comment, i.created_at
            FROM inserted i JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(req.product_id)
        .bind(req.rating)
        .bind(req.comment)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_reviews(&self, product_id: Uuid) -> RepoResult<Vec<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            SELECT r.id, r.user_id, r.product_id, u.name AS author_name,
                   r.rating, r.comment, r.created_at
            FROM reviews r JOIN users u ON u.id = r.user_id
            WHERE r.product_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// get_stats
    ///
    /// Compiles the dashboard counters. Revenue only counts delivered orders.
    async fn get_stats(&self) -> RepoResult<DashboardStats> {
        let count = |sql: &'static str| sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool);

        Ok(DashboardStats {
            total_users: count("SELECT COUNT(*) FROM users").await?,
            total_products: count("SELECT COUNT(*) FROM products").await?,
            total_orders: count("SELECT COUNT(*) FROM orders").await?,
            pending_orders: count("SELECT COUNT(*) FROM orders WHERE status = 'PENDING'").await?,
            low_stock_products: count("SELECT COUNT(*) FROM products WHERE is_active AND stock < 5")
                .await?,
            total_revenue: count(
                "SELECT COALESCE(SUM(total), 0)::BIGINT FROM orders WHERE status = 'DELIVERED'",
            )
            .await?,
        })
    }
}
