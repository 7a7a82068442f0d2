use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, Role, UserId};
use domain::auth::User;
use domain::catalog::Product;
use domain::order::{DeliveryInfo, Money, Order, OrderLine, OrderParts, OrderStatus};
use domain::store::{
    MarketplaceStore, OrderScope, Page, PageRequest, Result, StatusEdit, StoreError,
    reservation_plan,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::{DbResultExt, PostgresStoreError, corrupt};

const ORDER_COLUMNS: &str = r#"
    o.id, o.client_id, o.client_name, o.total_price_cents, o.status, o.status_notes,
    o.status_updated_at, o.placed_at,
    d.address, d.estimated_delivery_at, d.actual_delivery_at,
    d.notes AS delivery_notes, d.status AS delivery_status
    FROM orders o
    JOIN delivery_info d ON d.order_id = o.id
"#;

/// PostgreSQL-backed marketplace store.
///
/// Stock reservation locks product rows with `SELECT ... FOR UPDATE` in
/// ascending id order, so concurrent placements serialize per product and
/// cannot deadlock against each other.
#[derive(Clone)]
pub struct PostgresMarketplaceStore {
    pool: PgPool,
}

impl PostgresMarketplaceStore {
    /// Creates a new PostgreSQL marketplace store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url` and wraps it.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> std::result::Result<Self, PostgresStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), PostgresStoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let quantity: i64 = row.try_get("available_quantity").db()?;
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id").db()?),
            name: row.try_get("name").db()?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents").db()?),
            available_quantity: u32::try_from(quantity)
                .map_err(|e| corrupt("available_quantity", e))?,
            owner_id: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id").db()?),
        })
    }

    fn row_to_line(row: &PgRow) -> Result<OrderLine> {
        let quantity: i64 = row.try_get("quantity").db()?;
        Ok(OrderLine {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id").db()?),
            product_name: row.try_get("product_name").db()?,
            farmer_id: UserId::from_uuid(row.try_get::<Uuid, _>("farmer_id").db()?),
            quantity: u32::try_from(quantity).map_err(|e| corrupt("quantity", e))?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents").db()?),
        })
    }

    fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
        let status: String = row.try_get("status").db()?;
        let delivery_status: String = row.try_get("delivery_status").db()?;

        let delivery = DeliveryInfo {
            address: row.try_get("address").db()?,
            estimated_delivery_at: row.try_get("estimated_delivery_at").db()?,
            actual_delivery_at: row.try_get("actual_delivery_at").db()?,
            notes: row.try_get("delivery_notes").db()?,
            status: delivery_status
                .parse()
                .map_err(|e| corrupt("delivery_info.status", e))?,
        };

        Ok(Order::from(OrderParts {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id").db()?),
            client_id: UserId::from_uuid(row.try_get::<Uuid, _>("client_id").db()?),
            client_name: row.try_get("client_name").db()?,
            lines,
            total_price: Money::from_cents(row.try_get("total_price_cents").db()?),
            status: status.parse().map_err(|e| corrupt("orders.status", e))?,
            status_notes: row.try_get("status_notes").db()?,
            status_updated_at: row.try_get("status_updated_at").db()?,
            placed_at: row.try_get("placed_at").db()?,
            delivery,
        }))
    }

    /// Attaches lines to the fetched order rows, keeping the row order.
    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .db()?;

        let line_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, farmer_id, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .db()?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &line_rows {
            let order_id: Uuid = row.try_get("order_id").db()?;
            lines
                .entry(order_id)
                .or_default()
                .push(Self::row_to_line(row)?);
        }

        rows.iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, lines.remove(&id).unwrap_or_default()))
            .collect()
    }

    /// Locks, checks and decrements every product in the plan.
    async fn reserve(conn: &mut PgConnection, order: &Order) -> Result<()> {
        for (product_id, requested) in reservation_plan(order.lines()) {
            let available: Option<i64> = sqlx::query_scalar(
                "SELECT available_quantity FROM products WHERE id = $1 FOR UPDATE",
            )
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .db()?;

            let available = available.ok_or(StoreError::ProductNotFound(product_id))?;
            if available < i64::from(requested) {
                return Err(StoreError::InsufficientStock {
                    product_id,
                    requested,
                    available: u32::try_from(available)
                        .map_err(|e| corrupt("available_quantity", e))?,
                });
            }

            sqlx::query(
                "UPDATE products SET available_quantity = available_quantity - $2 WHERE id = $1",
            )
            .bind(product_id.as_uuid())
            .bind(i64::from(requested))
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("products_available_quantity_non_negative")
                {
                    return StoreError::InsufficientStock {
                        product_id,
                        requested,
                        available: u32::try_from(available).unwrap_or(0),
                    };
                }
                PostgresStoreError::Database(e).into()
            })?;
        }
        Ok(())
    }

    /// Loads an order with its row locks held until the transaction ends.
    ///
    /// Every status write goes through here first, so writers of one order
    /// queue on its `orders` row and each edit sees the previous one's result.
    async fn lock_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} WHERE o.id = $1 FOR UPDATE"))
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .db()?
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let line_rows = sqlx::query(
            r#"
            SELECT product_id, product_name, farmer_id, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = $1
            ORDER BY line_no
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .db()?;
        let lines = line_rows
            .iter()
            .map(Self::row_to_line)
            .collect::<Result<Vec<_>>>()?;

        Self::row_to_order(&row, lines)
    }

    async fn write_order_status(conn: &mut PgConnection, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, status_notes = $3, status_updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.status_notes())
        .bind(order.status_updated_at())
        .execute(&mut *conn)
        .await
        .db()?;
        Ok(())
    }

    async fn write_delivery(conn: &mut PgConnection, order: &Order) -> Result<()> {
        let delivery = order.delivery();
        sqlx::query(
            r#"
            UPDATE delivery_info
            SET actual_delivery_at = $2, notes = $3, status = $4
            WHERE order_id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(delivery.actual_delivery_at)
        .bind(&delivery.notes)
        .bind(delivery.status.as_str())
        .execute(&mut *conn)
        .await
        .db()?;
        Ok(())
    }

    /// Returns released quantities to their products.
    async fn restock(conn: &mut PgConnection, release: &[OrderLine]) -> Result<()> {
        for (product_id, quantity) in reservation_plan(release) {
            sqlx::query(
                "UPDATE products SET available_quantity = available_quantity + $2 WHERE id = $1",
            )
            .bind(product_id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *conn)
            .await
            .db()?;
        }
        Ok(())
    }

    async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, client_id, client_name, total_price_cents, status, status_notes, status_updated_at, placed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.client_id().as_uuid())
        .bind(order.client_name())
        .bind(order.total_price().cents())
        .bind(order.status().as_str())
        .bind(order.status_notes())
        .bind(order.status_updated_at())
        .bind(order.placed_at())
        .execute(&mut *conn)
        .await
        .db()?;

        for (line_no, line) in order.lines().iter().enumerate() {
            let line_no = i32::try_from(line_no).map_err(|e| corrupt("line_no", e))?;
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, product_id, product_name, farmer_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(line_no)
            .bind(line.product_id.as_uuid())
            .bind(&line.product_name)
            .bind(line.farmer_id.as_uuid())
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.cents())
            .execute(&mut *conn)
            .await
            .db()?;
        }

        let delivery = order.delivery();
        sqlx::query(
            r#"
            INSERT INTO delivery_info (order_id, address, estimated_delivery_at, actual_delivery_at, notes, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(&delivery.address)
        .bind(delivery.estimated_delivery_at)
        .bind(delivery.actual_delivery_at)
        .bind(&delivery.notes)
        .bind(delivery.status.as_str())
        .execute(&mut *conn)
        .await
        .db()?;

        Ok(())
    }
}

#[async_trait]
impl MarketplaceStore for PostgresMarketplaceStore {
    async fn put_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price_cents, available_quantity, owner_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                unit_price_cents = EXCLUDED.unit_price_cents,
                available_quantity = EXCLUDED.available_quantity,
                owner_id = EXCLUDED.owner_id
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.unit_price.cents())
        .bind(i64::from(product.available_quantity))
        .bind(product.owner_id.as_uuid())
        .execute(&self.pool)
        .await
        .db()?;
        Ok(())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, unit_price_cents, available_quantity, owner_id
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .db()?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn put_user(&self, user: User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET username = EXCLUDED.username, role = EXCLUDED.role
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await
        .db()?;
        Ok(())
    }

    async fn count_users_by_role(&self, role: Role) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await
            .db()?;
        Ok(count.unsigned_abs())
    }

    async fn place_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await.db()?;

        // Dropping the transaction on error rolls back any decrement already made
        if let Err(e) = Self::reserve(&mut tx, order).await {
            tracing::debug!(order_id = %order.id(), error = %e, "reservation rolled back");
            return Err(e);
        }
        Self::insert_order(&mut tx, order).await?;

        tx.commit().await.db()?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} WHERE o.id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .db()?;

        Ok(self.hydrate(row.into_iter().collect()).await?.pop())
    }

    async fn modify_order_status(
        &self,
        order_id: OrderId,
        edit: StatusEdit<'_>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await.db()?;

        let mut order = Self::lock_order(&mut tx, order_id).await?;
        let release = edit(&mut order).map_err(StoreError::rejected)?;
        Self::write_order_status(&mut tx, &order).await?;
        Self::restock(&mut tx, &release).await?;

        tx.commit().await.db()?;
        Ok(order)
    }

    async fn modify_delivery_status(
        &self,
        order_id: OrderId,
        edit: StatusEdit<'_>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await.db()?;

        let mut order = Self::lock_order(&mut tx, order_id).await?;
        let release = edit(&mut order).map_err(StoreError::rejected)?;
        Self::write_delivery(&mut tx, &order).await?;
        Self::write_order_status(&mut tx, &order).await?;
        Self::restock(&mut tx, &release).await?;

        tx.commit().await.db()?;
        Ok(order)
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<bool> {
        // Lines and the delivery record go with the order through ON DELETE CASCADE
        let deleted = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .execute(&self.pool)
            .await
            .db()?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn list_orders(&self, scope: OrderScope, page: PageRequest) -> Result<Page<Order>> {
        let (filter, subject) = match scope {
            OrderScope::All => ("TRUE", None),
            OrderScope::Client(client_id) => ("o.client_id = $1", Some(client_id.as_uuid())),
            OrderScope::Farmer(farmer_id) => (
                "EXISTS (SELECT 1 FROM order_lines l WHERE l.order_id = o.id AND l.farmer_id = $1)",
                Some(farmer_id.as_uuid()),
            ),
        };
        let (limit_param, offset_param) = if subject.is_some() { (2, 3) } else { (1, 2) };

        let count_sql = format!("SELECT COUNT(*) FROM orders o WHERE {filter}");
        let page_sql = format!(
            "SELECT {ORDER_COLUMNS} WHERE {filter} ORDER BY o.placed_at DESC, o.id ASC LIMIT ${limit_param} OFFSET ${offset_param}"
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut page_query = sqlx::query(&page_sql);
        if let Some(subject) = subject {
            count_query = count_query.bind(subject);
            page_query = page_query.bind(subject);
        }

        let total = count_query.fetch_one(&self.pool).await.db()?;
        let rows = page_query
            .bind(i64::try_from(page.limit()).map_err(|e| corrupt("limit", e))?)
            .bind(i64::try_from(page.offset()).map_err(|e| corrupt("offset", e))?)
            .fetch_all(&self.pool)
            .await
            .db()?;

        let items = self.hydrate(rows).await?;
        Ok(Page::new(items, page, total.unsigned_abs()))
    }

    async fn orders_placed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} WHERE o.placed_at >= $1 AND o.placed_at < $2 ORDER BY o.placed_at ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .db()?;

        self.hydrate(rows).await
    }

    async fn count_orders(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .db()?;
        Ok(count.unsigned_abs())
    }

    async fn count_orders_with_status(&self, status: OrderStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .db()?;
        Ok(count.unsigned_abs())
    }
}
