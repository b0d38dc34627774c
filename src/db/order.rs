//! Order storage. Orders are numbered by their rowid and carry item snapshots.

use sqlx::sqlite::SqlitePool;

use crate::types::{Order, OrderItem, OrderStatus, PaymentMethod};

#[derive(Clone)]
pub struct OrderStore {
    pool: SqlitePool,
}

/// Validated order ready to be written.
#[derive(Debug, Clone)]
pub struct NewOrderRecord {
    pub user_id: i64,
    pub payment: PaymentMethod,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub total: f64,
    pub comment: String,
    pub items: Vec<OrderItem>,
}

/// Filters for the admin order listing.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Matches the order number exactly or the email as a substring.
    pub search: Option<String>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    uuid: String,
    status: String,
    payment: String,
    email: String,
    phone: String,
    address: String,
    total: f64,
    comment: String,
    customer_uuid: String,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    product_uuid: String,
    title: String,
    price: f64,
}

const ORDER_SELECT: &str = "SELECT o.id, o.uuid, o.status, o.payment, o.email, o.phone, o.address,
        o.total, o.comment, u.uuid AS customer_uuid, o.created_at
    FROM orders o JOIN users u ON u.id = o.user_id";

impl OrderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write an order and its items in one transaction. Returns the stored order.
    pub async fn create(&self, input: &NewOrderRecord) -> Result<Order, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO orders (uuid, user_id, payment, email, phone, address, total, comment)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(input.user_id)
        .bind(input.payment.as_str())
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.total)
        .bind(&input.comment)
        .execute(&mut *tx)
        .await?;
        let order_id = result.last_insert_rowid();

        for (position, item) in input.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_uuid, title, price)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(position as i64)
            .bind(&item.product_id)
            .bind(&item.title)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_by_number(order_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn items(&self, order_id: i64) -> Result<Vec<OrderItem>, sqlx::Error> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT product_uuid, title, price FROM order_items WHERE order_id = ? ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| OrderItem {
                product_id: r.product_uuid,
                title: r.title,
                price: r.price,
            })
            .collect())
    }

    async fn hydrate(&self, row: OrderRow) -> Result<Order, sqlx::Error> {
        let items = self.items(row.id).await?;
        Ok(Order {
            id: row.uuid,
            order_number: row.id,
            status: OrderStatus::parse(&row.status).unwrap_or(OrderStatus::New),
            payment: PaymentMethod::from_str(&row.payment),
            email: row.email,
            phone: row.phone,
            address: row.address,
            total: row.total,
            comment: row.comment,
            items,
            customer_id: row.customer_uuid,
            created_at: row.created_at,
        })
    }

    async fn hydrate_all(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, sqlx::Error> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }

    pub async fn get_by_number(&self, order_number: i64) -> Result<Option<Order>, sqlx::Error> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("{} WHERE o.id = ?", ORDER_SELECT))
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Same as `get_by_number` but only returns orders owned by `user_id`.
    pub async fn get_by_number_for_user(
        &self,
        order_number: i64,
        user_id: i64,
    ) -> Result<Option<Order>, sqlx::Error> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "{} WHERE o.id = ? AND o.user_id = ?",
            ORDER_SELECT
        ))
        .bind(order_number)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// One page of all orders, newest first, plus the filtered total.
    pub async fn list(
        &self,
        filter: &OrderFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64), sqlx::Error> {
        let status = filter.status.map(|s| s.as_str());
        let search = filter.search.as_deref().filter(|s| !s.is_empty());
        let search_number = search.and_then(|s| s.parse::<i64>().ok());
        let search_like = search.map(|s| format!("%{}%", s));

        const WHERE: &str = "WHERE (?1 IS NULL OR o.status = ?1)
            AND (?2 IS NULL OR o.email LIKE ?2 OR o.id = ?3)";

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "{} {} ORDER BY o.id DESC LIMIT ?4 OFFSET ?5",
            ORDER_SELECT, WHERE
        ))
        .bind(status)
        .bind(search_like.as_deref())
        .bind(search_number)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM orders o {}", WHERE))
            .bind(status)
            .bind(search_like.as_deref())
            .bind(search_number)
            .fetch_one(&self.pool)
            .await?;

        Ok((self.hydrate_all(rows).await?, total.0))
    }

    /// One page of a single user's orders, newest first, plus their total.
    pub async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64), sqlx::Error> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "{} WHERE o.user_id = ? ORDER BY o.id DESC LIMIT ? OFFSET ?",
            ORDER_SELECT
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((self.hydrate_all(rows).await?, total.0))
    }

    /// Set the status of an order. Returns the updated order, or None if it does not exist.
    pub async fn update_status(
        &self,
        order_number: i64,
        status: OrderStatus,
    ) -> Result<Option<Order>, sqlx::Error> {
        let result = sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(order_number)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_number(order_number).await
    }

    /// Delete an order by UUID, returning the deleted order.
    pub async fn delete(&self, uuid: &str) -> Result<Option<Order>, sqlx::Error> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("{} WHERE o.uuid = ?", ORDER_SELECT))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let order = self.hydrate(row).await?;

        sqlx::query("DELETE FROM orders WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(Some(order))
    }
}
