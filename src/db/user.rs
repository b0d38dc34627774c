use sqlx::sqlite::SqlitePool;

use super::StoreError;
use crate::types::{Account, Customer, CustomerUpdate, UserRole};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

impl User {
    /// Public view without internal id or password hash.
    pub fn account(&self) -> Account {
        Account {
            id: self.uuid.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: UserRole::from_str(&row.role),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    uuid: String,
    name: String,
    email: String,
    role: String,
    total_amount: f64,
    order_count: i64,
    last_order_date: Option<String>,
    created_at: String,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: row.uuid,
            name: row.name,
            email: row.email,
            role: UserRole::from_str(&row.role),
            total_amount: row.total_amount,
            order_count: row.order_count,
            last_order_date: row.last_order_date,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, uuid, name, email, password_hash, role";

const CUSTOMER_SELECT: &str = "SELECT u.uuid, u.name, u.email, u.role, u.created_at,
        COALESCE(SUM(o.total), 0.0) AS total_amount,
        COUNT(o.id) AS order_count,
        MAX(o.created_at) AS last_order_date
    FROM users u LEFT JOIN orders o ON o.user_id = u.id";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user. Returns the user ID.
    pub async fn create(
        &self,
        uuid: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, name, email, password_hash, role) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE uuid = ?", USER_COLUMNS))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Set the role for a user.
    pub async fn set_role(&self, id: i64, role: UserRole) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a partial update. Returns false if the user does not exist.
    pub async fn update(&self, uuid: &str, update: &CustomerUpdate) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET
                name = COALESCE(?, name),
                email = COALESCE(?, email),
                role = COALESCE(?, role)
             WHERE uuid = ?",
        )
        .bind(update.name.as_deref())
        .bind(update.email.as_deref())
        .bind(update.role.map(|r| r.as_str()))
        .bind(uuid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user (and their orders) by UUID.
    pub async fn delete_by_uuid(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One page of customers with their order statistics, plus the total count.
    pub async fn list_customers(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Customer>, i64), sqlx::Error> {
        let rows: Vec<CustomerRow> = sqlx::query_as(&format!(
            "{} GROUP BY u.id ORDER BY u.created_at DESC, u.id DESC LIMIT ? OFFSET ?",
            CUSTOMER_SELECT
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Customer::from).collect(), total.0))
    }

    /// Get a single customer with order statistics.
    pub async fn get_customer(&self, uuid: &str) -> Result<Option<Customer>, sqlx::Error> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "{} WHERE u.uuid = ? GROUP BY u.id",
            CUSTOMER_SELECT
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Customer::from))
    }
}
