//! Product catalogue storage.

use sqlx::sqlite::SqlitePool;

use super::StoreError;
use crate::types::{NewProduct, Product, ProductImage, ProductUpdate};

#[derive(Clone)]
pub struct ProductStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    uuid: String,
    title: String,
    image_file_name: String,
    image_original_name: String,
    category: String,
    description: String,
    price: Option<f64>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.uuid,
            title: row.title,
            image: ProductImage {
                file_name: row.image_file_name,
                original_name: row.image_original_name,
            },
            category: row.category,
            description: row.description,
            price: row.price,
        }
    }
}

const PRODUCT_COLUMNS: &str =
    "uuid, title, image_file_name, image_original_name, category, description, price";

impl ProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a product and return it.
    pub async fn create(&self, input: &NewProduct) -> Result<Product, StoreError> {
        let uuid = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO products (uuid, title, image_file_name, image_original_name, category, description, price)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(&input.title)
        .bind(&input.image.file_name)
        .bind(&input.image.original_name)
        .bind(&input.category)
        .bind(&input.description)
        .bind(input.price)
        .execute(&self.pool)
        .await?;

        Ok(Product {
            id: uuid,
            title: input.title.clone(),
            image: input.image.clone(),
            category: input.category.clone(),
            description: input.description.clone(),
            price: input.price,
        })
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Product>, sqlx::Error> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE uuid = ?",
            PRODUCT_COLUMNS
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    /// One page of products in insertion order, plus the total count.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Product>, i64), sqlx::Error> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {} FROM products ORDER BY id LIMIT ? OFFSET ?",
            PRODUCT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Product::from).collect(), total.0))
    }

    /// Apply a partial update and return the updated product, or None if it does not exist.
    pub async fn update(
        &self,
        uuid: &str,
        update: &ProductUpdate,
    ) -> Result<Option<Product>, StoreError> {
        let (file_name, original_name) = match &update.image {
            Some(image) => (
                Some(image.file_name.as_str()),
                Some(image.original_name.as_str()),
            ),
            None => (None, None),
        };

        let result = sqlx::query(
            "UPDATE products SET
                title = COALESCE(?, title),
                image_file_name = COALESCE(?, image_file_name),
                image_original_name = COALESCE(?, image_original_name),
                category = COALESCE(?, category),
                description = COALESCE(?, description),
                price = COALESCE(?, price)
             WHERE uuid = ?",
        )
        .bind(update.title.as_deref())
        .bind(file_name)
        .bind(original_name)
        .bind(update.category.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price)
        .bind(uuid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(self.get_by_uuid(uuid).await?)
    }

    /// Number of products whose image is `file_name`.
    pub async fn count_by_image(&self, file_name: &str) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM products WHERE image_file_name = ?")
                .bind(file_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// Delete a product, returning the deleted record.
    pub async fn delete(&self, uuid: &str) -> Result<Option<Product>, sqlx::Error> {
        let Some(product) = self.get_by_uuid(uuid).await? else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM products WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(Some(product))
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, StoreError};
    use crate::types::{NewProduct, ProductImage, ProductUpdate};

    fn mug() -> NewProduct {
        NewProduct {
            title: "Mug".to_string(),
            image: ProductImage {
                file_name: "/images/mug.png".to_string(),
                original_name: "mug.png".to_string(),
            },
            category: "kitchen".to_string(),
            description: "A mug".to_string(),
            price: Some(350.0),
        }
    }

    #[tokio::test]
    async fn test_create_list_and_update() {
        let db = Database::open(":memory:").await.unwrap();
        let created = db.products().create(&mug()).await.unwrap();

        let (items, total) = db.products().list(10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0], created);

        let updated = db
            .products()
            .update(
                &created.id,
                &ProductUpdate {
                    price: Some(400.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.price, Some(400.0));
        assert_eq!(updated.title, "Mug");
    }

    #[tokio::test]
    async fn test_duplicate_title_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        db.products().create(&mug()).await.unwrap();
        assert!(matches!(
            db.products().create(&mug()).await,
            Err(StoreError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn test_count_by_image() {
        let db = Database::open(":memory:").await.unwrap();
        let first = db.products().create(&mug()).await.unwrap();
        let mut cup = mug();
        cup.title = "Cup".to_string();
        db.products().create(&cup).await.unwrap();

        assert_eq!(db.products().count_by_image("/images/mug.png").await.unwrap(), 2);
        db.products().delete(&first.id).await.unwrap();
        assert_eq!(db.products().count_by_image("/images/mug.png").await.unwrap(), 1);
        assert_eq!(db.products().count_by_image("/images/other.png").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_product() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(
            db.products()
                .update("missing", &ProductUpdate::default())
                .await
                .unwrap()
                .is_none()
        );
        assert!(db.products().delete("missing").await.unwrap().is_none());
    }
}
