//! Product catalogue endpoints.
//!
//! - GET `/` - Paginated product list (public)
//! - GET `/{id}` - Single product (public)
//! - POST `/` - Create product (admin, CSRF)
//! - PATCH `/{id}` - Partial update (admin, CSRF)
//! - DELETE `/{id}` - Delete product, and its image if unused (admin, CSRF)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tracing::{info, warn};

use super::Guards;
use super::error::{ApiError, ResultExt, StoreResultExt, validate_length, validate_uuid};
use super::query::{PageParams, QueryMap};
use super::upload::UploadConfig;
use crate::auth::{AdminOnly, Auth, require_auth};
use crate::csrf::csrf_protect;
use crate::db::Database;
use crate::types::{NewProduct, PaginatedList, Product, ProductImage, ProductUpdate};

const DUPLICATE_TITLE: &str = "Product with this title already exists";

#[derive(Clone)]
pub struct ProductsState {
    pub db: Database,
    pub uploads: Arc<UploadConfig>,
}

impl ProductsState {
    /// Remove an uploaded image once no product references it.
    async fn release_image(&self, file_name: &str) {
        match self.db.products().count_by_image(file_name).await {
            Ok(0) => self.uploads.remove(file_name).await,
            Ok(_) => {}
            Err(e) => warn!(file = %file_name, error = %e, "Failed to check image references"),
        }
    }
}

pub fn router(state: ProductsState, guards: &Guards) -> Router {
    let admin = Router::new()
        .route("/", post(create_product))
        .route("/{id}", patch(update_product).delete(delete_product))
        .route_layer(middleware::from_fn_with_state(
            guards.csrf.clone(),
            csrf_protect,
        ))
        .route_layer(middleware::from_fn_with_state(
            guards.jwt.clone(),
            require_auth,
        ));

    Router::new()
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
        .merge(admin)
        .with_state(state)
}

fn validate_title(title: &str) -> Result<(), ApiError> {
    validate_length("Title", title, 2, 30)
}

fn validate_image(image: &ProductImage) -> Result<(), ApiError> {
    if image.file_name.trim().is_empty() {
        return Err(ApiError::bad_request("Image file name is required"));
    }
    Ok(())
}

fn validate_price(price: Option<f64>) -> Result<(), ApiError> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => {
            Err(ApiError::bad_request("Price must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

async fn list_products(
    State(state): State<ProductsState>,
    QueryMap(query): QueryMap,
) -> Result<Json<PaginatedList<Product>>, ApiError> {
    let params = PageParams::from_query(&query);
    let (items, total) = state
        .db
        .products()
        .list(params.limit, params.offset())
        .await
        .db_err("Failed to list products")?;

    Ok(Json(PaginatedList {
        items,
        pagination: params.pagination(total),
    }))
}

async fn get_product(
    State(state): State<ProductsState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    validate_uuid(&id)?;
    state
        .db
        .products()
        .get_by_uuid(&id)
        .await
        .db_err("Failed to get product")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

async fn create_product(
    State(state): State<ProductsState>,
    auth: Auth<AdminOnly>,
    Json(mut body): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    body.title = body.title.trim().to_string();
    body.category = body.category.trim().to_string();
    validate_title(&body.title)?;
    validate_image(&body.image)?;
    validate_price(body.price)?;
    if body.category.is_empty() {
        return Err(ApiError::bad_request("Category is required"));
    }

    let product = state
        .db
        .products()
        .create(&body)
        .await
        .store_err("Failed to create product", DUPLICATE_TITLE)?;

    info!(admin = %auth.principal().id, product = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<ProductsState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
    Json(mut body): Json<ProductUpdate>,
) -> Result<Json<Product>, ApiError> {
    validate_uuid(&id)?;
    if let Some(title) = body.title.as_mut() {
        *title = title.trim().to_string();
        validate_title(title)?;
    }
    if let Some(category) = body.category.as_deref() {
        if category.trim().is_empty() {
            return Err(ApiError::bad_request("Category cannot be empty"));
        }
    }
    if let Some(image) = &body.image {
        validate_image(image)?;
    }
    validate_price(body.price)?;

    let previous = state
        .db
        .products()
        .get_by_uuid(&id)
        .await
        .db_err("Failed to get product")?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let product = state
        .db
        .products()
        .update(&id, &body)
        .await
        .store_err("Failed to update product", DUPLICATE_TITLE)?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    if previous.image.file_name != product.image.file_name {
        state.release_image(&previous.image.file_name).await;
    }

    info!(admin = %auth.principal().id, product = %product.id, "Product updated");
    Ok(Json(product))
}

async fn delete_product(
    State(state): State<ProductsState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    validate_uuid(&id)?;
    let product = state
        .db
        .products()
        .delete(&id)
        .await
        .db_err("Failed to delete product")?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    state.release_image(&product.image.file_name).await;

    info!(admin = %auth.principal().id, product = %product.id, "Product deleted");
    Ok(Json(product))
}
