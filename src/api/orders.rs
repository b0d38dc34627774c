//! Order endpoints. Every route requires authentication.
//!
//! - POST `/` - Place an order for the current user
//! - GET `/all` - All orders, filterable by `status` and `search` (admin)
//! - GET `/all/me` - Current user's orders
//! - GET `/{orderNumber}` - Any order by number (admin)
//! - GET `/me/{orderNumber}` - Current user's order by number
//! - PATCH `/{orderNumber}` - Change order status (admin, CSRF)
//! - DELETE `/{id}` - Delete order by UUID (admin, CSRF)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
};
use tracing::info;

use super::Guards;
use super::error::{ApiError, ResultExt, validate_email, validate_uuid};
use super::query::{PageParams, QueryMap, ScalarQuery};
use crate::auth::{AdminOnly, Auth, require_auth};
use crate::csrf::csrf_protect;
use crate::db::{Database, NewOrderRecord, OrderFilter, User};
use crate::types::{NewOrder, Order, OrderItem, OrderStatus, OrderStatusUpdate, PaginatedList};

/// Allowed difference between the submitted total and the sum of item prices.
const TOTAL_TOLERANCE: f64 = 0.005;

#[derive(Clone)]
pub struct OrdersState {
    pub db: Database,
}

impl OrdersState {
    async fn user(&self, uuid: &str) -> Result<User, ApiError> {
        self.db
            .users()
            .get_by_uuid(uuid)
            .await
            .db_err("Failed to get user")?
            .ok_or_else(|| ApiError::unauthorized("User not found"))
    }
}

pub fn router(state: OrdersState, guards: &Guards) -> Router {
    let mutating = Router::new()
        .route("/{id}", patch(update_order_status).delete(delete_order))
        .route_layer(middleware::from_fn_with_state(
            guards.csrf.clone(),
            csrf_protect,
        ));

    Router::new()
        .route("/", post(create_order))
        .route("/all", get(list_orders))
        .route("/all/me", get(list_my_orders))
        .route("/{id}", get(get_order))
        .route("/me/{id}", get(get_my_order))
        .merge(mutating)
        .route_layer(middleware::from_fn_with_state(
            guards.jwt.clone(),
            require_auth,
        ))
        .with_state(state)
}

fn parse_order_number(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError::bad_request("Invalid order number"))
}

fn validate_phone(phone: &str) -> Result<(), ApiError> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '));
    if !allowed || !(5..=20).contains(&digits) {
        return Err(ApiError::bad_request("Invalid phone number"));
    }
    Ok(())
}

/// Resolve submitted product ids into priced item snapshots.
async fn resolve_items(db: &Database, ids: &[String]) -> Result<Vec<OrderItem>, ApiError> {
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        validate_uuid(id)?;
        let product = db
            .products()
            .get_by_uuid(id)
            .await
            .db_err("Failed to get product")?
            .ok_or_else(|| ApiError::bad_request(format!("Product {} not found", id)))?;
        let price = product.price.ok_or_else(|| {
            ApiError::bad_request(format!("Product {} is not for sale", product.title))
        })?;
        items.push(OrderItem {
            product_id: product.id,
            title: product.title,
            price,
        });
    }
    Ok(items)
}

async fn create_order(
    State(state): State<OrdersState>,
    auth: Auth,
    Json(body): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::bad_request("Order must contain at least one item"));
    }
    let email = body.email.trim();
    let phone = body.phone.trim();
    let address = body.address.trim();
    validate_email(email)?;
    validate_phone(phone)?;
    if address.is_empty() {
        return Err(ApiError::bad_request("Address is required"));
    }

    let items = resolve_items(&state.db, &body.items).await?;
    let expected: f64 = items.iter().map(|item| item.price).sum();
    if (expected - body.total).abs() > TOTAL_TOLERANCE {
        return Err(ApiError::bad_request("Order total does not match item prices"));
    }

    let user = state.user(&auth.principal().id).await?;
    let order = state
        .db
        .orders()
        .create(&NewOrderRecord {
            user_id: user.id,
            payment: body.payment,
            email: email.to_string(),
            phone: phone.to_string(),
            address: address.to_string(),
            total: expected,
            comment: body.comment.trim().to_string(),
            items,
        })
        .await
        .db_err("Failed to create order")?;

    info!(
        user = %user.uuid,
        order_number = order.order_number,
        total = order.total,
        "Order created"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<OrdersState>,
    _auth: Auth<AdminOnly>,
    ScalarQuery(query): ScalarQuery,
) -> Result<Json<PaginatedList<Order>>, ApiError> {
    let params = PageParams::from_query(&query);
    let status = match query.get("status").map(String::as_str) {
        None | Some("") => None,
        Some(raw) => Some(
            OrderStatus::parse(raw).ok_or_else(|| ApiError::bad_request("Invalid order status"))?,
        ),
    };
    let filter = OrderFilter {
        status,
        search: query.get("search").map(|s| s.trim().to_string()),
    };

    let (items, total) = state
        .db
        .orders()
        .list(&filter, params.limit, params.offset())
        .await
        .db_err("Failed to list orders")?;

    Ok(Json(PaginatedList {
        items,
        pagination: params.pagination(total),
    }))
}

async fn list_my_orders(
    State(state): State<OrdersState>,
    auth: Auth,
    QueryMap(query): QueryMap,
) -> Result<Json<PaginatedList<Order>>, ApiError> {
    let params = PageParams::from_query(&query);
    let user = state.user(&auth.principal().id).await?;
    let (items, total) = state
        .db
        .orders()
        .list_by_user(user.id, params.limit, params.offset())
        .await
        .db_err("Failed to list orders")?;

    Ok(Json(PaginatedList {
        items,
        pagination: params.pagination(total),
    }))
}

async fn get_order(
    State(state): State<OrdersState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let number = parse_order_number(&id)?;
    state
        .db
        .orders()
        .get_by_number(number)
        .await
        .db_err("Failed to get order")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

async fn get_my_order(
    State(state): State<OrdersState>,
    auth: Auth,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let number = parse_order_number(&id)?;
    let user = state.user(&auth.principal().id).await?;
    state
        .db
        .orders()
        .get_by_number_for_user(number, user.id)
        .await
        .db_err("Failed to get order")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

async fn update_order_status(
    State(state): State<OrdersState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
    Json(body): Json<OrderStatusUpdate>,
) -> Result<Json<Order>, ApiError> {
    let number = parse_order_number(&id)?;
    let order = state
        .db
        .orders()
        .update_status(number, body.status)
        .await
        .db_err("Failed to update order")?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    info!(
        admin = %auth.principal().id,
        order_number = number,
        status = body.status.as_str(),
        "Order status changed"
    );
    Ok(Json(order))
}

async fn delete_order(
    State(state): State<OrdersState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    validate_uuid(&id)?;
    let order = state
        .db
        .orders()
        .delete(&id)
        .await
        .db_err("Failed to delete order")?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    info!(admin = %auth.principal().id, order = %order.id, "Order deleted");
    Ok(Json(order))
}
