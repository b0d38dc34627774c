//! Customer administration. All routes are admin-only.
//!
//! - GET `/` - Paginated customers with order statistics
//! - GET `/{id}` - Single customer
//! - PATCH `/{id}` - Update name, email or role (CSRF)
//! - DELETE `/{id}` - Delete customer and their orders (CSRF)

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    routing::{get, patch},
};
use tracing::info;

use super::Guards;
use super::error::{
    ApiError, ResultExt, StoreResultExt, validate_email, validate_length, validate_uuid,
};
use super::query::{PageParams, QueryMap};
use crate::auth::{AdminOnly, Auth, require_auth};
use crate::csrf::csrf_protect;
use crate::db::Database;
use crate::types::{Customer, CustomerUpdate, PaginatedList};

#[derive(Clone)]
pub struct CustomersState {
    pub db: Database,
}

impl CustomersState {
    async fn customer(&self, id: &str) -> Result<Customer, ApiError> {
        self.db
            .users()
            .get_customer(id)
            .await
            .db_err("Failed to get customer")?
            .ok_or_else(|| ApiError::not_found("Customer not found"))
    }
}

pub fn router(state: CustomersState, guards: &Guards) -> Router {
    let mutating = Router::new()
        .route("/{id}", patch(update_customer).delete(delete_customer))
        .route_layer(middleware::from_fn_with_state(
            guards.csrf.clone(),
            csrf_protect,
        ));

    Router::new()
        .route("/", get(list_customers))
        .route("/{id}", get(get_customer))
        .merge(mutating)
        .route_layer(middleware::from_fn_with_state(
            guards.jwt.clone(),
            require_auth,
        ))
        .with_state(state)
}

async fn list_customers(
    State(state): State<CustomersState>,
    _auth: Auth<AdminOnly>,
    QueryMap(query): QueryMap,
) -> Result<Json<PaginatedList<Customer>>, ApiError> {
    let params = PageParams::from_query(&query);
    let (items, total) = state
        .db
        .users()
        .list_customers(params.limit, params.offset())
        .await
        .db_err("Failed to list customers")?;

    Ok(Json(PaginatedList {
        items,
        pagination: params.pagination(total),
    }))
}

async fn get_customer(
    State(state): State<CustomersState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<Json<Customer>, ApiError> {
    validate_uuid(&id)?;
    state.customer(&id).await.map(Json)
}

async fn update_customer(
    State(state): State<CustomersState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
    Json(mut body): Json<CustomerUpdate>,
) -> Result<Json<Customer>, ApiError> {
    validate_uuid(&id)?;
    if let Some(name) = body.name.as_mut() {
        *name = name.trim().to_string();
        validate_length("Name", name, 2, 30)?;
    }
    if let Some(email) = body.email.as_mut() {
        *email = email.trim().to_string();
        validate_email(email)?;
    }

    let updated = state
        .db
        .users()
        .update(&id, &body)
        .await
        .store_err("Failed to update customer", "User with this email already exists")?;
    if !updated {
        return Err(ApiError::not_found("Customer not found"));
    }

    info!(admin = %auth.principal().id, customer = %id, "Customer updated");
    state.customer(&id).await.map(Json)
}

async fn delete_customer(
    State(state): State<CustomersState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<Json<Customer>, ApiError> {
    validate_uuid(&id)?;
    let customer = state.customer(&id).await?;
    let deleted = state
        .db
        .users()
        .delete_by_uuid(&id)
        .await
        .db_err("Failed to delete customer")?;
    if !deleted {
        return Err(ApiError::not_found("Customer not found"));
    }

    info!(admin = %auth.principal().id, customer = %id, "Customer deleted");
    Ok(Json(customer))
}
