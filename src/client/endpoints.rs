//! Typed calls for each server route.

use super::error::ClientError;
use super::facade::ApiClient;
use super::transport::{ApiRequest, FilePart, Transport};
use crate::types::{
    Account, AuthResponse, CurrentUserResponse, Customer, CustomerUpdate, LoginRequest, NewOrder,
    NewProduct, Order, OrderStatus, OrderStatusUpdate, PaginatedList, Product, ProductUpdate,
    RegisterRequest, SuccessResponse, UploadedFile, UserRole,
};

/// Page selection for list calls. Unset fields use the server defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListParams {
    fn to_query(self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(page) = self.page {
            query.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        query
    }
}

/// Filters for the admin order list.
#[derive(Debug, Clone, Default)]
pub struct OrderListParams {
    pub page: ListParams,
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
}

impl OrderListParams {
    fn to_query(&self) -> Vec<(String, String)> {
        let mut query = self.page.to_query();
        if let Some(status) = self.status {
            query.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(search) = &self.search {
            query.push(("search".to_string(), search.clone()));
        }
        query
    }
}

impl<T: Transport> ApiClient<T> {
    fn with_cdn_image(&self, mut product: Product) -> Product {
        product.image.file_name = self.with_cdn(&product.image.file_name);
        product
    }

    pub async fn list_products(
        &self,
        params: ListParams,
    ) -> Result<PaginatedList<Product>, ClientError> {
        let mut list: PaginatedList<Product> = self
            .request(ApiRequest::get("/product").query(params.to_query()))
            .await?;
        list.items = list
            .items
            .into_iter()
            .map(|p| self.with_cdn_image(p))
            .collect();
        Ok(list)
    }

    pub async fn get_product(&self, id: &str) -> Result<Product, ClientError> {
        let product = self
            .request(ApiRequest::get(format!("/product/{}", id)))
            .await?;
        Ok(self.with_cdn_image(product))
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, ClientError> {
        let product = self
            .request_with_refresh(ApiRequest::post("/product").json(product)?)
            .await?;
        Ok(self.with_cdn_image(product))
    }

    pub async fn update_product(
        &self,
        id: &str,
        update: &ProductUpdate,
    ) -> Result<Product, ClientError> {
        let product = self
            .request_with_refresh(ApiRequest::patch(format!("/product/{}", id)).json(update)?)
            .await?;
        Ok(self.with_cdn_image(product))
    }

    pub async fn delete_product(&self, id: &str) -> Result<Product, ClientError> {
        self.request_with_refresh(ApiRequest::delete(format!("/product/{}", id)))
            .await
    }

    pub async fn upload_file(&self, file: FilePart) -> Result<UploadedFile, ClientError> {
        self.request_with_refresh(ApiRequest::post("/upload").file(file))
            .await
    }

    pub async fn create_order(&self, order: &NewOrder) -> Result<Order, ClientError> {
        self.request_with_refresh(ApiRequest::post("/order").json(order)?)
            .await
    }

    pub async fn update_order_status(
        &self,
        order_number: i64,
        status: OrderStatus,
    ) -> Result<Order, ClientError> {
        let request = ApiRequest::patch(format!("/order/{}", order_number))
            .json(&OrderStatusUpdate { status })?;
        self.request_with_refresh(request).await
    }

    pub async fn list_orders(
        &self,
        params: &OrderListParams,
    ) -> Result<PaginatedList<Order>, ClientError> {
        self.request_with_refresh(ApiRequest::get("/order/all").query(params.to_query()))
            .await
    }

    pub async fn list_my_orders(
        &self,
        params: ListParams,
    ) -> Result<PaginatedList<Order>, ClientError> {
        self.request_with_refresh(ApiRequest::get("/order/all/me").query(params.to_query()))
            .await
    }

    pub async fn get_order(&self, order_number: i64) -> Result<Order, ClientError> {
        self.request_with_refresh(ApiRequest::get(format!("/order/{}", order_number)))
            .await
    }

    pub async fn get_my_order(&self, order_number: i64) -> Result<Order, ClientError> {
        self.request_with_refresh(ApiRequest::get(format!("/order/me/{}", order_number)))
            .await
    }

    pub async fn delete_order(&self, id: &str) -> Result<Order, ClientError> {
        self.request_with_refresh(ApiRequest::delete(format!("/order/{}", id)))
            .await
    }

    /// Log in and keep the returned access token for later calls.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self
            .request(ApiRequest::post("/auth/login").json(&body)?)
            .await?;
        self.session()
            .set_access_token(Some(response.access_token.clone()));
        Ok(response)
    }

    /// Register and keep the returned access token for later calls.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let body = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self
            .request(ApiRequest::post("/auth/register").json(&body)?)
            .await?;
        self.session()
            .set_access_token(Some(response.access_token.clone()));
        Ok(response)
    }

    pub async fn logout(&self) -> Result<SuccessResponse, ClientError> {
        let response = self.request(ApiRequest::get("/auth/logout")).await;
        self.session().set_access_token(None);
        response
    }

    pub async fn current_user(&self) -> Result<Account, ClientError> {
        let response: CurrentUserResponse = self
            .request_with_refresh(ApiRequest::get("/auth/user"))
            .await?;
        Ok(response.user)
    }

    pub async fn current_user_roles(&self) -> Result<Vec<UserRole>, ClientError> {
        self.request_with_refresh(ApiRequest::get("/auth/user/roles"))
            .await
    }

    pub async fn list_customers(
        &self,
        params: ListParams,
    ) -> Result<PaginatedList<Customer>, ClientError> {
        self.request_with_refresh(ApiRequest::get("/customers").query(params.to_query()))
            .await
    }

    pub async fn get_customer(&self, id: &str) -> Result<Customer, ClientError> {
        self.request_with_refresh(ApiRequest::get(format!("/customers/{}", id)))
            .await
    }

    pub async fn update_customer(
        &self,
        id: &str,
        update: &CustomerUpdate,
    ) -> Result<Customer, ClientError> {
        self.request_with_refresh(ApiRequest::patch(format!("/customers/{}", id)).json(update)?)
            .await
    }

    pub async fn delete_customer(&self, id: &str) -> Result<Customer, ClientError> {
        self.request_with_refresh(ApiRequest::delete(format!("/customers/{}", id)))
            .await
    }
}
