mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{Csrf, Session, TestApp, body_json, product_body};

struct Shop {
    app: TestApp,
    admin: Session,
    csrf: Csrf,
    products: Vec<String>,
}

/// App with an admin and two priced products (10.0 and 2.5).
async fn shop() -> Shop {
    let app = TestApp::new().await;
    let admin = app.admin("root@example.com").await;
    let csrf = app.csrf().await;
    let mut products = Vec::new();
    for (title, price) in [("Mug", 10.0), ("Spoon", 2.5)] {
        let response = app
            .send(
                csrf.apply(Request::post("/product"))
                    .header(header::AUTHORIZATION, admin.bearer())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(product_body(title, price).to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        products.push(body_json(response).await["id"].as_str().unwrap().to_string());
    }
    Shop {
        app,
        admin,
        csrf,
        products,
    }
}

fn order_body(items: &[String], total: f64) -> serde_json::Value {
    serde_json::json!({
        "payment": "card",
        "email": "alice@example.com",
        "phone": "+7 (900) 123-45-67",
        "address": "1 Main Street",
        "total": total,
        "items": items,
        "comment": "ring twice"
    })
}

async fn place_order(shop: &Shop, user: &Session, body: serde_json::Value) -> axum::http::Response<Body> {
    shop.app
        .send(
            Request::post("/order")
                .header(header::AUTHORIZATION, user.bearer())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
}

async fn get(shop: &Shop, uri: &str, session: &Session) -> axum::http::Response<Body> {
    shop.app
        .send(
            Request::get(uri)
                .header(header::AUTHORIZATION, session.bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
}

#[tokio::test]
async fn test_create_order_snapshots_items() {
    let shop = shop().await;
    let user = shop.app.register("Alice", "alice@example.com").await;

    let response = place_order(&shop, &user, order_body(&shop.products, 12.5)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let order = body_json(response).await;
    assert_eq!(order["status"], "new");
    assert_eq!(order["total"], 12.5);
    assert_eq!(order["customerId"], user.user_id.as_str());
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    assert_eq!(order["items"][0]["title"], "Mug");
    assert!(order["orderNumber"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_create_order_rejects_bad_input() {
    let shop = shop().await;
    let user = shop.app.register("Alice", "alice@example.com").await;

    let response = place_order(&shop, &user, order_body(&shop.products, 99.0)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = place_order(&shop, &user, order_body(&[], 0.0)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = order_body(&shop.products, 12.5);
    body["phone"] = serde_json::json!("call me");
    let response = place_order(&shop, &user, body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = vec![uuid::Uuid::new_v4().to_string()];
    let response = place_order(&shop, &user, order_body(&missing, 0.0)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_order_requires_auth() {
    let shop = shop().await;

    let response = shop
        .app
        .send(
            Request::post("/order")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(order_body(&shop.products, 12.5).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_sees_only_own_orders() {
    let shop = shop().await;
    let alice = shop.app.register("Alice", "alice@example.com").await;
    let bob = shop.app.register("Bob", "bob@example.com").await;

    let order = body_json(place_order(&shop, &alice, order_body(&shop.products, 12.5)).await).await;
    let number = order["orderNumber"].as_i64().unwrap();

    let response = get(&shop, "/order/all/me", &alice).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["pagination"]["totalItems"], 1);

    let response = get(&shop, "/order/all/me", &bob).await;
    assert_eq!(body_json(response).await["pagination"]["totalItems"], 0);

    let response = get(&shop, &format!("/order/me/{}", number), &alice).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&shop, &format!("/order/me/{}", number), &bob).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&shop, &format!("/order/{}", number), &alice).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_lists_and_filters_orders() {
    let shop = shop().await;
    let alice = shop.app.register("Alice", "alice@example.com").await;
    place_order(&shop, &alice, order_body(&shop.products, 12.5)).await;
    place_order(&shop, &alice, order_body(&shop.products[..1], 10.0)).await;

    let response = get(&shop, "/order/all", &shop.admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["pagination"]["totalItems"], 2);

    let response = get(&shop, "/order/all?status=completed", &shop.admin).await;
    assert_eq!(body_json(response).await["pagination"]["totalItems"], 0);

    let response = get(&shop, "/order/all?status=lost", &shop.admin).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&shop, "/order/all", &alice).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_order_list_rejects_object_query() {
    let shop = shop().await;

    for uri in [
        "/order/all?status[$ne]=new",
        "/order/all?search%5Bx%5D=1",
        "/order/all?status=new&status=completed",
    ] {
        let response = get(&shop, uri, &shop.admin).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(
            body_json(response).await["error"],
            "Query parameters cannot be objects"
        );
    }
}

#[tokio::test]
async fn test_order_list_pagination_clamped() {
    let shop = shop().await;

    let response = get(&shop, "/order/all?page=-3&limit=500", &shop.admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    let pagination = body_json(response).await["pagination"].clone();
    assert_eq!(pagination["currentPage"], 1);
    assert_eq!(pagination["pageSize"], 10);
}

#[tokio::test]
async fn test_admin_updates_status_and_deletes_order() {
    let shop = shop().await;
    let alice = shop.app.register("Alice", "alice@example.com").await;
    let order = body_json(place_order(&shop, &alice, order_body(&shop.products, 12.5)).await).await;
    let number = order["orderNumber"].as_i64().unwrap();
    let id = order["id"].as_str().unwrap();

    let response = shop
        .app
        .send(
            shop.csrf
                .apply(Request::patch(format!("/order/{}", number)))
                .header(header::AUTHORIZATION, shop.admin.bearer())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"status":"delivering"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "delivering");

    let response = get(&shop, &format!("/order/{}", number), &shop.admin).await;
    assert_eq!(body_json(response).await["status"], "delivering");

    let response = shop
        .app
        .send(
            shop.csrf
                .apply(Request::delete(format!("/order/{}", id)))
                .header(header::AUTHORIZATION, shop.admin.bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&shop, &format!("/order/{}", number), &shop.admin).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_number_must_be_positive_integer() {
    let shop = shop().await;

    for uri in ["/order/0", "/order/abc"] {
        let response = get(&shop, uri, &shop.admin).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
