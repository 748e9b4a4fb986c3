//! Authorization guard over the HTTP surface: unauthenticated denials for
//! page views and direct mutating requests alike, wrong-user denials,
//! admin-only cross-user destroy, ownership checks on microposts, and
//! sessions referencing deleted users.

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use gatehouse::identity::{gen_context_id, MicropostId, User, UserFields};
use gatehouse::server::{router, AppState};

fn service() -> (Router, AppState) {
    let state = AppState::new();
    (router(state.clone()), state)
}

fn seed_user(state: &AppState, name: &str, email: &str, password: &str) -> User {
    state.store.register(UserFields::new(name, email, password)).expect("seed user")
}

fn seed_admin(state: &AppState, name: &str, email: &str, password: &str) -> User {
    let u = seed_user(state, name, email, password);
    state.store.set_admin(u.id, true).expect("elevate");
    state.store.find(u.id).expect("reload")
}

fn cookie(ctx: &str) -> String {
    format!("gatehouse_ctx={}", ctx)
}

fn get(path: &str, ctx: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::COOKIE, cookie(ctx))
        .body(Body::empty())
        .expect("request")
}

fn no_body(method: &str, path: &str, ctx: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::COOKIE, cookie(ctx))
        .body(Body::empty())
        .expect("request")
}

fn json_req(method: &str, path: &str, ctx: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::COOKIE, cookie(ctx))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn send(app: &Router, req: Request<Body>) -> Result<(StatusCode, HeaderMap, Value)> {
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await?.to_bytes();
    let body: Value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, headers, body))
}

fn location(headers: &HeaderMap) -> String {
    headers
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn sign_in(app: &Router, ctx: &str, email: &str, password: &str) -> Result<()> {
    let (status, _, _) =
        send(app, json_req("POST", "/signin", ctx, json!({"email": email, "password": password}))).await?;
    assert_eq!(status, StatusCode::SEE_OTHER, "seed sign-in must succeed");
    Ok(())
}

#[tokio::test]
async fn mutating_requests_while_signed_out_redirect_to_sign_in() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    let post = state.store.create_post(alice.id, "hello").expect("post");
    let ctx = gen_context_id();

    let attempts = vec![
        json_req("PUT", &format!("/users/{}", alice.id), &ctx, json!({"name": "Hacked"})),
        no_body("DELETE", &format!("/users/{}", alice.id), &ctx),
        json_req("POST", "/microposts", &ctx, json!({"content": "spam"})),
        no_body("DELETE", &format!("/microposts/{}", post.id), &ctx),
    ];
    for req in attempts {
        let (status, headers, _) = send(&app, req).await?;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/signin", "mutating request must be gated like a page view");
    }

    // nothing was mutated along the way
    assert_eq!(state.store.find(alice.id).map(|u| u.name), Some("Alice".to_string()));
    assert!(state.store.find_post(post.id).is_some());
    Ok(())
}

#[tokio::test]
async fn page_views_while_signed_out_redirect_to_sign_in() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    let ctx = gen_context_id();

    for path in [format!("/users/{}/edit", alice.id), "/users".to_string()] {
        let (status, headers, _) = send(&app, get(&path, &ctx)).await?;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/signin");
    }
    Ok(())
}

#[tokio::test]
async fn wrong_user_is_sent_to_root_not_sign_in() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    seed_user(&state, "Bob", "bob@example.com", "hunter2");
    let ctx = gen_context_id();
    sign_in(&app, &ctx, "bob@example.com", "hunter2").await?;

    let (status, headers, _) = send(&app, get(&format!("/users/{}/edit", alice.id), &ctx)).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/", "already authenticated, so root not sign-in");

    let (status, headers, _) = send(
        &app,
        json_req("PUT", &format!("/users/{}", alice.id), &ctx, json!({"name": "Renamed"})),
    )
    .await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
    assert_eq!(state.store.find(alice.id).map(|u| u.name), Some("Alice".to_string()), "no record mutated");
    Ok(())
}

#[tokio::test]
async fn own_update_succeeds_wrong_user_update_denied() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    let bob = seed_user(&state, "Bob", "bob@example.com", "hunter2");
    let ctx = gen_context_id();
    sign_in(&app, &ctx, "alice@example.com", "s3cr3t!").await?;

    let (status, _, body) = send(
        &app,
        json_req("PUT", &format!("/users/{}", alice.id), &ctx, json!({"name": "Alicia"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], json!("Alicia"));

    let (status, headers, _) = send(
        &app,
        json_req("PUT", &format!("/users/{}", bob.id), &ctx, json!({"name": "NotBob"})),
    )
    .await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
    assert_eq!(state.store.find(bob.id).map(|u| u.name), Some("Bob".to_string()));
    Ok(())
}

#[tokio::test]
async fn admin_may_edit_other_users() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    seed_admin(&state, "Root", "root@example.com", "adminpw");
    let ctx = gen_context_id();
    sign_in(&app, &ctx, "root@example.com", "adminpw").await?;

    let (status, _, body) = send(&app, get(&format!("/users/{}/edit", alice.id), &ctx)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], json!("edit_user"));
    Ok(())
}

#[tokio::test]
async fn cross_user_destroy_is_admin_only() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    seed_user(&state, "Bob", "bob@example.com", "hunter2");
    seed_admin(&state, "Root", "root@example.com", "adminpw");

    // non-admin deleting someone else: redirect to root, record intact
    let ctx_bob = gen_context_id();
    sign_in(&app, &ctx_bob, "bob@example.com", "hunter2").await?;
    let (status, headers, _) = send(&app, no_body("DELETE", &format!("/users/{}", alice.id), &ctx_bob)).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
    assert!(state.store.find(alice.id).is_some());

    // admin performing the same deletion succeeds
    let ctx_root = gen_context_id();
    sign_in(&app, &ctx_root, "root@example.com", "adminpw").await?;
    let (status, headers, _) = send(&app, no_body("DELETE", &format!("/users/{}", alice.id), &ctx_root)).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
    assert!(state.store.find(alice.id).is_none());
    Ok(())
}

#[tokio::test]
async fn self_destroy_is_allowed_and_invalidates_the_session() -> Result<()> {
    let (app, state) = service();
    let root = seed_admin(&state, "Root", "root@example.com", "adminpw");
    let ctx = gen_context_id();
    sign_in(&app, &ctx, "root@example.com", "adminpw").await?;

    // self-targeting destroy is not special-cased into a denial
    let (status, headers, _) = send(&app, no_body("DELETE", &format!("/users/{}", root.id), &ctx)).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
    assert!(state.store.find(root.id).is_none());

    // the dangling session now counts as signed out
    let (_, _, home) = send(&app, get("/", &ctx)).await?;
    assert_eq!(home["signed_in"], json!(false));
    Ok(())
}

#[tokio::test]
async fn non_admin_self_destroy_succeeds() -> Result<()> {
    let (app, state) = service();
    let bob = seed_user(&state, "Bob", "bob@example.com", "hunter2");
    let ctx = gen_context_id();
    sign_in(&app, &ctx, "bob@example.com", "hunter2").await?;

    let (status, headers, _) = send(&app, no_body("DELETE", &format!("/users/{}", bob.id), &ctx)).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
    assert!(state.store.find(bob.id).is_none());
    Ok(())
}

#[tokio::test]
async fn micropost_destroy_requires_ownership() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    seed_user(&state, "Bob", "bob@example.com", "hunter2");
    let post = state.store.create_post(alice.id, "mine").expect("post");

    let ctx_bob = gen_context_id();
    sign_in(&app, &ctx_bob, "bob@example.com", "hunter2").await?;
    let (status, headers, _) =
        send(&app, no_body("DELETE", &format!("/microposts/{}", post.id), &ctx_bob)).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
    assert!(state.store.find_post(post.id).is_some());

    let ctx_alice = gen_context_id();
    sign_in(&app, &ctx_alice, "alice@example.com", "s3cr3t!").await?;
    let (status, _, _) =
        send(&app, no_body("DELETE", &format!("/microposts/{}", post.id), &ctx_alice)).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(state.store.find_post(post.id).is_none());
    Ok(())
}

#[tokio::test]
async fn micropost_create_works_for_the_signed_in_user() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    let ctx = gen_context_id();
    sign_in(&app, &ctx, "alice@example.com", "s3cr3t!").await?;

    let (status, _, body) = send(&app, json_req("POST", "/microposts", &ctx, json!({"content": "first!"}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["micropost"]["user_id"], json!(alice.id));
    let id: MicropostId = serde_json::from_value(body["micropost"]["id"].clone())?;
    assert!(state.store.find_post(id).is_some());
    Ok(())
}

#[tokio::test]
async fn signed_in_users_are_bounced_from_registration() -> Result<()> {
    let (app, state) = service();
    seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    let ctx = gen_context_id();
    sign_in(&app, &ctx, "alice@example.com", "s3cr3t!").await?;

    let before = state.store.all_users().len();
    let (status, headers, _) = send(
        &app,
        json_req(
            "POST",
            "/users",
            &ctx,
            json!({"name": "Extra", "email": "extra@example.com", "password": "pw", "password_confirmation": "pw"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
    assert_eq!(state.store.all_users().len(), before, "no registration while authenticated");
    Ok(())
}

#[tokio::test]
async fn users_index_lists_users_once_signed_in() -> Result<()> {
    let (app, state) = service();
    seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    seed_user(&state, "Bob", "bob@example.com", "hunter2");
    let ctx = gen_context_id();
    sign_in(&app, &ctx, "alice@example.com", "s3cr3t!").await?;

    let (status, _, body) = send(&app, get("/users", &ctx)).await?;
    assert_eq!(status, StatusCode::OK);
    let users = body["users"].as_array().expect("users array");
    assert_eq!(users.len(), 2);
    Ok(())
}

#[tokio::test]
async fn profile_page_is_public_and_never_exposes_the_hash() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");
    let ctx = gen_context_id();

    let (status, _, body) = send(&app, get(&format!("/users/{}", alice.id), &ctx)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], json!("alice@example.com"));
    assert!(body["user"].get("password_hash").is_none());
    Ok(())
}

#[tokio::test]
async fn profile_page_tracks_the_client_context_like_any_other_page() -> Result<()> {
    let (app, state) = service();
    let alice = seed_user(&state, "Alice", "alice@example.com", "s3cr3t!");

    // first contact without a cookie gets a context issued
    let bare = Request::builder()
        .uri(format!("/users/{}", alice.id))
        .body(Body::empty())?;
    let (status, headers, _) = send(&app, bare).await?;
    assert_eq!(status, StatusCode::OK);
    let set = headers.get("set-cookie").and_then(|v| v.to_str().ok()).unwrap_or_default();
    assert!(set.starts_with("gatehouse_ctx="), "got Set-Cookie: {}", set);

    // a pending notice is consumed by the profile render, once
    let ctx = gen_context_id();
    send(&app, get(&format!("/users/{}/edit", alice.id), &ctx)).await?;
    let (_, _, body) = send(&app, get(&format!("/users/{}", alice.id), &ctx)).await?;
    assert_eq!(body["notice"], json!("Please sign in."));
    let (_, _, body) = send(&app, get(&format!("/users/{}", alice.id), &ctx)).await?;
    assert_eq!(body["notice"], Value::Null);
    Ok(())
}
