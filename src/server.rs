//!
//! gatehouse HTTP server
//! ---------------------
//! This module defines the Axum-based HTTP API for gatehouse.
//!
//! Responsibilities:
//! - Client-context tracking with a cookie (an opaque random id, issued on
//!   first contact); all session/forwarding state is keyed by that context.
//! - Sign-in/sign-out endpoints backed by the `security` module.
//! - User and micropost actions, each gated by the authorization guard
//!   before any work happens; denials answer 303 with a `Location` header.
//! - Friendly forwarding: a denied anonymous request records its location,
//!   and the next successful sign-in redirects there instead of the default.
//! - Flash notices ("Please sign in.") are single-use per context; the
//!   invalid-credentials notice lives only in the failed response body.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::{
    bind_fields, current_user, gen_context_id, require_admin_for_cross_user_destroy,
    require_owner, require_self_or_admin, require_signed_in, ContextId, Decision, FlashStore,
    ForwardingStore, Locations, MicropostId, PublicUser, SessionManager, User, UserId,
};
use crate::security;
use crate::store::SharedStore;

const CONTEXT_COOKIE: &str = "gatehouse_ctx";

/// Shared server state injected into all handlers.
///
/// Holds the identity store, the session manager, the forwarding store and
/// the flash store, plus the well-known redirect locations. Everything is
/// explicit instance state so tests can run many independent services.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sessions: Arc<SessionManager>,
    pub forwarding: Arc<ForwardingStore>,
    pub flash: Arc<FlashStore>,
    pub locations: Locations,
}

impl AppState {
    pub fn new() -> Self {
        let locations = Locations::default();
        AppState {
            store: SharedStore::new(),
            sessions: Arc::new(SessionManager::new()),
            forwarding: Arc::new(ForwardingStore::new(locations.root.clone())),
            flash: Arc::new(FlashStore::new()),
            locations,
        }
    }
}

impl Default for AppState {
    fn default() -> Self { Self::new() }
}

/// Mount all routes onto a router with the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/signin", get(sign_in_page).post(sign_in))
        .route("/signout", delete(sign_out))
        .route("/users", get(users_index).post(user_create))
        .route("/users/{id}", get(user_show).put(user_update).delete(user_destroy))
        .route("/users/{id}/edit", get(user_edit))
        .route("/microposts", post(micropost_create))
        .route("/microposts/{id}", delete(micropost_destroy))
        .with_state(state)
}

/// Start the gatehouse HTTP server bound to the given port.
pub async fn run_with_port(http_port: u16) -> anyhow::Result<()> {
    let state = AppState::new();
    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ---- cookies and responses -------------------------------------------------

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name { return Some(v[1..].to_string()); }
        }
    }
    None
}

fn set_context_cookie(ctx: &str) -> HeaderValue {
    // HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!("{}={}; HttpOnly; SameSite=Strict; Path=/", CONTEXT_COOKIE, ctx))
        .unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Resolve the client context from the cookie, minting a fresh one when the
/// client has none yet. The bool says whether a Set-Cookie is needed.
fn client_context(headers: &HeaderMap) -> (ContextId, bool) {
    match parse_cookie(headers, CONTEXT_COOKIE) {
        Some(ctx) if !ctx.is_empty() => (ctx, false),
        _ => (gen_context_id(), true),
    }
}

fn respond(status: StatusCode, fresh_ctx: Option<&str>, location: Option<&str>, body: Value) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(ctx) = fresh_ctx {
        headers.insert("Set-Cookie", set_context_cookie(ctx));
    }
    if let Some(loc) = location {
        let hv = HeaderValue::from_str(loc).unwrap_or_else(|_| HeaderValue::from_static("/"));
        headers.insert("Location", hv);
    }
    (status, headers, Json(body)).into_response()
}

fn see_other(fresh_ctx: Option<&str>, location: &str) -> Response {
    respond(
        StatusCode::SEE_OTHER,
        fresh_ctx,
        Some(location),
        json!({"status": "redirect", "location": location}),
    )
}

/// Map a guard denial to its redirect response, stashing the notice (if any)
/// in the context's flash slot for the next render.
fn denied(state: &AppState, ctx: &str, fresh: bool, redirect: String, notice: Option<String>) -> Response {
    if let Some(n) = &notice {
        state.flash.set(ctx, n);
    }
    see_other(fresh.then_some(ctx), &redirect)
}

/// Gate for actions tagged "requires sign-in". On denial the redirect
/// response is already built, forwarding recorded and notice flashed.
fn authenticate(state: &AppState, ctx: &str, fresh: bool, requested: &str) -> Result<User, Response> {
    let user = current_user(&state.sessions, &state.store, ctx);
    match require_signed_in(user.as_ref(), &state.forwarding, &state.locations, ctx, requested) {
        Decision::Allow => user.ok_or_else(|| {
            AppError::internal("guard", "allow decision without a current user").into_response()
        }),
        Decision::Deny { redirect, notice } => Err(denied(state, ctx, fresh, redirect, notice)),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Security { .. } | AppError::Internal { .. } => {
                error!(target: "server", "hard failure: {}", self);
            }
            _ => {}
        }
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({"status": "error", "code": self.code_str(), "error": self.message()});
        (status, Json(body)).into_response()
    }
}

// ---- pages -----------------------------------------------------------------

async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (ctx, fresh) = client_context(&headers);
    let user = current_user(&state.sessions, &state.store, &ctx);
    let notice = state.flash.take(&ctx);
    respond(
        StatusCode::OK,
        fresh.then_some(ctx.as_str()),
        None,
        json!({
            "status": "ok",
            "page": "home",
            "signed_in": user.is_some(),
            "current_user": user.as_ref().map(PublicUser::from),
            "notice": notice,
        }),
    )
}

async fn sign_in_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (ctx, fresh) = client_context(&headers);
    let user = current_user(&state.sessions, &state.store, &ctx);
    let notice = state.flash.take(&ctx);
    respond(
        StatusCode::OK,
        fresh.then_some(ctx.as_str()),
        None,
        json!({
            "status": "ok",
            "page": "signin",
            "title": "Sign in",
            "signed_in": user.is_some(),
            "notice": notice,
        }),
    )
}

// ---- sessions --------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SignInPayload {
    email: String,
    password: String,
}

async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignInPayload>,
) -> Response {
    let (ctx, fresh) = client_context(&headers);
    match security::verify(&state.store, &payload.email, &payload.password) {
        Ok(user) => {
            state.sessions.sign_in(&ctx, user.id);
            // one-shot friendly forwarding; default when nothing was stored
            let target = state.forwarding.consume(&ctx);
            info!(target: "server", "auth.signin user={} redirect={}", user.id, target);
            see_other(fresh.then_some(ctx.as_str()), &target)
        }
        Err(e) => {
            // Request-scoped notice: present in this response only, never
            // persisted to the context's flash.
            respond(
                StatusCode::UNAUTHORIZED,
                fresh.then_some(ctx.as_str()),
                None,
                json!({"status": "unauthorized", "page": "signin", "title": "Sign in", "error": e.message()}),
            )
        }
    }
}

async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (ctx, fresh) = client_context(&headers);
    state.sessions.sign_out(&ctx);
    see_other(fresh.then_some(ctx.as_str()), &state.locations.root)
}

// ---- users -----------------------------------------------------------------

async fn users_index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (ctx, fresh) = client_context(&headers);
    if let Err(deny) = authenticate(&state, &ctx, fresh, "/users") {
        return deny;
    }
    let users: Vec<PublicUser> = state.store.all_users().iter().map(PublicUser::from).collect();
    respond(
        StatusCode::OK,
        fresh.then_some(ctx.as_str()),
        None,
        json!({"status": "ok", "page": "users", "users": users}),
    )
}

async fn user_show(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let (ctx, fresh) = client_context(&headers);
    match state.store.find(UserId(id)) {
        Some(user) => {
            let posts = state.store.posts_of(user.id);
            let notice = state.flash.take(&ctx);
            respond(
                StatusCode::OK,
                fresh.then_some(ctx.as_str()),
                None,
                json!({
                    "status": "ok",
                    "page": "user",
                    "user": PublicUser::from(&user),
                    "microposts": posts,
                    "notice": notice,
                }),
            )
        }
        None => AppError::not_found("user_not_found", "no such user").into_response(),
    }
}

async fn user_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    let (ctx, fresh) = client_context(&headers);
    // Already-authenticated clients do not re-register
    if current_user(&state.sessions, &state.store, &ctx).is_some() {
        return see_other(fresh.then_some(ctx.as_str()), &state.locations.root);
    }
    let Some(map) = payload.as_object() else {
        return AppError::user("bad_payload", "expected a field object").into_response();
    };
    let fields = match bind_fields(map) {
        Ok(f) => f,
        Err(e) => return e.into_response(),
    };
    match state.store.register(fields) {
        Ok(user) => {
            state.sessions.sign_in(&ctx, user.id);
            let profile = format!("/users/{}", user.id);
            see_other(fresh.then_some(ctx.as_str()), &profile)
        }
        Err(e) => e.into_response(),
    }
}

async fn user_edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let (ctx, fresh) = client_context(&headers);
    let target = UserId(id);
    let requested = format!("/users/{}/edit", target);
    let current = match authenticate(&state, &ctx, fresh, &requested) {
        Ok(u) => u,
        Err(deny) => return deny,
    };
    let Some(record) = state.store.find(target) else {
        return AppError::not_found("user_not_found", "no such user").into_response();
    };
    match require_self_or_admin(&current, target, &state.locations) {
        Decision::Deny { redirect, notice } => denied(&state, &ctx, fresh, redirect, notice),
        Decision::Allow => respond(
            StatusCode::OK,
            fresh.then_some(ctx.as_str()),
            None,
            json!({
                "status": "ok",
                "page": "edit_user",
                "title": "Edit user",
                "user": PublicUser::from(&record),
            }),
        ),
    }
}

async fn user_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> Response {
    let (ctx, fresh) = client_context(&headers);
    let target = UserId(id);
    let requested = format!("/users/{}", target);
    let current = match authenticate(&state, &ctx, fresh, &requested) {
        Ok(u) => u,
        Err(deny) => return deny,
    };
    if state.store.find(target).is_none() {
        return AppError::not_found("user_not_found", "no such user").into_response();
    }
    match require_self_or_admin(&current, target, &state.locations) {
        Decision::Deny { redirect, notice } => return denied(&state, &ctx, fresh, redirect, notice),
        Decision::Allow => {}
    }
    let Some(map) = payload.as_object() else {
        return AppError::user("bad_payload", "expected a field object").into_response();
    };
    let fields = match bind_fields(map) {
        Ok(f) => f,
        Err(e) => return e.into_response(),
    };
    match state.store.update(target, fields) {
        Ok(updated) => respond(
            StatusCode::OK,
            fresh.then_some(ctx.as_str()),
            None,
            json!({"status": "ok", "user": PublicUser::from(&updated)}),
        ),
        Err(e) => e.into_response(),
    }
}

async fn user_destroy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let (ctx, fresh) = client_context(&headers);
    let target = UserId(id);
    let requested = format!("/users/{}", target);
    let current = match authenticate(&state, &ctx, fresh, &requested) {
        Ok(u) => u,
        Err(deny) => return deny,
    };
    if state.store.find(target).is_none() {
        return AppError::not_found("user_not_found", "no such user").into_response();
    }
    match require_admin_for_cross_user_destroy(&current, target, &state.locations) {
        Decision::Deny { redirect, notice } => return denied(&state, &ctx, fresh, redirect, notice),
        Decision::Allow => {}
    }
    match state.store.delete_user(target) {
        Ok(()) => see_other(fresh.then_some(ctx.as_str()), &state.locations.root),
        Err(e) => e.into_response(),
    }
}

// ---- microposts ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MicropostPayload {
    content: String,
}

async fn micropost_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MicropostPayload>,
) -> Response {
    let (ctx, fresh) = client_context(&headers);
    let current = match authenticate(&state, &ctx, fresh, "/microposts") {
        Ok(u) => u,
        Err(deny) => return deny,
    };
    match state.store.create_post(current.id, &payload.content) {
        Ok(post) => respond(
            StatusCode::OK,
            fresh.then_some(ctx.as_str()),
            None,
            json!({"status": "ok", "micropost": post}),
        ),
        Err(e) => e.into_response(),
    }
}

async fn micropost_destroy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let (ctx, fresh) = client_context(&headers);
    let target = MicropostId(id);
    let requested = format!("/microposts/{}", target);
    let current = match authenticate(&state, &ctx, fresh, &requested) {
        Ok(u) => u,
        Err(deny) => return deny,
    };
    let Some(post) = state.store.find_post(target) else {
        return AppError::not_found("micropost_not_found", "no such micropost").into_response();
    };
    match require_owner(&current, post.user_id, &state.locations) {
        Decision::Deny { redirect, notice } => return denied(&state, &ctx, fresh, redirect, notice),
        Decision::Allow => {}
    }
    match state.store.delete_post(target) {
        Ok(()) => see_other(fresh.then_some(ctx.as_str()), &state.locations.root),
        Err(e) => e.into_response(),
    }
}
