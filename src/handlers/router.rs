//! Router Configuration - Centralized route definitions
//!
//! Routes are split into public infrastructure routes (probes, metrics) and
//! the API routes. Every API route answers both GET and POST and reads its
//! inputs from the query string.

use anyhow::Context;
use axum::{
    handler::Handler,
    routing::{get, MethodRouter},
    Router,
};
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing::{info, warn};

use super::state::ServiceState;
use super::{account, forum, groups, health, profile};
use crate::config::ServerConfig;

/// Application state type alias
pub type AppState = Arc<ServiceState>;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "graphjs_session";

/// Same handler on GET and POST
fn get_or_post<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler.clone()).post(handler)
}

/// Build the public routes (no session, no rate limit)
///
/// These routes must always be accessible for:
/// - Health checks (Kubernetes probes)
/// - Metrics (Prometheus scraping)
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // HEALTH & KUBERNETES PROBES
        // =================================================================
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        // =================================================================
        // METRICS (PROMETHEUS)
        // =================================================================
        .route("/metrics", get(health::metrics_endpoint))
        .with_state(state)
}

/// Build the API routes
///
/// Mutating endpoints authenticate through the `Actor` extractor; the session
/// layer is attached by [`build_router`], rate limiting by the caller.
pub fn build_api_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // FORUM
        // =================================================================
        .route("/startThread", get_or_post(forum::start_thread))
        .route("/reply", get_or_post(forum::reply))
        .route("/editForumPost", get_or_post(forum::edit_forum_post))
        .route("/deleteForumPost", get_or_post(forum::delete_forum_post))
        .route("/getThreads", get_or_post(forum::get_threads))
        .route("/getThread", get_or_post(forum::get_thread))
        // =================================================================
        // GROUPS
        // =================================================================
        .route("/createGroup", get_or_post(groups::create_group))
        .route("/setGroup", get_or_post(groups::set_group))
        .route("/joinGroup", get_or_post(groups::join_group))
        .route("/leaveGroup", get_or_post(groups::leave_group))
        .route("/listMemberships", get_or_post(groups::list_memberships))
        .route("/listGroups", get_or_post(groups::list_groups))
        .route("/fetchGroup", get_or_post(groups::fetch_group))
        .route("/listMembers", get_or_post(groups::list_members))
        // =================================================================
        // PROFILE & SOCIAL
        // =================================================================
        .route("/getProfile", get_or_post(profile::get_profile))
        .route("/setProfile", get_or_post(profile::set_profile))
        .route("/follow", get_or_post(profile::follow))
        .route("/unfollow", get_or_post(profile::unfollow))
        // =================================================================
        // ACCOUNT
        // =================================================================
        .route("/signup", get_or_post(account::signup))
        .route("/login", get_or_post(account::login))
        .route("/logout", get_or_post(account::logout))
        .route("/whoami", get_or_post(account::whoami))
        // =================================================================
        // STATE
        // =================================================================
        .with_state(state)
}

/// Cookie-backed session layer with an in-process store
///
/// The cookie is `SameSite=Strict` unless credentialed CORS is configured for
/// explicit origins over secure cookies, in which case embedding sites need
/// it on cross-site calls and it becomes `SameSite=None; Secure`.
pub fn session_layer(config: &ServerConfig) -> SessionManagerLayer<MemoryStore> {
    let same_site = if config.cross_site_sessions() {
        SameSite::None
    } else {
        SameSite::Strict
    };
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_http_only(true)
        .with_secure(config.secure_cookies)
        .with_same_site(same_site)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            config.session_ttl_secs,
        )))
}

/// Build the complete router with sessions attached to the API routes
///
/// Note: This function does NOT apply rate limiting, CORS or tracing layers.
/// The caller (main.rs) applies those.
pub fn build_router(state: AppState) -> Router {
    build_router_with_api_layer(state, |api| api)
}

/// Like [`build_router`], wrapping the API routes before sessions are attached
pub fn build_router_with_api_layer<F>(state: AppState, wrap_api: F) -> Router
where
    F: FnOnce(Router) -> Router,
{
    let sessions = session_layer(&state.config);
    let public = build_public_routes(state.clone());
    let api = wrap_api(build_api_routes(state)).layer(sessions);

    Router::new().merge(public).merge(api)
}

/// Like [`build_router`], with per-IP rate limiting on the API routes
///
/// Peers are keyed by `ConnectInfo<SocketAddr>`, so the router must be served
/// with `into_make_service_with_connect_info`. A rate of 0 disables limiting.
pub fn build_rate_limited_router(state: AppState) -> anyhow::Result<Router> {
    let per_second = state.config.rate_limit_per_second;
    let burst = state.config.rate_limit_burst;
    if per_second == 0 {
        warn!("Rate limiting disabled");
        return Ok(build_router(state));
    }

    // One token replenished every 1000/rate ms
    let governor_conf = GovernorConfigBuilder::default()
        .per_millisecond((1000 / per_second).max(1))
        .burst_size(burst)
        .finish()
        .context("invalid rate limiter configuration")?;
    info!(
        "Rate limiting enabled: {} req/sec, burst of {}",
        per_second, burst
    );

    let governor = GovernorLayer {
        config: Arc::new(governor_conf),
    };
    Ok(build_router_with_api_layer(state, |api| api.layer(governor)))
}
