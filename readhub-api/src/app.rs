/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use readhub_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = readhub_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer, routes};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use readhub_shared::{
    auth::middleware::{optional_auth, require_auth},
    cache::Cache,
    search::{Embedder, HashingEmbedder},
    storage::FileStorage,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,

    /// `None` when Redis is not configured
    pub cache: Option<Cache>,

    pub config: Arc<Config>,

    pub storage: FileStorage,

    /// Must match the embedder the worker indexes books with
    pub embedder: Arc<dyn Embedder>,
}

impl AppState {
    /// State without a cache; see [`AppState::with_cache`]
    pub fn new(db: PgPool, config: Config) -> Self {
        let storage = FileStorage::new(
            &config.uploads.dir,
            &config.uploads.base_url,
            config.uploads.max_bytes,
        );

        Self {
            db,
            cache: None,
            config: Arc::new(config),
            storage,
            embedder: Arc::new(HashingEmbedder::default()),
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete router
///
/// ```text
/// /health
/// /uploads/*                 static files
/// /v1/auth/*                 register, login, refresh (rate limited), me
/// /v1/users/*                profiles, follows, avatars
/// /v1/genres, /v1/books/*, /v1/chapters/*
/// /v1/comments/*, /v1/likes/*, /v1/posts/*, /v1/feed
/// /v1/reading/*, /v1/onboarding/*, /v1/achievements/*
/// /v1/tts/*, /v1/admin/*
/// ```
///
/// Routes whose every method needs a user sit behind `require_auth`. The
/// rest run under `optional_auth`, and handlers that need a user there ask
/// for an `AuthContext` extractor.
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::auth_rate_limit,
        ));

    let public_routes = Router::new()
        .nest("/auth", auth_routes)
        .route("/users/:user", get(routes::users::get_profile))
        .route("/users/:user/followers", get(routes::users::followers))
        .route("/users/:user/following", get(routes::users::following))
        .route("/users/:user/posts", get(routes::posts::list_by_user))
        .route(
            "/genres",
            get(routes::genres::list_genres).post(routes::genres::create_genre),
        )
        .route(
            "/books",
            get(routes::books::list_books).post(routes::books::create_book),
        )
        .route("/books/search/semantic", get(routes::books::semantic_search))
        .route(
            "/books/:book",
            get(routes::books::get_book)
                .patch(routes::books::update_book)
                .delete(routes::books::delete_book),
        )
        .route(
            "/books/:book/chapters",
            get(routes::chapters::list_chapters).post(routes::chapters::create_chapter),
        )
        .route(
            "/books/:book/chapters/:number",
            get(routes::chapters::read_chapter),
        )
        .route(
            "/comments",
            get(routes::comments::list_comments).post(routes::comments::create_comment),
        )
        .route("/comments/:id/replies", get(routes::comments::list_replies))
        .route(
            "/likes/:kind/:id",
            get(routes::likes::like_status).post(routes::likes::toggle_like),
        )
        .route("/achievements", get(routes::achievements::catalogue))
        .route("/tts/:id", get(routes::tts::get_tts))
        .route_layer(middleware::from_fn({
            let secret = state.config.jwt.secret.clone();
            move |req, next| optional_auth(secret.clone(), req, next)
        }));

    let upload_limit = state.config.uploads.max_bytes.saturating_add(64 * 1024);

    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/users/me", patch(routes::users::update_me))
        .route(
            "/users/me/avatar",
            post(routes::users::upload_avatar).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/users/:user/follow", post(routes::users::toggle_follow))
        .route("/genres/:slug", delete(routes::genres::delete_genre))
        .route(
            "/books/:book/cover",
            post(routes::books::upload_cover).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/books/:book/chapters/import",
            post(routes::chapters::import_chapter),
        )
        .route(
            "/chapters/:id",
            patch(routes::chapters::update_chapter).delete(routes::chapters::delete_chapter),
        )
        .route("/chapters/:id/tts", post(routes::tts::request_tts))
        .route(
            "/comments/:id",
            patch(routes::comments::update_comment).delete(routes::comments::delete_comment),
        )
        .route("/posts", post(routes::posts::create_post))
        .route("/posts/:id", delete(routes::posts::delete_post))
        .route("/feed", get(routes::posts::feed))
        .route("/reading/progress", put(routes::reading::update_progress))
        .route("/reading/progress/:book_id", get(routes::reading::get_progress))
        .route("/reading/continue", get(routes::reading::continue_reading))
        .route("/reading/list", get(routes::reading::list))
        .route(
            "/reading/list/:book_id",
            put(routes::reading::set_status).delete(routes::reading::remove),
        )
        .route("/onboarding", get(routes::onboarding::get_state))
        .route("/onboarding/advance", post(routes::onboarding::advance))
        .route("/onboarding/back", post(routes::onboarding::back))
        .route("/onboarding/skip", post(routes::onboarding::skip))
        .route("/achievements/me", get(routes::achievements::mine))
        .route("/admin/analytics", get(routes::admin::analytics))
        .route("/admin/users", get(routes::admin::list_users))
        .route("/admin/users/:id/role", patch(routes::admin::set_role))
        .route("/admin/jobs", get(routes::admin::list_jobs))
        .route_layer(middleware::from_fn({
            let secret = state.config.jwt.secret.clone();
            move |req, next| require_auth(secret.clone(), req, next)
        }));

    let v1_routes = Router::new().merge(public_routes).merge(protected_routes);

    let cors = build_cors(&state.config.api.cors_origins);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .nest_service("/uploads", ServeDir::new(state.storage.root()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Permissive CORS for `*`, otherwise the listed origins with credentials
fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
