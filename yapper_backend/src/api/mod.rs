mod auth;
mod files;
mod moderation;
mod notifications;
mod posts;
mod reactions;
mod relationships;
mod sessions;

use crate::config::YapperConfig;
use crate::content::ContentService;
use crate::database::Database;
use crate::error::{CoreError, ForbiddenKind};
use crate::files::AttachmentService;
use crate::identity::{IdentityResolver, SessionSigner};
use crate::moderation::ModerationService;
use crate::notifications::NotificationService;
use crate::reactions::ReactionService;
use crate::relationships::RelationshipService;
use crate::sessions::{SessionNotifier, SessionRegistry};
use crate::users::UserService;
use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub(crate) use auth::AuthenticatedUser;

#[derive(Clone)]
pub struct AppState {
    pub config: YapperConfig,
    pub sessions: SessionRegistry,
    pub identity: IdentityResolver,
    pub users: UserService,
    pub content: ContentService,
    pub reactions: ReactionService,
    pub relationships: RelationshipService,
    pub moderation: ModerationService,
    pub notifications: NotificationService,
    pub attachments: AttachmentService,
}

impl AppState {
    pub fn new(config: YapperConfig, database: Database, sessions: SessionRegistry) -> Self {
        let signer = SessionSigner::new(&config.session);
        Self {
            identity: IdentityResolver::new(database.clone(), signer),
            users: UserService::new(database.clone()),
            content: ContentService::new(database.clone()),
            reactions: ReactionService::new(database.clone()),
            relationships: RelationshipService::new(database.clone()),
            moderation: ModerationService::new(
                database.clone(),
                SessionNotifier::new(sessions.clone()),
            ),
            notifications: NotificationService::new(database),
            attachments: AttachmentService::new(config.paths.clone(), config.file.clone()),
            config,
            sessions,
        }
    }
}

pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Core(CoreError),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
    code: &'static str,
}

impl ApiError {
    fn into_response_parts(self) -> (StatusCode, ErrorResponse) {
        let err = match self {
            ApiError::BadRequest(message) => {
                return (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        message,
                        code: "bad_request",
                    },
                )
            }
            ApiError::Core(err) => err,
        };
        let (status, code) = match &err {
            CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            CoreError::Forbidden { kind, .. } => (
                StatusCode::FORBIDDEN,
                match kind {
                    ForbiddenKind::InsufficientRole => "forbidden",
                    ForbiddenKind::SecretRequired => "secret_required",
                    ForbiddenKind::SecretMismatch => "secret_mismatch",
                },
            ),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            CoreError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            CoreError::Banned { .. } => (StatusCode::FORBIDDEN, "banned"),
            CoreError::Internal(inner) => {
                tracing::error!(error = ?inner, "internal server error");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        message: "internal server error".into(),
                        code: "internal",
                    },
                );
            }
        };
        (
            status,
            ErrorResponse {
                message: err.to_string(),
                code,
            },
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_response_parts();
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Core(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Core(CoreError::from(err))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
    live_sessions: usize,
}

pub(crate) async fn health_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        live_sessions: state.sessions.len(),
    })
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.file.max_upload_bytes as usize;
    Router::new()
        .route("/health", get(health_handler))
        .route("/session", get(auth::current_session))
        .route("/ws", get(sessions::ws_handler))
        .route("/posts", get(posts::get_feed).post(posts::create_post))
        .route("/posts/:id/delete", post(posts::delete_post))
        .route("/posts/:id/like", post(reactions::like_post))
        .route("/posts/:id/comments", post(posts::add_comment))
        .route(
            "/posts/:id/comments/:comment_id/delete",
            post(posts::delete_comment),
        )
        .route("/comments/:id/like", post(reactions::like_comment))
        .route("/users/:user", get(relationships::get_profile))
        .route("/users/:user/follow", post(relationships::toggle_follow))
        .route("/users/:user/block", post(relationships::toggle_block))
        .route("/reports", post(moderation::add_report))
        .route("/moderation/reports", get(moderation::list_reports))
        .route("/moderation/bans", post(moderation::ban_user))
        .route(
            "/verification-requests",
            post(moderation::request_verification),
        )
        .route(
            "/moderation/verification-requests/:id",
            post(moderation::review_verification),
        )
        .route("/identity/security-code", post(moderation::set_security_code))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/files", post(files::upload_file))
        .route("/files/:stored_ref", get(files::download_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}

/// Tries to bind to the given port, or finds the next available port
async fn find_available_port(start_port: u16) -> Result<(TcpListener, u16)> {
    const MAX_PORT_ATTEMPTS: u16 = 100;

    for offset in 0..MAX_PORT_ATTEMPTS {
        let Some(port) = start_port.checked_add(offset) else {
            break;
        };
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => {
                if offset == 0 {
                    tracing::debug!(port, error = %e, "Port in use, trying next port");
                }
                continue;
            }
        }
    }

    anyhow::bail!(
        "Could not find available port in range {}-{}",
        start_port,
        start_port.saturating_add(MAX_PORT_ATTEMPTS - 1)
    )
}

/// Waits for Ctrl-C, then tells every live session to close so graceful
/// shutdown is not held open by websocket connections.
async fn shutdown_signal(sessions: SessionRegistry) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    let closed = sessions.close_all();
    tracing::info!(closed, "shutdown requested; live sessions closed");
}

pub async fn serve_http(
    config: YapperConfig,
    database: Database,
    sessions: SessionRegistry,
) -> Result<()> {
    let (listener, actual_port) = find_available_port(config.api_port).await?;
    if actual_port != config.api_port {
        tracing::warn!(
            requested_port = config.api_port,
            actual_port,
            "Configured port was in use, bound to next available port"
        );
    }
    serve_with_listener(listener, config, database, sessions).await
}

pub async fn serve_with_listener(
    listener: TcpListener,
    config: YapperConfig,
    database: Database,
    sessions: SessionRegistry,
) -> Result<()> {
    tracing::info!(
        max_body_limit_mb = config.file.max_upload_bytes / (1024 * 1024),
        "Configured upload body limit"
    );
    let state = AppState::new(config, database, sessions.clone());
    let router = build_router(state);

    let addr = listener.local_addr()?;
    tracing::info!(?addr, "HTTP server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await?;
    Ok(())
}
