//! Router assembly: the route multiplexer in front of the identity-provider
//! and resource-server surfaces.

use axum::{
    Router,
    extract::Request,
    response::Response,
    routing::{get, post},
};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{
    context::AppState,
    handler_health::health_check_handler,
    handler_register::{get_client_handler, register_client_handler},
    handler_well_known::oauth_protected_resource_handler,
};
use crate::routing::{RouteTable, Surface};

/// Tower service dispatching each request to a surface via the route table.
///
/// The table is immutable after construction; dispatch is a pure lookup and
/// the service is freely cloneable across connections.
#[derive(Clone)]
pub struct RouteMultiplexer {
    table: Arc<RouteTable>,
    identity: Router,
    resource: Router,
}

impl RouteMultiplexer {
    pub fn new(table: RouteTable, identity: Router, resource: Router) -> Self {
        Self {
            table: Arc::new(table),
            identity,
            resource,
        }
    }
}

impl Service<Request> for RouteMultiplexer {
    type Response = Response;
    type Error = Infallible;
    type Future =
        std::pin::Pin<Box<dyn Future<Output = std::result::Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let surface = self
            .table
            .resolve(request.uri().path())
            .unwrap_or(Surface::ResourceServer);
        tracing::debug!(path = %request.uri().path(), ?surface, "dispatching request");

        let mut router = match surface {
            Surface::IdentityProvider => self.identity.clone(),
            Surface::ResourceServer => self.resource.clone(),
        };
        Box::pin(async move { router.call(request).await })
    }
}

/// Routes served by the identity-provider surface.
fn identity_provider_router(ctx: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register_client_handler))
        .route("/auth/clients/{client_id}", get(get_client_handler))
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth_protected_resource_handler),
        )
        .with_state(ctx)
}

/// Minimal resource-server surface used when no external router is mounted:
/// just the health endpoint. The protected MCP routes belong to the resource
/// server itself and are mounted by the embedding application.
pub fn default_resource_router() -> Router {
    Router::new().route("/health", get(health_check_handler))
}

/// Build the application router.
///
/// `resource_router` is the resource-server surface; its handlers are
/// supplied by the embedding application and receive every request the
/// route table does not send to the identity provider.
pub fn build_router(ctx: AppState, resource_router: Router) -> Router {
    let multiplexer = RouteMultiplexer::new(
        RouteTable::standard(),
        identity_provider_router(ctx),
        resource_router,
    );

    // Editor and browser-based clients register from foreign origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ]);

    Router::new()
        .fallback_service(multiplexer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
