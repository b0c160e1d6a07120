//! Console HTTP adapter.
//!
//! Every rule kind is served under `/api/v1/governance/<kind>`:
//!
//! | Method | Path       | Operation                   |
//! |--------|------------|-----------------------------|
//! | POST   | `/`        | create (JSON array)         |
//! | PUT    | `/`        | update (JSON array)         |
//! | GET    | `/`        | query (query string)        |
//! | POST   | `/delete`  | delete (JSON array)         |
//! | PUT    | `/enable`  | enable/disable (JSON array) |
//! | GET    | `/export`  | ZIP download                |
//! | POST   | `/import`  | raw ZIP or JSON uploads     |

pub mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::model::{CircuitBreakerPolicy, RateLimitPolicy, RoutingPolicy, RuleKind, RulePolicy};
use crate::service::{GovernanceServices, RuleService};

use handlers::RuleRoutes;

const CONSOLE_PREFIX: &str = "/api/v1/governance";

/// Routes of one rule kind.
pub fn rule_router<P: RulePolicy>(
    service: Arc<dyn RuleService<P>>,
    request_timeout: Duration,
) -> Router {
    Router::new()
        .route(
            "/",
            post(handlers::create_rules::<P>)
                .put(handlers::update_rules::<P>)
                .get(handlers::query_rules::<P>),
        )
        .route("/delete", post(handlers::delete_rules::<P>))
        .route("/enable", put(handlers::enable_rules::<P>))
        .route("/export", get(handlers::export_rules::<P>))
        .route("/import", post(handlers::import_rules::<P>))
        .with_state(RuleRoutes {
            service,
            request_timeout,
        })
}

fn kind_path(kind: RuleKind) -> String {
    format!("{}/{}", CONSOLE_PREFIX, kind.path_segment())
}

/// Build the console router.
///
/// ```rust,ignore
/// let services = GovernanceServices::from_config(&config);
/// let app = console_router(&services, Duration::from_secs(30));
/// ```
pub fn console_router(services: &GovernanceServices, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(
            &kind_path(RuleKind::CircuitBreaker),
            rule_router::<CircuitBreakerPolicy>(services.circuit_breakers.clone(), request_timeout),
        )
        .nest(
            &kind_path(RuleKind::RateLimit),
            rule_router::<RateLimitPolicy>(services.rate_limits.clone(), request_timeout),
        )
        .nest(
            &kind_path(RuleKind::Routing),
            rule_router::<RoutingPolicy>(services.routings.clone(), request_timeout),
        )
        .layer(TraceLayer::new_for_http())
}
