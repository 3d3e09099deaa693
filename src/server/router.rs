use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::dev::dev_router;
use super::public::public_router;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::notify::{LogNotifier, Notifier};
use crate::orders::{AssignmentEngine, OrderService, RandomDraw, TicketDraw};
use crate::payments::{PaymentProcessor, ProviderRegistry};
use crate::raffles::RaffleService;
use crate::ratelimit::RateLimiter;
use crate::recovery::RecoveryService;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
    pub limiter: RateLimiter,
    pub raffles: RaffleService,
    pub orders: Arc<OrderService>,
    pub payments: PaymentProcessor,
    pub recovery: RecoveryService,
}

impl AppState {
    /// Wires every service with the production collaborators.
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self::with_collaborators(
            store,
            config,
            Arc::new(SystemClock),
            Arc::new(RandomDraw),
            Arc::new(LogNotifier),
        )
    }

    pub fn with_collaborators(
        store: Arc<dyn Store>,
        config: Config,
        clock: Arc<dyn Clock>,
        draw: Arc<dyn TicketDraw>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let base_url = config.server.base_url();

        let engine = Arc::new(AssignmentEngine::new(
            store.clone(),
            clock.clone(),
            draw,
            notifier.clone(),
            config.assignment.max_attempts_per_ticket,
        ));
        let orders = Arc::new(OrderService::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            engine,
        ));
        let registry = Arc::new(ProviderRegistry::from_config(
            &config.payments,
            config.server.dev_mode,
        ));

        Self {
            limiter: RateLimiter::new(store.clone(), clock.clone()),
            raffles: RaffleService::new(store.clone(), clock.clone()),
            payments: PaymentProcessor::new(
                store.clone(),
                clock.clone(),
                orders.clone(),
                registry,
                base_url.clone(),
            ),
            recovery: RecoveryService::new(store.clone(), clock.clone(), notifier, base_url),
            orders,
            store,
            clock,
            config,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", public_router());

    if state.config.server.dev_mode {
        tracing::warn!("dev mode enabled: manual payment routes are mounted");
        router = router.nest("/api/v1/dev", dev_router());
    }

    router
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
