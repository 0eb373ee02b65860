use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{Router, routing::get};
use gatehouse_auth::session::{InMemorySessionStore, SessionStore};
use gatehouse_auth::{RelyingParty, RelyingPartyState};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::{config::AppConfig, handlers};

pub struct GatehouseServer {
    addr: SocketAddr,
    app: Router,
    relying_party: Arc<RelyingParty>,
}

pub fn build_app(relying_party: Arc<RelyingParty>) -> Router {
    Router::new()
        // Public endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        // Login, callback, logout and the protected user endpoint
        .merge(gatehouse_auth::http::routes())
        .fallback(handlers::not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // Health probes would drown out real traffic
                    if req.uri().path() == "/healthz" {
                        return tracing::span!(tracing::Level::TRACE, "noop");
                    }
                    // Path only: callback queries carry the authorization code
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        if let Some(meta) = span.metadata()
                            && meta.name() != "noop"
                        {
                            tracing::info!(
                                http.status = %res.status().as_u16(),
                                elapsed_ms = %latency.as_millis(),
                                "request handled"
                            );
                        }
                    },
                ),
        )
        .with_state(RelyingPartyState::new(relying_party))
}

/// Build the relying party for `cfg` with an in-memory session store.
pub fn relying_party(cfg: &AppConfig) -> gatehouse_auth::AuthResult<RelyingParty> {
    let auth = cfg.relying_party();
    let store: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::new(auth.session.idle_timeout));
    RelyingParty::new(auth, store)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Create the relying party and load provider metadata.
    ///
    /// Fails before any socket is bound if the configuration is invalid or
    /// the provider cannot be discovered.
    pub async fn build(self) -> anyhow::Result<GatehouseServer> {
        let relying_party =
            Arc::new(relying_party(&self.config).context("relying party initialization failed")?);

        let metadata = relying_party
            .fetch_metadata()
            .await
            .context("provider discovery failed")?;
        tracing::info!(
            issuer = %metadata.issuer,
            pkce_s256 = metadata.supports_pkce_s256(),
            "Provider metadata loaded"
        );

        Ok(GatehouseServer {
            addr: self.addr,
            app: build_app(relying_party.clone()),
            relying_party,
        })
    }
}

impl GatehouseServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let purger = spawn_session_purger(self.relying_party.clone());

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        purger.abort();
        served?;
        Ok(())
    }
}

/// Periodically drop idle sessions.
fn spawn_session_purger(relying_party: Arc<RelyingParty>) -> JoinHandle<()> {
    let period = relying_party.config().session.purge_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match relying_party.store().purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged idle sessions"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
