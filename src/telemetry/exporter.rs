//! Exportação das métricas em formato Prometheus.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Response as HttpResponse, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use tokio::task::JoinHandle;

use super::{OutcomeClass, Telemetry};
use crate::{GateError, GateResult};

/// Telemetria com registro Prometheus próprio (nunca o registro global).
#[derive(Clone)]
pub struct PrometheusTelemetry {
    registry: Arc<Registry>,
    requests: IntCounter,
    rate_limited: IntCounter,
    timeouts: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    duration: HistogramVec,
    running: IntGauge,
}

impl PrometheusTelemetry {
    /// Cria e registra todas as métricas.
    pub fn new() -> GateResult<Self> {
        let registry = Arc::new(Registry::new());

        let requests = IntCounter::with_opts(Opts::new(
            "evalgate_requests_total",
            "Number of total requests to the evaluation gateway",
        ))?;
        let rate_limited = IntCounter::with_opts(Opts::new(
            "evalgate_requests_ratelimited_total",
            "Number of requests answered with HTTP 429 due to rate limits",
        ))?;
        let timeouts = IntCounter::with_opts(Opts::new(
            "evalgate_requests_timeout_total",
            "Number of requests where the evaluator hit its deadline",
        ))?;
        let cache_hits = IntCounter::with_opts(Opts::new(
            "evalgate_cache_hits_total",
            "Number of requests answered from the result cache",
        ))?;
        let cache_misses = IntCounter::with_opts(Opts::new(
            "evalgate_cache_misses_total",
            "Number of requests that missed the result cache",
        ))?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "evalgate_request_duration_seconds",
                "Duration of requests to the evaluation gateway",
            ),
            &["outcome"],
        )?;
        let running = IntGauge::with_opts(Opts::new(
            "evalgate_running_evaluations",
            "Number of external evaluations currently running in this instance",
        ))?;

        for counter in [&requests, &rate_limited, &timeouts, &cache_hits, &cache_misses] {
            registry.register(Box::new(counter.clone()))?;
        }
        registry.register(Box::new(duration.clone()))?;
        // Séries zeradas para todas as classes desde o início
        for class in OutcomeClass::ALL {
            duration.with_label_values(&[class.as_str()]);
        }
        registry.register(Box::new(running.clone()))?;

        Ok(Self {
            registry,
            requests,
            rate_limited,
            timeouts,
            cache_hits,
            cache_misses,
            duration,
            running,
        })
    }

    /// Registro com todas as métricas do gateway.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Codifica o estado atual no formato texto do Prometheus.
    pub fn encode(&self) -> GateResult<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

impl Telemetry for PrometheusTelemetry {
    fn observe(&self, class: OutcomeClass, elapsed: Duration) {
        self.requests.inc();
        match class {
            OutcomeClass::CacheHit => self.cache_hits.inc(),
            OutcomeClass::RateLimited => self.rate_limited.inc(),
            OutcomeClass::TimedOut => self.timeouts.inc(),
            _ => {}
        }
        if class.is_cache_miss() {
            self.cache_misses.inc();
        }
        self.duration
            .with_label_values(&[class.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    fn evaluation_started(&self) {
        self.running.inc();
    }

    fn evaluation_finished(&self) {
        self.running.dec();
    }
}

/// Sobe o endpoint `/metrics` em `bind`, separado do listener público.
pub async fn serve_metrics(
    bind: &str,
    telemetry: Arc<PrometheusTelemetry>,
) -> GateResult<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| GateError::Server(format!("failed to bind metrics endpoint on {bind}: {e}")))?;
    let addr = listener.local_addr()?;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(telemetry);

    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "Prometheus endpoint failed");
        }
    });

    Ok((addr, handle))
}

async fn metrics_handler(
    State(telemetry): State<Arc<PrometheusTelemetry>>,
) -> Result<Response, StatusCode> {
    let buffer = telemetry.encode().map_err(|err| {
        tracing::error!(error = %err, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    HttpResponse::builder()
        .status(StatusCode::OK)
        .header("content-type", TextEncoder::new().format_type())
        .body(Body::from(buffer))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
