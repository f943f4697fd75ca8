//! Coordenador de requisições.
//!
//! Fluxo por requisição:
//!
//! ```text
//! Received ─► CacheCheck ─► CacheHit
//!    │            │
//!    ▼            ▼
//! Invalid    AdmissionCheck ─► Denied
//!                 │
//!                 ▼
//!            Evaluating ─► Completed | Failed | TimedOut | Infrastructure
//! ```
//!
//! Nenhum lock do cache ou do limitador fica preso enquanto o processo
//! externo roda: cada componente segura o próprio mutex só dentro da
//! chamada síncrona correspondente.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::cache::ResultCache;
use crate::executors::Evaluator;
use crate::limiter::TokenBucket;
use crate::telemetry::{OutcomeClass, Telemetry};
use crate::types::config::Config;
use crate::types::requests::{fingerprint, EvaluationRequest};
use crate::types::responses::{status, EvaluationOutcome};

/// Parâmetros de política do coordenador.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Prazo de cada avaliação.
    pub deadline: Duration,

    /// Tempo de vida das entradas do cache.
    pub ttl: Duration,

    /// Cacheia também falhas de avaliação.
    pub cache_failures: bool,
}

impl GatewaySettings {
    /// Extrai as políticas da configuração.
    pub fn from_config(config: &Config) -> Self {
        Self {
            deadline: config.evaluator.timeout(),
            ttl: config.cache.ttl(),
            cache_failures: config.cache.cache_failures,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from_config(&Config::default_config())
    }
}

/// Orquestra cache, limitador e avaliador para cada requisição.
pub struct Gateway {
    cache: ResultCache,
    limiter: TokenBucket,
    evaluator: Arc<dyn Evaluator>,
    telemetry: Arc<dyn Telemetry>,
    settings: GatewaySettings,
}

impl Gateway {
    /// Cria um coordenador com componentes já construídos.
    pub fn new(
        cache: ResultCache,
        limiter: TokenBucket,
        evaluator: Arc<dyn Evaluator>,
        telemetry: Arc<dyn Telemetry>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            cache,
            limiter,
            evaluator,
            telemetry,
            settings,
        }
    }

    /// Cria um coordenador a partir da configuração.
    pub fn from_config(
        config: &Config,
        evaluator: Arc<dyn Evaluator>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self::new(
            ResultCache::new(config.cache.capacity),
            TokenBucket::new(config.limiter.rate_per_sec, config.limiter.burst),
            evaluator,
            telemetry,
            GatewaySettings::from_config(config),
        )
    }

    /// Cache de resultados.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Limitador de admissão.
    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    /// Observador de telemetria.
    pub fn telemetry(&self) -> &dyn Telemetry {
        self.telemetry.as_ref()
    }

    /// Políticas em vigor.
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Processa o corpo bruto de uma requisição até um resultado final.
    ///
    /// Todo erro vira um [`EvaluationOutcome`]; nada é propagado.
    pub async fn handle(&self, body: &[u8]) -> EvaluationOutcome {
        let span = tracing::info_span!(
            "gateway.request",
            request_id = %uuid::Uuid::new_v4(),
            body = %fingerprint(body),
            bytes = body.len(),
        );

        async {
            let mut observation = Observation::start(self.telemetry.as_ref());
            let (class, outcome) = self.process(body).await;
            let elapsed = observation.finish(class);

            tracing::info!(
                outcome = %class,
                status = outcome.status,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request handled"
            );

            outcome
        }
        .instrument(span)
        .await
    }

    async fn process(&self, body: &[u8]) -> (OutcomeClass, EvaluationOutcome) {
        let request = match EvaluationRequest::from_body(body) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "Undecodable request body");
                return (
                    OutcomeClass::Invalid,
                    EvaluationOutcome::failure(status::BAD_REQUEST, format!("Invalid request: {e}")),
                );
            }
        };

        if let Some(cached) = self.cache.get(body) {
            tracing::debug!("Cache hit");
            return (OutcomeClass::CacheHit, cached);
        }

        if !self.limiter.try_admit() {
            tracing::warn!("Rate limited, evaluator not invoked");
            return (OutcomeClass::RateLimited, EvaluationOutcome::busy());
        }

        let result = {
            let _running = RunningEvaluation::start(self.telemetry.as_ref());
            self.evaluator
                .evaluate(&request.code, self.settings.deadline)
                .await
        };

        match result {
            Ok(output) => {
                let outcome = EvaluationOutcome::success(output);
                self.cache.put(body.to_vec(), outcome.clone(), self.settings.ttl);
                (OutcomeClass::Completed, outcome)
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(deadline = ?self.settings.deadline, "Evaluation timed out");
                (
                    OutcomeClass::TimedOut,
                    EvaluationOutcome::failure(status::GATEWAY_TIMEOUT, e.to_string()),
                )
            }
            Err(e) if e.is_infrastructure() => {
                tracing::error!(
                    error = %e,
                    evaluator = self.evaluator.command(),
                    "Evaluator could not be started"
                );
                (
                    OutcomeClass::Infrastructure,
                    EvaluationOutcome::failure(status::INTERNAL_SERVER_ERROR, e.to_string()),
                )
            }
            Err(e) => {
                let outcome = EvaluationOutcome::failure_with_output(status::BAD_REQUEST, &e, e.output());
                if self.settings.cache_failures {
                    self.cache.put(body.to_vec(), outcome.clone(), self.settings.ttl);
                }
                (OutcomeClass::Failed, outcome)
            }
        }
    }
}

/// Garante uma única observação por requisição.
///
/// Se a future for descartada antes de [`Observation::finish`] (cliente
/// desconectou), o drop registra [`OutcomeClass::Cancelled`].
struct Observation<'a> {
    telemetry: &'a dyn Telemetry,
    started: Instant,
    finished: bool,
}

impl<'a> Observation<'a> {
    fn start(telemetry: &'a dyn Telemetry) -> Self {
        Self {
            telemetry,
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish(&mut self, class: OutcomeClass) -> Duration {
        let elapsed = self.started.elapsed();
        self.finished = true;
        self.telemetry.observe(class, elapsed);
        elapsed
    }
}

impl Drop for Observation<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!("Request cancelled before completion");
            self.telemetry
                .observe(OutcomeClass::Cancelled, self.started.elapsed());
        }
    }
}

/// Mantém o gauge de avaliações em andamento correto mesmo se a future
/// for cancelada no meio.
struct RunningEvaluation<'a> {
    telemetry: &'a dyn Telemetry,
}

impl<'a> RunningEvaluation<'a> {
    fn start(telemetry: &'a dyn Telemetry) -> Self {
        telemetry.evaluation_started();
        Self { telemetry }
    }
}

impl Drop for RunningEvaluation<'_> {
    fn drop(&mut self) {
        self.telemetry.evaluation_finished();
    }
}
