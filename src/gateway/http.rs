//! Transporte HTTP do gateway.
//!
//! Um único endpoint, `/`, recebe o envelope `{"code": ...}`. O tamanho do
//! corpo é limitado aqui, antes do coordenador: um corpo grande demais nunca
//! toca o cache nem o limitador.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN,
        },
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use regex::Regex;
use tokio::net::TcpListener;

use super::coordinator::Gateway;
use crate::telemetry::OutcomeClass;
use crate::types::config::ServerConfig;
use crate::types::responses::EvaluationOutcome;
use crate::{GateError, GateResult};

const ALLOW_METHODS: &str = "POST, GET, OPTIONS";
const ALLOW_HEADERS: &str =
    "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token";

/// Política de CORS: quais origens recebem os cabeçalhos.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    pattern: Regex,
    skip_check: bool,
}

impl CorsPolicy {
    /// Compila a política a partir do padrão de origens.
    pub fn new(pattern: &str, skip_check: bool) -> GateResult<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            skip_check,
        })
    }

    /// Retorna `true` se `origin` deve receber cabeçalhos CORS.
    pub fn allows(&self, origin: &str) -> bool {
        self.skip_check || self.pattern.is_match(origin)
    }

    /// Origem a refletir na resposta, se permitida.
    fn allowed_origin(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        let origin = headers.get(ORIGIN)?;
        let text = origin.to_str().ok()?;
        self.allows(text).then(|| origin.clone())
    }
}

/// Estado compartilhado pelos handlers.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
    cors: Arc<CorsPolicy>,
    max_body_bytes: usize,
}

impl AppState {
    /// Cria o estado a partir do coordenador e da configuração do servidor.
    pub fn new(gateway: Arc<Gateway>, server: &ServerConfig) -> GateResult<Self> {
        Ok(Self {
            gateway,
            cors: Arc::new(CorsPolicy::new(
                &server.allowed_origin_pattern,
                server.skip_cors_check,
            )?),
            max_body_bytes: server.max_body_bytes,
        })
    }
}

/// Monta o roteador público.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(evaluate_handler))
        .with_state(state)
}

/// Serve `router(state)` em `listener` até Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> GateResult<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GateError::Server(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn evaluate_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let origin = state.cors.allowed_origin(&headers);

    // OPTIONS é só preflight: o corpo não é lido
    if method == Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        apply_cors(response.headers_mut(), origin);
        return response;
    }

    let started = Instant::now();
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, limit = state.max_body_bytes, "Request body rejected");
            state
                .gateway
                .telemetry()
                .observe(OutcomeClass::TooLarge, started.elapsed());
            let outcome = EvaluationOutcome::too_large(state.max_body_bytes);
            return build_response(&outcome, origin);
        }
    };

    let outcome = state.gateway.handle(&bytes).await;
    build_response(&outcome, origin)
}

fn build_response(outcome: &EvaluationOutcome, origin: Option<HeaderValue>) -> Response {
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = match serde_json::to_vec(&outcome.to_envelope()) {
        Ok(bytes) => (status, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response envelope");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };

    apply_cors(response.headers_mut(), origin);
    response
}

fn apply_cors(headers: &mut HeaderMap, origin: Option<HeaderValue>) {
    if let Some(origin) = origin {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CorsPolicy {
        CorsPolicy::new(r"^https?://(localhost|127\.0\.0\.1)(:\d+)?$", false).unwrap()
    }

    #[test]
    fn test_cors_allows_matching_origins() {
        let cors = policy();
        assert!(cors.allows("http://localhost:3000"));
        assert!(cors.allows("https://127.0.0.1"));
        assert!(!cors.allows("https://evil.example.com"));
    }

    #[test]
    fn test_cors_skip_check_allows_everything() {
        let cors = CorsPolicy::new("^$", true).unwrap();
        assert!(cors.allows("https://anything.example.com"));
    }

    #[test]
    fn test_allowed_origin_reflects_header() {
        let cors = policy();
        let mut headers = HeaderMap::new();
        assert!(cors.allowed_origin(&headers).is_none());

        headers.insert(ORIGIN, HeaderValue::from_static("http://localhost:8000"));
        assert_eq!(
            cors.allowed_origin(&headers).unwrap(),
            HeaderValue::from_static("http://localhost:8000")
        );
    }

    #[test]
    fn test_build_response_sets_status_and_cors() {
        let response = build_response(
            &EvaluationOutcome::busy(),
            Some(HeaderValue::from_static("http://localhost")),
        );

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            HeaderValue::from_static("application/json")
        );
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], ALLOW_METHODS);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(matches!(
            CorsPolicy::new("([", false),
            Err(GateError::InvalidPattern(_))
        ));
    }
}
