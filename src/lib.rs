//! # evalgate
//!
//! Gateway HTTP para um avaliador de código externo, lento e que pode
//! travar (a CLI `jsonnet` por padrão).
//!
//! Cada requisição passa por um pipeline com cache, limitação de taxa e
//! prazo rígido: resultados repetidos saem do cache, avaliações novas só
//! começam se o token bucket admitir, e processos que estouram o prazo
//! são mortos junto com seus descendentes.
//!
//! ## Módulos
//!
//! - [`cli`] - Interface de linha de comando
//! - [`gateway`] - Coordenador de requisições e transporte HTTP
//! - [`executors`] - Avaliador externo com prazo
//! - [`limiter`] - Token bucket de admissão
//! - [`cache`] - Cache LRU com expiração para resultados
//! - [`telemetry`] - Contadores, histogramas e exportação Prometheus
//! - [`clock`] - Fonte de tempo injetável
//! - [`types`] - Tipos compartilhados

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod executors;
pub mod gateway;
pub mod limiter;
pub mod telemetry;
pub mod types;

pub use types::config::Config;
pub use types::errors::{EvaluatorError, GateError, GateResult};
