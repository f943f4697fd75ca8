//! Telemetria passiva do pipeline de avaliação.
//!
//! O coordenador só incrementa e observa; exportar os valores é papel de
//! quem implementa [`Telemetry`] (ver [`PrometheusTelemetry`]).

mod exporter;

pub use exporter::{serve_metrics, PrometheusTelemetry};

use std::time::Duration;

/// Classe do estado terminal de uma requisição.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeClass {
    /// Resultado servido do cache.
    CacheHit,
    /// Recusado pelo limitador.
    RateLimited,
    /// Avaliação terminou com sucesso.
    Completed,
    /// Avaliação terminou com falha.
    Failed,
    /// Avaliação excedeu o prazo.
    TimedOut,
    /// Corpo não decodificável.
    Invalid,
    /// Corpo acima do limite.
    TooLarge,
    /// Não foi possível iniciar o avaliador.
    Infrastructure,
    /// O cliente desistiu antes do fim da avaliação.
    Cancelled,
}

impl OutcomeClass {
    /// Todas as classes, na ordem de declaração.
    pub const ALL: [OutcomeClass; 9] = [
        OutcomeClass::CacheHit,
        OutcomeClass::RateLimited,
        OutcomeClass::Completed,
        OutcomeClass::Failed,
        OutcomeClass::TimedOut,
        OutcomeClass::Invalid,
        OutcomeClass::TooLarge,
        OutcomeClass::Infrastructure,
        OutcomeClass::Cancelled,
    ];

    /// Nome usado como label de métrica e campo de log.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeClass::CacheHit => "cache_hit",
            OutcomeClass::RateLimited => "rate_limited",
            OutcomeClass::Completed => "completed",
            OutcomeClass::Failed => "failed",
            OutcomeClass::TimedOut => "timed_out",
            OutcomeClass::Invalid => "invalid",
            OutcomeClass::TooLarge => "too_large",
            OutcomeClass::Infrastructure => "infrastructure",
            OutcomeClass::Cancelled => "cancelled",
        }
    }

    /// Retorna `true` se a requisição passou por um cache miss.
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            OutcomeClass::RateLimited
                | OutcomeClass::Completed
                | OutcomeClass::Failed
                | OutcomeClass::TimedOut
                | OutcomeClass::Infrastructure
                | OutcomeClass::Cancelled
        )
    }
}

impl std::fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observador das decisões do coordenador.
pub trait Telemetry: Send + Sync {
    /// Registra um estado terminal e a latência da requisição.
    ///
    /// Chamado exatamente uma vez por requisição, inclusive quando a
    /// future é descartada no meio (classe [`OutcomeClass::Cancelled`]).
    fn observe(&self, class: OutcomeClass, elapsed: Duration);

    /// Uma avaliação externa começou.
    fn evaluation_started(&self) {}

    /// Uma avaliação externa terminou (com qualquer resultado).
    fn evaluation_finished(&self) {}
}
