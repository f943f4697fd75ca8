//! Tipos de resposta do evalgate.

use serde::{Deserialize, Serialize};

/// Mensagem devolvida quando o limitador recusa a requisição.
pub const BUSY_MESSAGE: &str = "Server is busy, please try again";

/// Status HTTP usados pelos resultados.
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const PAYLOAD_TOO_LARGE: u16 = 413;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const GATEWAY_TIMEOUT: u16 = 504;
}

/// Resultado de uma avaliação: sucesso ou falha, nunca ambos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A avaliação terminou com sucesso.
    Success {
        /// Saída do avaliador.
        output: String,
    },
    /// A requisição falhou (validação, avaliação, prazo, admissão...).
    Failure {
        /// Mensagem legível com diagnóstico.
        message: String,
    },
}

/// Resultado final de uma requisição, com o status HTTP a reportar.
///
/// Imutável depois de produzido; é o valor guardado no cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationOutcome {
    /// Sucesso ou falha.
    pub outcome: Outcome,

    /// Status HTTP equivalente.
    pub status: u16,
}

impl EvaluationOutcome {
    /// Saída de uma avaliação bem sucedida (200).
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Success {
                output: output.into(),
            },
            status: status::OK,
        }
    }

    /// Falha com status arbitrário.
    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failure {
                message: message.into(),
            },
            status,
        }
    }

    /// Falha com erro e saída de diagnóstico, no formato `"<erro>\n<saída>"`.
    pub fn failure_with_output(status: u16, error: impl std::fmt::Display, output: &str) -> Self {
        let message = if output.is_empty() {
            error.to_string()
        } else {
            format!("{}\n{}", error, output)
        };
        Self::failure(status, message)
    }

    /// Resposta de servidor ocupado (429).
    pub fn busy() -> Self {
        Self::failure(status::TOO_MANY_REQUESTS, BUSY_MESSAGE)
    }

    /// Corpo acima do limite configurado (413).
    pub fn too_large(limit: usize) -> Self {
        Self::failure(
            status::PAYLOAD_TOO_LARGE,
            format!(
                "Request too large - Code must be smaller than {} bytes",
                limit
            ),
        )
    }

    /// Converte para o envelope de resposta.
    pub fn to_envelope(&self) -> ResponseEnvelope {
        match &self.outcome {
            Outcome::Success { output } => ResponseEnvelope {
                output: Some(output.clone()),
                error: None,
            },
            Outcome::Failure { message } => ResponseEnvelope {
                output: None,
                error: Some(message.clone()),
            },
        }
    }
}

/// Envelope JSON devolvido ao cliente.
///
/// Exatamente um dos campos está presente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Saída em caso de sucesso.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Mensagem de erro em caso de falha.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
