//! Tipos de erro do evalgate.

use std::time::Duration;

use thiserror::Error;

/// Tipo de resultado padrão do evalgate.
pub type GateResult<T> = Result<T, GateError>;

/// Erros possíveis no evalgate (fora do caminho de uma requisição).
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Erro de configuração: {0}")]
    Config(String),

    #[error("Erro de IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro ao parsear TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Erro ao serializar TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Erro de métricas: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Padrão de origem inválido: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Erro no servidor HTTP: {0}")]
    Server(String),

    #[error("{0}")]
    Other(String),
}

impl GateError {
    /// Cria um erro genérico.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Cria um erro de configuração.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}

/// Erros do avaliador externo.
///
/// Cada variante corresponde a uma classe de resultado distinta no
/// coordenador: `Failed` é cacheável, `Timeout` e `Spawn` nunca são.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    /// O processo terminou com status diferente de zero.
    #[error("{status}")]
    Failed {
        /// Descrição do status de saída (ex.: "exit status: 1").
        status: String,
        /// Saída capturada (stdout seguido de stderr).
        output: String,
    },

    /// O prazo expirou e o grupo de processos foi encerrado.
    #[error("Evaluation timed out after {0:?}")]
    Timeout(Duration),

    /// Não foi possível iniciar o processo.
    #[error("Failed to start evaluator: {0}")]
    Spawn(#[source] std::io::Error),

    /// A saída não pôde ser convertida para o formato configurado.
    #[error("Failed to convert output: {0}")]
    OutputFormat(String),
}

impl EvaluatorError {
    /// Retorna `true` se o erro representa um estouro de prazo.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Retorna `true` se o erro é de infraestrutura (o avaliador nem rodou).
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Spawn(_))
    }

    /// Saída de diagnóstico associada ao erro, se houver.
    pub fn output(&self) -> &str {
        match self {
            Self::Failed { output, .. } => output,
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluator_error_classes() {
        let failed = EvaluatorError::Failed {
            status: "exit status: 1".to_string(),
            output: "RUNTIME ERROR".to_string(),
        };
        assert!(!failed.is_timeout());
        assert!(!failed.is_infrastructure());
        assert_eq!(failed.output(), "RUNTIME ERROR");
        assert_eq!(failed.to_string(), "exit status: 1");

        let timeout = EvaluatorError::Timeout(Duration::from_secs(5));
        assert!(timeout.is_timeout());
        assert_eq!(timeout.output(), "");

        let spawn = EvaluatorError::Spawn(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(spawn.is_infrastructure());
    }

    #[test]
    fn test_gate_error_helpers() {
        assert_eq!(
            GateError::config("burst must be > 0").to_string(),
            "Erro de configuração: burst must be > 0"
        );
        assert_eq!(GateError::other("boom").to_string(), "boom");
    }
}
