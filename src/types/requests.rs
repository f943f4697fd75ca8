//! Tipos de requisição do evalgate.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Requisição de avaliação enviada pelo cliente.
///
/// O envelope tem um único campo, `code`, com o texto a ser avaliado.
/// A identidade para cache não é este struct, e sim os bytes exatos do
/// corpo HTTP (ver [`crate::cache::ResultCache`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Código a ser avaliado.
    pub code: String,
}

impl EvaluationRequest {
    /// Cria uma nova requisição.
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// Decodifica o corpo bruto de uma requisição.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Impressão digital curta de um corpo de requisição, usada em logs.
///
/// Nunca é usada como chave de cache; serve apenas para correlacionar
/// linhas de log sem registrar o código do usuário.
pub fn fingerprint(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    hex::encode(&digest[..6])
}
