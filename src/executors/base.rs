//! Trait base para avaliadores.

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::errors::EvaluatorError;
use crate::{GateError, GateResult};

/// Prazo padrão para a sondagem `--version`.
pub const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Avaliador de código com prazo rígido.
///
/// Cada chamada a [`Evaluator::evaluate`] é independente: nenhuma
/// compartilha estado de processo com outra.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Retorna o nome do avaliador.
    fn name(&self) -> &str;

    /// Retorna o comando CLI.
    fn command(&self) -> &str;

    /// Prazo para `<comando> --version`.
    fn version_check_timeout(&self) -> Duration {
        VERSION_CHECK_TIMEOUT
    }

    /// Verifica se a CLI está disponível no sistema.
    async fn is_available(&self) -> bool {
        run_version_check(self.command(), self.version_check_timeout())
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Retorna a versão da CLI.
    async fn version(&self) -> GateResult<String> {
        let output = run_version_check(self.command(), self.version_check_timeout()).await?;

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("unknown")
            .to_string();

        Ok(version)
    }

    /// Avalia `code`, encerrando o processo se `deadline` expirar.
    ///
    /// # Returns
    ///
    /// A saída capturada em caso de sucesso; em caso de falha, um
    /// [`EvaluatorError`] que distingue falha de avaliação, estouro de prazo
    /// e falha ao iniciar o processo.
    async fn evaluate(&self, code: &str, deadline: Duration) -> Result<String, EvaluatorError>;
}

/// Executa `<command> --version`; o processo morre se o prazo expirar.
async fn run_version_check(command: &str, deadline: Duration) -> GateResult<Output> {
    let mut check = tokio::process::Command::new(command);
    check.arg("--version").kill_on_drop(true);

    match tokio::time::timeout(deadline, check.output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(GateError::other(format!(
            "{command} --version did not answer within {deadline:?}"
        ))),
    }
}
