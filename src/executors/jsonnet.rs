//! Avaliador para a CLI jsonnet.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

use super::base::Evaluator;
use super::process::ProcessHandle;
use crate::types::config::{EvaluatorConfig, OutputFormat};
use crate::types::errors::EvaluatorError;

/// Avaliador que executa `jsonnet [-J <path>] -e <code>`.
///
/// O código vai como argumento, nunca por um shell.
pub struct JsonnetExecutor {
    command_name: String,
    extra_import_path: Option<String>,
    output_format: OutputFormat,
}

impl JsonnetExecutor {
    /// Cria um novo avaliador com valores padrão.
    pub fn new() -> Self {
        Self {
            command_name: "jsonnet".to_string(),
            extra_import_path: None,
            output_format: OutputFormat::Raw,
        }
    }

    /// Cria avaliador a partir da configuração do TOML.
    pub fn from_config(config: &EvaluatorConfig) -> Self {
        Self {
            command_name: config.command.clone(),
            extra_import_path: config.extra_import_path.clone(),
            output_format: config.output_format,
        }
    }

    /// Define o comando a executar.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command_name = command.into();
        self
    }

    /// Define o caminho extra de busca de bibliotecas.
    #[must_use]
    pub fn with_import_path(mut self, path: impl Into<String>) -> Self {
        self.extra_import_path = Some(path.into());
        self
    }

    /// Define o pós-processamento da saída.
    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Argumentos da linha de comando para `code`.
    fn build_args(&self, code: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if let Some(path) = &self.extra_import_path {
            args.push("-J".to_string());
            args.push(path.clone());
        }
        args.push("-e".to_string());
        args.push(code.to_string());
        args
    }

    fn format_output(&self, output: String) -> Result<String, EvaluatorError> {
        match self.output_format {
            OutputFormat::Raw => Ok(output),
            OutputFormat::Yaml => json_to_yaml(&output),
        }
    }
}

impl Default for JsonnetExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Evaluator for JsonnetExecutor {
    fn name(&self) -> &str {
        "jsonnet"
    }

    fn command(&self) -> &str {
        &self.command_name
    }

    async fn evaluate(&self, code: &str, deadline: Duration) -> Result<String, EvaluatorError> {
        let mut command = Command::new(&self.command_name);
        command.args(self.build_args(code));

        let mut process = ProcessHandle::spawn(command).map_err(EvaluatorError::Spawn)?;
        let finished = process.wait(deadline).await?;
        let output = finished.output_lossy();

        if finished.status.success() {
            self.format_output(output)
        } else {
            Err(EvaluatorError::Failed {
                status: finished.status.to_string(),
                output,
            })
        }
    }
}

/// Converte a saída JSON do avaliador em YAML.
fn json_to_yaml(output: &str) -> Result<String, EvaluatorError> {
    let value: serde_json::Value =
        serde_json::from_str(output).map_err(|e| EvaluatorError::OutputFormat(e.to_string()))?;
    serde_yaml::to_string(&value).map_err(|e| EvaluatorError::OutputFormat(e.to_string()))
}
