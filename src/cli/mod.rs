//! Interface de linha de comando do evalgate.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// evalgate - gateway HTTP com cache, limite de taxa e prazo para um avaliador externo.
#[derive(Parser, Debug)]
#[command(name = "evalgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Arquivo de configuração.
    #[arg(short, long, default_value = "evalgate.toml")]
    pub config: PathBuf,

    /// Modo verbose.
    #[arg(short, long)]
    pub verbose: bool,

    /// Modo silencioso.
    #[arg(short, long)]
    pub quiet: bool,

    /// Comando a executar.
    #[command(subcommand)]
    pub command: Commands,
}

/// Comandos disponíveis.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inicializa configuração no diretório atual.
    Init {
        /// Diretório de destino (padrão: diretório atual).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Inicia o servidor HTTP e o endpoint de métricas.
    Serve {
        /// Endereço do endpoint público (sobrescreve o config).
        #[arg(short, long)]
        bind: Option<String>,

        /// Endereço do endpoint de métricas (sobrescreve o config).
        #[arg(short, long)]
        metrics_bind: Option<String>,
    },

    /// Diagnostica problemas de configuração.
    Doctor,

    /// Avalia um trecho de código uma vez, com o prazo configurado.
    Eval {
        /// Código a avaliar (ou @arquivo).
        code: String,
    },

    /// Mostra versão.
    Version,
}
