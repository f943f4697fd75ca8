//! Implementação dos comandos CLI do evalgate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::executors::{Evaluator, JsonnetExecutor};
use crate::gateway::{AppState, Gateway};
use crate::telemetry::{serve_metrics, PrometheusTelemetry};
use crate::types::config::Config;
use crate::{GateError, GateResult};

/// Initializes configuration in the specified directory.
pub async fn init(path: Option<PathBuf>) -> GateResult<()> {
    let target_dir = path.unwrap_or_else(|| PathBuf::from("."));

    // Create directory if it doesn't exist
    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
        tracing::info!("Directory created: {}", target_dir.display());
    }

    let config_path = target_dir.join("evalgate.toml");

    if config_path.exists() {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Edit it directly or remove it to start over.");
        return Ok(());
    }

    let config = Config::default_config();
    config.save(&config_path)?;

    println!("evalgate initialized successfully!");
    println!("Configuration created at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Check the evaluator is installed: evalgate doctor");
    println!("  2. Start the gateway: evalgate serve");

    Ok(())
}

/// Inicia o servidor HTTP e o endpoint de métricas.
pub async fn serve(
    bind: Option<String>,
    metrics_bind: Option<String>,
    config: &Config,
) -> GateResult<()> {
    config.validate()?;

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let metrics_bind = metrics_bind.unwrap_or_else(|| config.server.metrics_bind.clone());

    tracing::debug!(
        "Configuração carregada: rate={}/s, burst={}, timeout={}s, cache={} entradas",
        config.limiter.rate_per_sec,
        config.limiter.burst,
        config.evaluator.timeout_secs,
        config.cache.capacity
    );

    let telemetry = Arc::new(PrometheusTelemetry::new()?);
    let evaluator: Arc<dyn Evaluator> = Arc::new(JsonnetExecutor::from_config(&config.evaluator));

    if !evaluator.is_available().await {
        tracing::warn!(
            command = evaluator.command(),
            "Evaluator not found; requests will fail with 500 until it is installed"
        );
    }

    let gateway = Arc::new(Gateway::from_config(
        config,
        evaluator,
        telemetry.clone(),
    ));
    let state = AppState::new(gateway, &config.server)?;

    let (metrics_addr, metrics_task) = serve_metrics(&metrics_bind, telemetry).await?;
    tracing::info!("Serving metrics at http://{}/metrics", metrics_addr);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| GateError::Server(format!("failed to bind {bind}: {e}")))?;
    tracing::info!("Starting main server at http://{}", listener.local_addr()?);

    let result = crate::gateway::serve(listener, state).await;
    metrics_task.abort();

    tracing::info!("Graceful exit");
    result
}

/// Diagnostica problemas de configuração.
pub async fn doctor(config_path: &Path, config: &Config) -> GateResult<()> {
    println!("Diagnosticando configuração do evalgate...\n");

    let mut issues: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if config_path.exists() {
        println!("✓ Configuração carregada de {}", config_path.display());
    } else {
        warnings.push(format!(
            "{} não encontrado, usando valores padrão",
            config_path.display()
        ));
    }

    match config.validate() {
        Ok(()) => println!("✓ Configuração válida"),
        Err(e) => issues.push(e.to_string()),
    }

    let evaluator = JsonnetExecutor::from_config(&config.evaluator);
    if evaluator.is_available().await {
        let version = evaluator
            .version()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        println!(
            "✓ Avaliador disponível (comando: {}, versão: {})",
            evaluator.command(),
            version
        );
    } else {
        issues.push(format!(
            "Avaliador não encontrado (comando esperado: {})",
            evaluator.command()
        ));
    }

    if let Some(path) = &config.evaluator.extra_import_path {
        if !Path::new(path).exists() {
            warnings.push(format!("extra_import_path não existe: {}", path));
        }
    }

    // Resumo
    println!();
    if issues.is_empty() && warnings.is_empty() {
        println!("✓ Tudo OK! evalgate está pronto para uso.");
    } else {
        if !warnings.is_empty() {
            println!("Avisos:");
            for warning in warnings {
                println!("  ⚠ {}", warning);
            }
        }
        if !issues.is_empty() {
            println!("Problemas:");
            for issue in issues {
                println!("  ✗ {}", issue);
            }
        }
    }

    Ok(())
}

/// Mostra versão.
pub fn version() {
    println!("evalgate {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Throttled, cached, time-bounded gateway for an external code evaluator");
}

/// Avalia código uma vez, sem cache nem limitador.
pub async fn eval(code: &str, config: &Config) -> GateResult<()> {
    // Carrega código de arquivo se começar com @
    let code_content = if let Some(file_path) = code.strip_prefix('@') {
        std::fs::read_to_string(file_path)?
    } else {
        code.to_string()
    };

    let evaluator = JsonnetExecutor::from_config(&config.evaluator);
    match evaluator
        .evaluate(&code_content, config.evaluator.timeout())
        .await
    {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(e) => {
            let output = e.output();
            if !output.is_empty() {
                eprint!("{}", output);
            }
            Err(GateError::other(e.to_string()))
        }
    }
}
