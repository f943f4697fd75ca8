use clap::Parser;
use evalgate::cli::{Cli, Commands};
use evalgate::types::config::Config;
use evalgate::{GateError, GateResult};
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> GateResult<()> {
    let cli = Cli::parse();

    // Load configuration first (no logging yet)
    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default_config()
    };

    // Determine log level: CLI flags take precedence over config
    let log_level = if cli.quiet {
        "error".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };

    // Initialize logging with appropriate level
    let directive: Directive = format!("evalgate={}", log_level)
        .parse()
        .or_else(|_| "evalgate=info".parse())
        .map_err(|e: ParseError| GateError::config(format!("invalid log level: {e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let json = config.general.log_format.eq_ignore_ascii_case("json");
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(filter)
        .init();

    tracing::debug!("Configuration loaded from: {}", cli.config.display());

    match cli.command {
        Commands::Init { path } => {
            evalgate::cli::commands::init(path).await?;
        }
        Commands::Serve { bind, metrics_bind } => {
            evalgate::cli::commands::serve(bind, metrics_bind, &config).await?;
        }
        Commands::Doctor => {
            evalgate::cli::commands::doctor(&cli.config, &config).await?;
        }
        Commands::Eval { code } => {
            evalgate::cli::commands::eval(&code, &config).await?;
        }
        Commands::Version => {
            evalgate::cli::commands::version();
        }
    }

    Ok(())
}
