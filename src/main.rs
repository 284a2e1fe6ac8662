use clap::Parser;
use std::path::PathBuf;

use blueprint_lib::config::{default_provider_chain, parse_provider_chain, AppConfig};
use blueprint_lib::server::{self, ServerAppState};
use blueprint_lib::shutdown::{register_signal_handlers, ShutdownState};

/// Blueprint - streaming product research server
#[derive(Parser, Debug)]
#[command(name = "blueprint-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to bind the server to
    #[arg(long, env = "BLUEPRINT_PORT", default_value = "4400")]
    port: u16,

    /// Address to bind the server to
    #[arg(long, env = "BLUEPRINT_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Directory under which journey and cache state is kept
    /// (a `.blueprint/` subdirectory is created inside it)
    #[arg(long, env = "BLUEPRINT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Comma-separated LLM provider fallback chain
    /// (supported: gemini, openai, groq, openrouter)
    #[arg(long, env = "BLUEPRINT_PROVIDERS")]
    providers: Option<String>,

    /// Comma-separated allowed CORS origins; omit for wildcard
    #[arg(long, env = "BLUEPRINT_CORS_ORIGINS")]
    cors_origins: Option<String>,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let config = match build_config(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let shutdown_state = ShutdownState::new();
        if let Err(e) = register_signal_handlers(shutdown_state.clone()) {
            log::warn!("Failed to register signal handlers: {}", e);
        }

        let state = ServerAppState::new(config, shutdown_state);
        if let Err(e) = server::run_server(state).await {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    });
}

fn build_config(cli: Cli) -> Result<AppConfig, String> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::home_dir().ok_or_else(|| {
            "Could not determine a home directory; pass --data-dir explicitly".to_string()
        })?,
    };

    let providers = match cli.providers.as_deref() {
        Some(ids) => parse_provider_chain(ids)?,
        None => default_provider_chain(),
    };

    let cors_origins = cli.cors_origins.map(|origins| {
        origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    let config = AppConfig {
        port: cli.port,
        bind_address: cli.bind,
        data_dir,
        cors_origins,
        providers,
        ..AppConfig::default()
    };
    config.validate()?;
    Ok(config)
}
