//! Weather Agent - command-line entry point.
//!
//! Runs the weather assistant interactively, through the demo script, or
//! generates an API key for the tool session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weather_agent::{
    auth,
    client::WeatherAgent,
    config::{Config, ConfigError},
    llm,
    tools::{OpenWeatherClient, WeatherToolSession},
};

const DEMO_PAUSE: Duration = Duration::from_secs(1);

/// Weather assistant - ask a language model about the weather.
#[derive(Parser, Debug)]
#[command(name = "weather-agent", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run the three built-in demo queries instead of reading from stdin.
    #[arg(long)]
    demo: bool,

    /// Load settings from this file instead of `./.env`.
    #[arg(long, global = true, env = "WEATHER_AGENT_ENV_FILE")]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a random API key for MCP_SERVER_API_KEYS.
    GenerateKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the conversation.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Some(Commands::GenerateKey) = cli.command {
        print_generated_key();
        return Ok(());
    }

    let config = match load_config(cli.env_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            print_setup_help(&e);
            std::process::exit(1);
        }
    };
    info!(
        provider = %config.backend.kind,
        model = config.backend.model.as_deref().unwrap_or("default"),
        auth_enabled = config.auth.is_enabled(),
        "Loaded configuration"
    );

    let session = WeatherToolSession::new(
        OpenWeatherClient::new(config.weather.api_key.clone(), config.weather.base_url.as_deref())?,
        Arc::new(config.auth.clone()),
        config.client_api_key.clone(),
    );
    let backend = llm::create_backend(&config.backend)?;
    let agent = WeatherAgent::connect(backend, Box::new(session)).await?;

    let mut stdout = tokio::io::stdout();
    if cli.demo {
        agent.run_demo(&mut stdout, DEMO_PAUSE).await?;
    } else {
        agent
            .run_interactive(BufReader::new(tokio::io::stdin()), &mut stdout)
            .await?;
    }

    Ok(())
}

fn load_config(env_file: Option<&std::path::Path>) -> Result<Config, ConfigError> {
    match env_file {
        Some(path) => Config::from_env_file(path),
        None => {
            // A missing ./.env is fine; everything can come from the environment.
            dotenvy::dotenv().ok();
            Config::from_env()
        }
    }
}

fn print_generated_key() {
    let key = auth::generate_key();
    println!("Generated API key:\n\n  {}\n", key);
    println!("Add it to the accepted keys (comma-separated for several):");
    println!("  MCP_SERVER_API_KEYS={}", key);
    println!("and present it from the client:");
    println!("  MCP_CLIENT_API_KEY={}", key);
}

fn print_setup_help(error: &ConfigError) {
    eprintln!("Configuration error: {}\n", error);
    eprintln!("Set the following in the environment or a .env file:");
    eprintln!("  AI_PROVIDER=gemini|anthropic|openrouter   (default: gemini)");
    eprintln!("  GEMINI_API_KEY / ANTHROPIC_API_KEY / OPENROUTER_API_KEY");
    eprintln!("  OPENWEATHER_API_KEY   (https://openweathermap.org/api)");
    eprintln!("Optional:");
    eprintln!("  AI_MODEL, AI_BASE_URL, OPENWEATHER_BASE_URL");
    eprintln!("  MCP_SERVER_API_KEYS, MCP_CLIENT_API_KEY   (see `weather-agent generate-key`)");
}
