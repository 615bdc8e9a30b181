use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the registry proxy
    Serve,
    /// Check proxy configuration for errors and unused options
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let settings = server::settings::Settings::new()?;
            server::run_server(settings).await
        }
        Commands::CheckConfig => {
            println!("Checking proxy configuration...");
            match server::settings::Settings::new() {
                Ok(settings) => {
                    println!("✓ Configuration is valid");
                    println!("  listen:       {}:{}", settings.server.host, settings.server.port);
                    println!("  secret store: {}", settings.secret_store.address);
                    println!("  default registry (bearer): {}", settings.auth.default_registry);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ Configuration error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
