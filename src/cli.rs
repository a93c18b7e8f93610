//! Command-line interface of the `taxodb` binary

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taxodb_core::{load_config, Config, TaxoResult};
use taxodb_server::{Client, Server};
use taxodb_storage::Database;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "taxodb",
    version,
    about = "Authoritative store for taxonomic and biogeographic records"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to $TAXODB_HOME/config.toml)
    #[arg(long, global = true, env = "TAXODB_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a data directory until closed or interrupted
    Serve(ServeArgs),

    /// Ask a running server to shut down
    Stop(StopArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    pub address: Option<String>,

    /// Directory holding the table files
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct StopArgs {
    /// Address of the server
    #[arg(long, value_name = "ADDR")]
    pub address: Option<String>,
}

/// The configuration at `path`, or the default location when absent
pub fn resolve_config(path: Option<&Path>) -> TaxoResult<Config> {
    match path {
        Some(path) => load_config(path),
        None => Config::load_or_default(),
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref()).context("Failed to load configuration")?;
    match cli.command {
        Commands::Serve(args) => serve(config, args).await,
        Commands::Stop(args) => stop(config, args).await,
    }
}

pub async fn serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(address) = args.address {
        config.server.address = address;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = Some(dir.to_string_lossy().into_owned());
    }
    taxodb_core::logging::init(&config.logging);

    let dir = config.storage.data_dir();
    let db = Arc::new(
        Database::open(&dir).with_context(|| format!("Failed to open {}", dir.display()))?,
    );
    let server = Server::bind(&config.server, Arc::clone(&db))
        .await
        .with_context(|| format!("Failed to listen on {}", config.server.address))?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    let files = tokio::task::spawn_blocking(move || db.commit())
        .await
        .context("Final commit task failed")??;
    info!(files, "final commit done");
    Ok(())
}

pub async fn stop(config: Config, args: StopArgs) -> Result<()> {
    taxodb_core::logging::init(&config.logging);
    let address = args.address.unwrap_or(config.server.address);
    Client::new(address.as_str())
        .close()
        .await
        .with_context(|| format!("Failed to stop server at {}", address))?;
    println!("{} server at {} stopped", "✓".green().bold(), address);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxodb_test::TestEnvironment;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from([
            "taxodb",
            "serve",
            "--address",
            "0.0.0.0:9000",
            "--data-dir",
            "/srv/taxodb",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.address.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(args.data_dir, Some(PathBuf::from("/srv/taxodb")));
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::try_parse_from(["taxodb", "stop", "--config", "/etc/taxodb.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/taxodb.toml")));
        assert!(matches!(cli.command, Commands::Stop(StopArgs { address: None })));
    }

    #[test]
    fn test_resolve_explicit_config() {
        let env = TestEnvironment::new().unwrap();
        let path = env
            .write_file("config.toml", "[server]\naddress = \"127.0.0.1:7000\"\n")
            .unwrap();
        let config = resolve_config(Some(path.as_path())).unwrap();
        assert_eq!(config.server.address, "127.0.0.1:7000");
        assert!(resolve_config(Some(env.root().join("missing.toml").as_path())).is_err());
    }

    #[tokio::test]
    async fn test_stop_closes_a_running_server() {
        let env = TestEnvironment::new().unwrap();
        let config = env.config();
        let db = Arc::new(env.open_database().unwrap());
        let server = Server::bind(&config.server, db).await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        let handle = tokio::spawn(server.run());

        stop(
            config,
            StopArgs {
                address: Some(address),
            },
        )
        .await
        .unwrap();
        handle.await.unwrap().unwrap();
    }
}
