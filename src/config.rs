use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base URL of the upstream data service, e.g. `https://paleobiodb.org`.
    pub dataservice_url: String,
    /// Endpoint that receives DOI requests. DOI dispatch is disabled when
    /// unset.
    pub doi_request_url: Option<String>,
    /// Upper bound on a single upstream transfer, in seconds.
    pub fetch_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "PBDB data archive API")]
pub struct Args {
    /// Host to bind to (overrides ARCHIVER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ARCHIVER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where archives are stored (overrides ARCHIVER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides ARCHIVER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Upstream data service base URL (overrides ARCHIVER_DATASERVICE_URL)
    #[arg(long)]
    pub dataservice_url: Option<String>,

    /// DOI request endpoint (overrides ARCHIVER_DOI_REQUEST_URL)
    #[arg(long)]
    pub doi_request_url: Option<String>,

    /// Fetch timeout in seconds (overrides ARCHIVER_FETCH_TIMEOUT_SECS)
    #[arg(long)]
    pub fetch_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("ARCHIVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("ARCHIVER_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ARCHIVER_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading ARCHIVER_PORT"),
        };
        let env_storage =
            env::var("ARCHIVER_STORAGE_DIR").unwrap_or_else(|_| "./data/archives".into());
        let env_db = env::var("ARCHIVER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/archiver.db".into());
        let env_dataservice =
            env::var("ARCHIVER_DATASERVICE_URL").unwrap_or_else(|_| "https://paleobiodb.org".into());
        let env_doi = env::var("ARCHIVER_DOI_REQUEST_URL").ok();
        let env_timeout = match env::var("ARCHIVER_FETCH_TIMEOUT_SECS") {
            Ok(value) => Some(
                value
                    .parse::<u64>()
                    .with_context(|| format!("parsing ARCHIVER_FETCH_TIMEOUT_SECS value `{}`", value))?,
            ),
            Err(env::VarError::NotPresent) => None,
            Err(err) => return Err(err).context("reading ARCHIVER_FETCH_TIMEOUT_SECS"),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            dataservice_url: args.dataservice_url.unwrap_or(env_dataservice),
            doi_request_url: args.doi_request_url.or(env_doi),
            fetch_timeout_secs: args.fetch_timeout_secs.or(env_timeout).unwrap_or(300),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
