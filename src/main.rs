use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde_json::Value;
use std::time::Duration;
use taxrate::{
    AddressQuery, ClientConfig, CountryCode, GeoQuery, RetryOverrides, TaxRateClient,
    TaxRateError,
};

/// taxrate - sales tax rate lookup
///
/// Looks up sales tax rates by address or coordinates and prints the JSON
/// response. Transient failures (network errors, 5xx responses) are retried
/// with exponential backoff.
///
/// Examples:
///   taxrate address "200 Spectrum Center Dr, Irvine, CA 92618"
///   taxrate geo --lat 33.65 --lng -117.74
///   taxrate metrics
#[derive(Parser, Debug)]
#[command(author, version = env!("TAXRATE_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API key (also via TAXRATE_API_KEY)
    #[arg(long, env = "TAXRATE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Service base URL (also via TAXRATE_BASE_URL)
    #[arg(long, env = "TAXRATE_BASE_URL", value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Maximum attempts per request, including the first
    #[arg(long, value_name = "N", global = true)]
    max_attempts: Option<u32>,

    /// Delay after the first failed attempt
    #[arg(long, value_name = "MS", global = true)]
    initial_delay_ms: Option<u64>,

    /// Upper bound for a single backoff delay
    #[arg(long, value_name = "MS", global = true)]
    max_delay_ms: Option<u64>,

    /// Per-request timeout
    #[arg(long, value_name = "SECONDS", global = true)]
    timeout: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Look up rates for a street address
    Address(AddressArgs),

    /// Look up rates for a latitude/longitude pair
    Geo(GeoArgs),

    /// Show account usage metrics
    Metrics,
}

#[derive(clap::Args, Debug)]
struct AddressArgs {
    #[arg(value_name = "ADDRESS")]
    address: String,

    #[arg(long)]
    taxability_code: Option<String>,

    /// USA or CAN
    #[arg(long)]
    country: Option<CountryCode>,

    /// Historical period, YYYYMM
    #[arg(long, value_name = "YYYYMM")]
    historical: Option<String>,
}

#[derive(clap::Args, Debug)]
struct GeoArgs {
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    lng: f64,

    /// USA or CAN
    #[arg(long)]
    country: Option<CountryCode>,

    /// Historical period, YYYYMM
    #[arg(long, value_name = "YYYYMM")]
    historical: Option<String>,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let api_key = self
            .api_key
            .clone()
            .context("API key is required: pass --api-key or set TAXRATE_API_KEY")?;

        let mut config = ClientConfig::new(api_key)
            .with_retry(RetryOverrides {
                max_attempts: self.max_attempts,
                initial_delay: self.initial_delay_ms.map(Duration::from_millis),
                max_delay: self.max_delay_ms.map(Duration::from_millis),
                ..Default::default()
            })
            .with_logging(log::log_enabled!(log::Level::Debug));

        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

async fn run(client: &TaxRateClient, command: Commands) -> taxrate::Result<Value> {
    match command {
        Commands::Address(args) => {
            let query = AddressQuery {
                address: args.address,
                taxability_code: args.taxability_code,
                country_code: args.country,
                historical: args.historical,
            };
            client.get_sales_tax_by_address(&query).await
        }
        Commands::Geo(args) => {
            let query = GeoQuery {
                lat: args.lat,
                lng: args.lng,
                country_code: args.country,
                historical: args.historical,
            };
            client.get_sales_tax_by_geolocation(&query).await
        }
        Commands::Metrics => client.get_account_metrics().await,
    }
}

/// User-facing message for a failed lookup.
fn describe_error(error: &TaxRateError) -> String {
    match error {
        TaxRateError::RateLimit {
            message,
            retry_after: Some(secs),
            ..
        } => format!("{} Try again in {} seconds.", message, secs),
        TaxRateError::RateLimit { message, .. } => format!("{} Try again later.", message),
        TaxRateError::Authentication {
            message,
            status_code,
            ..
        } => format!("{} (HTTP {})", message, status_code),
        TaxRateError::Api {
            message,
            status_code,
            ..
        } => format!("Request failed: {} (HTTP {})", message, status_code),
        other => other.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = cli.client_config()?;
    let client = TaxRateClient::new(config).map_err(|e| anyhow!(describe_error(&e)))?;

    let value = run(&client, cli.command)
        .await
        .map_err(|e| anyhow!(describe_error(&e)))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("Failed to format response")?
    );
    Ok(())
}
