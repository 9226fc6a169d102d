use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use signing_gateway::{GatewayConfig, run};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
struct Args {
    #[clap(long, env = "GATEWAY_HOST", default_value = "127.0.0.1")]
    host: String,
    #[clap(long, env = "GATEWAY_PORT", default_value = "3000")]
    port: u16,

    /// Remote endpoint every request is forwarded to.
    #[clap(long, env = "GATEWAY_REMOTE_URL")]
    remote_url: String,
    #[clap(long, env = "GATEWAY_BEARER_TOKEN", hide_env_values = true)]
    bearer_token: String,
    /// PEM file holding the RSA signing key (PKCS#1 or PKCS#8).
    #[clap(long, env = "GATEWAY_PRIVATE_KEY_PATH")]
    private_key_path: PathBuf,
    /// PEM public key, checked against the private key whenever it is loaded.
    #[clap(long, env = "GATEWAY_PUBLIC_KEY_PATH")]
    public_key_path: Option<PathBuf>,
    /// Load the private key once at startup instead of per request.
    #[clap(long, env = "GATEWAY_PRELOAD_KEY")]
    preload_key: bool,

    #[clap(long, env = "GATEWAY_CONNECT_TIMEOUT", default_value = "3")]
    connect_timeout_secs: u64,
    #[clap(long, env = "GATEWAY_REQUEST_TIMEOUT", default_value = "8")]
    request_timeout_secs: u64,

    /// Emit logs as JSON lines.
    #[clap(long, env = "GATEWAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn gateway_config(&self) -> Result<GatewayConfig> {
        let mut config = GatewayConfig::new(
            &self.remote_url,
            self.bearer_token.clone(),
            self.private_key_path.clone(),
        )?
        .with_preloaded_key(self.preload_key)
        .with_timeouts(
            Duration::from_secs(self.connect_timeout_secs),
            Duration::from_secs(self.request_timeout_secs),
        );
        if let Some(path) = &self.public_key_path {
            config = config.with_public_key_path(path);
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signing_gateway=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = args.gateway_config()?;
    tracing::info!(?config, "starting signing gateway");

    run(args.host, args.port, config).await
}
