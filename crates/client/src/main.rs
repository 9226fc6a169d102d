use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use signing_gateway::{
    GatewayRequest, MessageSigner, RsaSha256Signer, Signature, build_canonical_message,
    load_private_key, load_public_key, verify,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a request through a running gateway and print its reply.
    Send {
        #[clap(long, env = "GATEWAY_URL", default_value = "http://127.0.0.1:3000")]
        gateway: String,
        /// Use the unsigned GET route instead of POST.
        #[clap(long)]
        get: bool,
        /// JSON body to post; an absent body is sent empty.
        #[clap(long)]
        body: Option<PathBuf>,
        #[clap(long)]
        request_id: Option<String>,
    },
    /// Print the canonical form of a body and its signature.
    Sign {
        #[clap(long, env = "GATEWAY_PRIVATE_KEY_PATH")]
        private_key: PathBuf,
        #[clap(long)]
        body: Option<PathBuf>,
    },
    /// Check a DigitalSignature value against the canonical form of a body.
    Verify {
        #[clap(long, env = "GATEWAY_PUBLIC_KEY_PATH")]
        public_key: PathBuf,
        #[clap(long)]
        signature: String,
        #[clap(long)]
        body: Option<PathBuf>,
    },
}

fn read_body(path: Option<&PathBuf>) -> Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display())),
        None => Ok(Vec::new()),
    }
}

fn canonical(body: &[u8]) -> Result<signing_gateway::CanonicalMessage> {
    let request = GatewayRequest::parse(body)?;
    Ok(build_canonical_message(&request)?)
}

async fn send(gateway: &str, get: bool, body: Vec<u8>, request_id: Option<String>) -> Result<()> {
    let gateway = gateway.trim_end_matches('/');
    let client = reqwest::Client::new();
    let request = if get {
        client.get(format!("{gateway}/v1get"))
    } else {
        client.post(format!("{gateway}/v1post")).body(body)
    };
    let request = match request_id {
        Some(id) => request.header("X-Request-Id", id),
        None => request,
    };

    let response = request.send().await.context("calling gateway")?;
    let status = response.status();
    let reply: serde_json::Value = response.json().await.context("decoding gateway reply")?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    if !status.is_success() {
        bail!("gateway answered {status}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Send { gateway, get, body, request_id } => {
            let body = read_body(body.as_ref())?;
            send(&gateway, get, body, request_id).await
        }
        Command::Sign { private_key, body } => {
            let key = load_private_key(&private_key).context("loading private key")?;
            let message = canonical(&read_body(body.as_ref())?)?;
            let signature = RsaSha256Signer
                .sign(message.as_bytes(), &key)
                .context("signing canonical message")?;
            tracing::debug!(layout = ?key.layout(), digest = %message.digest_hex(), "signed");
            println!("{}", String::from_utf8_lossy(message.as_bytes()));
            println!("{signature}");
            Ok(())
        }
        Command::Verify { public_key, signature, body } => {
            let key = load_public_key(&public_key).context("loading public key")?;
            let message = canonical(&read_body(body.as_ref())?)?;
            verify(message.as_bytes(), &Signature::from(signature), &key)
                .context("verifying signature")?;
            println!("signature OK");
            Ok(())
        }
    }
}
