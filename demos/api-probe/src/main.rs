//! Tradeboard API probe
//!
//! Sends a single request through the full client pipeline (auth, refresh,
//! retry, normalization) and prints the outcome.
//!
//! Configuration comes from `TRADEBOARD_*` environment variables; tokens can
//! be passed as flags or through `TRADEBOARD_ACCESS_TOKEN` and
//! `TRADEBOARD_REFRESH_TOKEN`.
//!
//! Run with: cargo run -p tradeboard-api-probe -- get /portfolio

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tradeboard_client::interceptors::{ErrorAction, on_error, on_request};
use tradeboard_client::{
    ApiClient, ClientConfig, MemoryStore, Method, RequestBody, RequestOptions, TokenPair,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Verb> for Method {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Get => Method::Get,
            Verb::Post => Method::Post,
            Verb::Put => Method::Put,
            Verb::Patch => Method::Patch,
            Verb::Delete => Method::Delete,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tradeboard-api-probe")]
#[command(about = "Send one authenticated request to the Tradeboard API")]
struct Args {
    /// HTTP method
    #[arg(value_enum)]
    verb: Verb,

    /// Path relative to TRADEBOARD_API_URL, or an absolute URL
    path: String,

    /// JSON request body
    #[arg(long, short = 'd')]
    data: Option<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(long, short = 'q')]
    query: Vec<String>,

    /// Access token
    #[arg(long, env = "TRADEBOARD_ACCESS_TOKEN")]
    access_token: Option<String>,

    /// Refresh token
    #[arg(long, env = "TRADEBOARD_REFRESH_TOKEN")]
    refresh_token: Option<String>,

    /// Keep the session in the on-disk store instead of memory
    #[arg(long)]
    persist: bool,

    /// Send without credentials
    #[arg(long)]
    anonymous: bool,
}

fn parse_query(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("query parameter '{pair}' is not key=value"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::from_env()?;

    let mut builder = ApiClient::builder(config).on_auth_failure(|err| {
        eprintln!("{} {err}", style("session ended:").red().bold());
    });
    if !args.persist {
        builder = builder.storage(Arc::new(MemoryStore::new()));
    }
    let client = builder.build()?;

    if let Some(access) = &args.access_token {
        let refresh = args.refresh_token.clone().unwrap_or_default();
        client.login(&TokenPair::new(access.clone(), refresh))?;
    }

    client.add_request_interceptor(on_request(|config| async move {
        tracing::info!(method = %config.method, url = %config.url, "request");
        Ok(config)
    }));
    client.add_error_interceptor(on_error(|err, config| async move {
        tracing::info!(url = %config.url, kind = %err.kind, "request failed");
        ErrorAction::Propagate
    }));

    let body = args
        .data
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()?
        .map(RequestBody::Json);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let options = RequestOptions {
        method: args.verb.into(),
        query: parse_query(&args.query)?,
        body,
        skip_auth: args.anonymous,
        cancellation: Some(cancel),
        ..Default::default()
    };

    match client.request(&args.path, options).await {
        Ok(response) => {
            eprintln!("{} {}", style(response.status).green().bold(), args.path);
            println!("{}", serde_json::to_string_pretty(&response.data)?);
            Ok(())
        }
        Err(err) => {
            let status = err
                .status
                .map_or_else(|| "---".to_string(), |s| s.to_string());
            eprintln!("{} {} {}", style(status).red().bold(), style(err.kind).red(), err.message);
            if let Some(details) = &err.details {
                eprintln!("{}", serde_json::to_string_pretty(details)?);
            }
            std::process::exit(1);
        }
    }
}
