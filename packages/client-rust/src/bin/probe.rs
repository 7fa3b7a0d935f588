//! wirebind-probe: declare a single endpoint on the command line and call it.
//!
//! # Usage
//!
//! ```text
//! wirebind-probe --host https://api.example.com --path /items/42 \
//!     --query api-version=2024-01-01 --header x-trace:abc
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use http::Method;
use tracing::info;
use wirebind_client::{
    ClientConfig, HttpTransport, InvocationContext, ReqwestTransport, RestClient, ScriptedResponse,
    ScriptedTransport,
};
use wirebind_core::{Arg, BodyType, Decoded, InterfaceMetadata, OperationMetadata, ReturnType};

#[derive(Parser, Debug)]
#[command(name = "wirebind-probe", about = "Call one REST endpoint through wirebind")]
struct Cli {
    /// Host, with or without scheme.
    #[arg(long, env = "WIREBIND_HOST")]
    host: String,

    /// Request path, appended to the host.
    #[arg(long, default_value = "/")]
    path: String,

    #[arg(long, default_value = "GET")]
    method: Method,

    /// Query parameter as `name=value`; repeatable.
    #[arg(long = "query", value_parser = parse_pair::<'='>)]
    queries: Vec<(String, String)>,

    /// Header as `name:value`; repeatable.
    #[arg(long = "header", value_parser = parse_pair::<':'>)]
    headers: Vec<(String, String)>,

    /// JSON request body.
    #[arg(long)]
    body: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "WIREBIND_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// JSON `ClientConfig` file.
    #[arg(long, env = "WIREBIND_CONFIG")]
    config: Option<PathBuf>,

    /// Use the blocking executor.
    #[arg(long)]
    blocking: bool,

    /// Print the assembled request instead of sending it.
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "WIREBIND_JSON_LOGS")]
    json_logs: bool,
}

fn parse_pair<const SEP: char>(raw: &str) -> Result<(String, String), String> {
    raw.split_once(SEP)
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .ok_or_else(|| format!("expected `name{SEP}value`, got `{raw}`"))
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,wirebind_client=debug,wirebind_core=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Declares the probed endpoint: argument 0 is the host, then one argument
/// per query parameter, one per header, and finally the body.
fn probe_interface(cli: &Cli) -> anyhow::Result<(InterfaceMetadata, Vec<Arg>)> {
    let mut op = OperationMetadata::new("probe")
        .verb(cli.method.clone(), &cli.path)
        .host_param("host", 0)
        .returns(ReturnType::Body(if cli.method == Method::HEAD {
            BodyType::Bool
        } else {
            BodyType::Bytes
        }));
    let mut args: Vec<Arg> = vec![cli.host.clone().into()];

    for (name, value) in &cli.queries {
        op = op.query_param(name, args.len());
        args.push(value.clone().into());
    }
    for (name, value) in &cli.headers {
        op = op.header_param(name, args.len());
        args.push(value.clone().into());
    }
    if let Some(body) = &cli.body {
        op = op.body_param(args.len(), Some("application/json"));
        let value: serde_json::Value = serde_json::from_str(body).context("--body is not valid JSON")?;
        args.push(Arg::Json(value));
    }
    Ok((InterfaceMetadata::new("Probe", "{host}").operation(op), args))
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let Some(path) = &cli.config else {
        return Ok(ClientConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn render(decoded: &Decoded) -> String {
    match decoded {
        Decoded::None => "(no content)".to_owned(),
        Decoded::Bool(exists) => exists.to_string(),
        Decoded::Bytes(bytes) => match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        other => format!("({} response)", other.kind()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(&cli)?;
    let scripted = Arc::new(ScriptedTransport::new([ScriptedResponse::new(204)]));
    let transport: Arc<dyn HttpTransport> = if cli.dry_run {
        Arc::clone(&scripted) as Arc<dyn HttpTransport>
    } else {
        Arc::new(ReqwestTransport::new(cli.timeout_secs.map(Duration::from_secs))?)
    };
    let client = RestClient::builder(transport).config(config).build();

    let (interface, args) = probe_interface(&cli)?;
    let ctx = InvocationContext::new();
    info!(request_id = %ctx.request_id, method = %cli.method, host = %cli.host, path = %cli.path, "probing");

    // The blocking client owns a runtime of its own and must also be dropped
    // off the async workers, so the client moves into the blocking task.
    let decoded = if cli.blocking {
        tokio::task::spawn_blocking(move || client.invoke_blocking(&interface, "probe", args, &ctx))
            .await??
    } else {
        client.invoke(&interface, "probe", args, ctx).await?
    };

    if cli.dry_run {
        for request in scripted.requests() {
            println!("{} {}", request.method, request.url);
            for (name, value) in &request.headers {
                println!("{name}: {}", value.to_str().unwrap_or("<binary>"));
            }
            if !request.body.is_empty() {
                println!("\n{}", String::from_utf8_lossy(&request.body));
            }
        }
    } else {
        println!("{}", render(&decoded));
    }
    Ok(())
}
