//! Purpose: `jig` CLI entry point for issuing batched calls against an API endpoint.
//! Role: Binary crate root; parses args, runs one batch, prints responses as JSON lines.
//! Invariants: Responses print on stdout in issue order, one JSON object per line.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jigdata::api::{ApiCall, ApiResponse, Error, ErrorKind, RequestOptions, to_exit_code};
use jigdata::{ApiConfig, ApiContext, Completion};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jig", version, about = "Issue batched calls against a jig API endpoint")]
struct Cli {
    /// JSON config file (camelCase keys, see `ApiConfig`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Base URL the endpoint resolves against, e.g. http://localhost:8080.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
    /// Endpoint path or absolute URL (default: /api).
    #[arg(long, value_name = "PATH")]
    endpoint: Option<String>,
    /// Parameter merged into every request.
    #[arg(long = "common", value_name = "KEY=JSON")]
    common: Vec<String>,
    #[arg(long, value_name = "MS")]
    debug_delay_ms: Option<u64>,
    /// How long to wait for each response.
    #[arg(long, value_name = "MS", default_value_t = 30_000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue one call.
    Call {
        module: String,
        action: String,
        #[arg(long = "arg", value_name = "KEY=JSON")]
        args: Vec<String>,
        #[arg(long)]
        ignore_exception: bool,
        /// Send the call as a bare object instead of a keyed batch.
        #[arg(long)]
        bare: bool,
    },
    /// Issue several argument-less calls in the same batch.
    Batch {
        #[arg(required = true, value_name = "MODULE.ACTION")]
        calls: Vec<String>,
    },
    /// Send a session keep-alive.
    Ping,
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })?;
    let timeout = Duration::from_millis(cli.timeout_ms);
    runtime.block_on(async move {
        let context = ApiContext::builder(config).build()?;
        let pending = issue(&context, cli.command)?;
        for completion in pending {
            let response = completion.wait_timeout(timeout).await?;
            print_response(&response);
        }
        Ok::<(), Error>(())
    })
}

fn build_config(cli: &Cli) -> Result<ApiConfig, Error> {
    let mut config = match &cli.config {
        Some(path) => ApiConfig::load(path)?,
        None => ApiConfig::default(),
    };
    // One-shot process: nothing to keep alive.
    config = config.with_ping_delay(None);
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.clone());
    }
    if let Some(endpoint) = &cli.endpoint {
        config = config.with_url(endpoint.clone());
    }
    if let Some(delay) = cli.debug_delay_ms {
        config = config.with_debug_delay(Duration::from_millis(delay));
    }
    for (key, value) in parse_pairs(&cli.common)? {
        config = config.with_common_param(key, value);
    }
    Ok(config)
}

fn issue(context: &ApiContext, command: Command) -> Result<Vec<Completion<ApiResponse>>, Error> {
    match command {
        Command::Call {
            module,
            action,
            args,
            ignore_exception,
            bare,
        } => {
            let call = ApiCall::new(module, action).with_args(parse_pairs(&args)?);
            let mut options = RequestOptions::new().on_transport_error(|raw, reply| {
                tracing::error!(status = reply.status, bytes = raw.len(), "unreadable API reply");
            });
            if ignore_exception {
                options = options.ignore_exception();
            }
            if bare {
                options = options.bare();
            }
            Ok(vec![context.request(call, options)])
        }
        Command::Batch { calls } => calls
            .iter()
            .map(|target| {
                let (module, action) = target.split_once('.').ok_or_else(|| {
                    Error::new(ErrorKind::Usage)
                        .with_message(format!("expected MODULE.ACTION, got {target:?}"))
                })?;
                Ok(context.request(ApiCall::new(module, action), RequestOptions::new()))
            })
            .collect(),
        Command::Ping => Ok(vec![context.api().ping()]),
    }
}

/// Parses `KEY=JSON` pairs; values that are not valid JSON are taken as strings.
fn parse_pairs(pairs: &[String]) -> Result<Map<String, Value>, Error> {
    let mut out = Map::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("expected KEY=JSON, got {pair:?}"))
                .with_hint("Quote string values or pass them bare: --arg name=roads")
        })?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

fn print_response(response: &ApiResponse) {
    let json = serde_json::to_string(&response.to_value())
        .unwrap_or_else(|_| "{\"status\":\"\"}".to_string());
    println!("{json}");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        match err.hint() {
            Some(hint) => eprintln!("error: {err}\nhint: {hint}"),
            None => eprintln!("error: {err}"),
        }
        return;
    }
    let value = json!({
        "error": {
            "kind": format!("{:?}", err.kind()),
            "message": err.to_string(),
            "hint": err.hint(),
        }
    });
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
