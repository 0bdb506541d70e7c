use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use embed_bridge::prelude::*;
use embed_bridge::{script, OutboundRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "embed-bridge")]
#[command(author, version, about = "Native to embedded-script RPC bridge tooling", long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bootstrap script (with polyfill) for a transport
    Script {
        /// Transport kind (direct_injection, message_router, post_message, unsupported)
        #[arg(short, long)]
        transport: Option<TransportKind>,

        /// Bridge global name
        #[arg(short, long)]
        namespace: Option<String>,

        /// Bridge configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a bridge configuration file
    Validate {
        /// Path to the configuration file
        config: PathBuf,
    },

    /// Run a raw envelope against the demo handlers and print the settlement
    Dispatch {
        /// Envelope JSON, e.g. {"method":"add","data":"{\"a\":1,\"b\":2}","callbackId":"cb_1"}
        envelope: String,

        /// Seconds to wait for the settlement
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "embed_bridge=debug"
    } else {
        "embed_bridge=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Script {
            transport,
            namespace,
            config,
        } => {
            let mut config = match config {
                Some(path) => BridgeConfig::load(&path)?,
                None => BridgeConfig::default(),
            };
            if let Some(namespace) = namespace {
                config.namespace = namespace;
            }
            if let Some(kind) = transport {
                if kind != config.transport.kind() {
                    config.transport = TransportConfig::for_kind(kind);
                }
            }
            config.validate()?;
            println!("{}", script::render_injection(&config)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate { config } => match BridgeConfig::load(&config) {
            Ok(loaded) => {
                println!(
                    "✓ {} is valid (namespace: {}, transport: {})",
                    config.display(),
                    loaded.namespace,
                    loaded.transport.kind()
                );
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                println!("✗ {}: {}", config.display(), e);
                Ok(ExitCode::FAILURE)
            }
        },

        Commands::Dispatch { envelope, timeout } => dispatch(&envelope, timeout).await,
    }
}

/// Evaluator that hands every script to a channel instead of a page
struct ChannelEvaluator {
    scripts: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl ScriptEvaluator for ChannelEvaluator {
    async fn evaluate(&self, script: &str) -> Result<(), SurfaceError> {
        self.scripts
            .send(script.to_string())
            .map_err(|_| SurfaceError::Detached)
    }
}

#[derive(Debug, Deserialize)]
struct AddInput {
    a: i64,
    b: i64,
}

#[derive(Debug, Serialize)]
struct Pong {
    ok: bool,
    version: &'static str,
}

fn register_demo_handlers(bridge: &NativeBridge) {
    bridge.register_sync("echo", |value: serde_json::Value| Ok(value));
    bridge.register_sync("add", |input: AddInput| Ok(input.a + input.b));
    bridge.register_sync_no_input("ping", || {
        Ok(Pong {
            ok: true,
            version: env!("CARGO_PKG_VERSION"),
        })
    });
}

async fn dispatch(envelope: &str, timeout: u64) -> anyhow::Result<ExitCode> {
    let config = BridgeConfig {
        expose_method_list: true,
        ..Default::default()
    };
    let bridge = NativeBridge::new(config)?;
    register_demo_handlers(&bridge);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = Arc::new(DirectInjectionTransport::new(Arc::new(ChannelEvaluator {
        scripts: tx,
    })));
    bridge.attach(transport.clone()).await?;

    let expects_reply = OutboundRequest::parse(envelope)
        .map(|request| request.expects_reply())
        .unwrap_or(true);
    transport.send_from_embedded(envelope)?;

    if !expects_reply {
        println!("(no callback id: fire-and-forget, nothing to settle)");
        bridge.dispose().await;
        return Ok(ExitCode::SUCCESS);
    }

    let settled = tokio::time::timeout(Duration::from_secs(timeout), rx.recv()).await;
    bridge.dispose().await;

    match settled {
        Ok(Some(script)) => {
            println!("{}", script);
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            eprintln!("No settlement within {}s", timeout);
            Ok(ExitCode::FAILURE)
        }
    }
}
