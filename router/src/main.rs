use anyhow::{Context as _, Result};
use clap::Parser;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use completion_router::{
    rest::RestPipeline, webhook::WebhookHandler, DEFAULT_CHANNEL_NAME, DEFAULT_MODEL,
};

#[derive(Parser, Debug)]
#[clap(version, about = "Chat-completions webhook in front of a message-processing pipeline")]
struct Args {
    #[clap(short, long, env = "ROUTER_ADDRESS", default_value = "127.0.0.1:5005")]
    address: String,
    /// Endpoint the messages are forwarded to.
    #[clap(short, long, env = "PIPELINE_URL", default_value = "http://127.0.0.1:5055/webhook")]
    pipeline_url: String,
    #[clap(long, default_value = DEFAULT_CHANNEL_NAME)]
    channel_name: String,
    #[clap(long, default_value = DEFAULT_MODEL)]
    model: String,
    /// Give up on the pipeline after this many seconds and answer with what was collected.
    #[clap(long, env = "PIPELINE_TIMEOUT_SECS")]
    pipeline_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let args = Args::parse();
    tracing::info!("args: {:?}", &args);

    let shutdown = CancellationToken::new();
    let pipeline = Arc::new(RestPipeline::new(&args.pipeline_url));
    tracing::info!("Forwarding messages to {}", args.pipeline_url);

    let app = WebhookHandler::new(pipeline)
        .with_channel_name(args.channel_name)
        .with_model(args.model)
        .with_deadline(args.pipeline_timeout_secs.map(Duration::from_secs))
        .with_shutdown(shutdown.clone())
        .with_span(tracing::info_span!("chat_webhook", address = %args.address))
        .router();

    let listener = TcpListener::bind(&args.address)
        .await
        .with_context(|| format!("Failed to bind {}", args.address))?;
    tracing::info!("Listening on {}", &args.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;
    tracing::info!("Server shutdown");

    Ok(())
}

fn setup_logging() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()
        .context("Failed to parse env log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set global tracing subscriber")
}

/// Resolves on Ctrl-C or SIGTERM, cancelling in-flight pipeline calls first.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Error: {:?}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Error: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down, cancelling in-flight requests");
    shutdown.cancel();
}
