use clap::Parser;
use cloudcode_proxy::{
    build_router, AppState, ModelRouter, ProxyConfig, SharedLogger, SignatureCache, UpstreamClient,
};
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "cloudcode-proxy",
    about = "Local API proxy bridging OpenAI/Anthropic IDE clients to Cloud Code",
    version
)]
struct Cli {
    /// Path to config file (KEY=VALUE format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Do not auto-open the dashboard in a browser
    #[arg(long)]
    no_browser: bool,

    /// Do not expect the tunnel helper
    #[arg(long)]
    no_ngrok: bool,

    /// Route unknown model names to the default model instead of failing
    #[arg(long)]
    fallback: bool,

    /// Log file path
    #[arg(long, default_value = "cloudcode-proxy.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.debug {
        config.debug = true;
    }
    if cli.fallback {
        config.fallback = true;
    }

    let default_filter = if config.debug {
        "cloudcode_proxy=debug,tower_http=debug"
    } else {
        "cloudcode_proxy=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let logger = SharedLogger::new(&cli.log_file)?;

    info!("cloudcode-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Port:          {}", config.port);
    info!("  Default model: {}", config.default_model);
    info!("  Upstream:      {}", config.upstream_base_url);
    info!("  Fallback:      {}", config.fallback);
    info!("  Wide context:  {}", config.wide_context);
    info!("  Log file:      {}", cli.log_file.display());

    if cli.no_browser {
        info!("Dashboard auto-open disabled");
    }
    if cli.no_ngrok || config.ngrok_auth_token.is_none() {
        info!("Tunnel helper disabled");
    } else {
        info!("Tunnel helper configured (managed externally)");
    }

    logger.info(
        "startup",
        format!(
            "Starting cloudcode-proxy port={} default_model={}",
            config.port, config.default_model
        ),
    );

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(20))
        .timeout(std::time::Duration::from_secs(600))
        .build()?;

    let models = ModelRouter::new(config.fallback, config.default_model.clone());
    models.set_wide_context(config.wide_context);

    let upstream = UpstreamClient::new(
        client,
        config.upstream_base_url.clone(),
        config.upstream_token.clone(),
    );

    let bind_addr = format!("127.0.0.1:{}", config.port);
    let state = Arc::new(AppState {
        config,
        models,
        signatures: Arc::new(SignatureCache::new()),
        upstream,
        logger,
        empty_retries: AtomicU64::new(0),
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  Anthropic clients: POST /v1/messages");
    info!("  OpenAI clients:    POST /v1/chat/completions");

    axum::serve(listener, app).await?;

    Ok(())
}
