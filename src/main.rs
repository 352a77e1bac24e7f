use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use storefront_gateway::{
    adapters::{AppState, ClientIpResolver, HttpClientAdapter, HttpHandler, build_router},
    config::{GatewayConfig, GatewayConfigValidator, loader::load_config},
    core::GatewayService,
    metrics,
    ports::http_client::HttpClient,
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config: GatewayConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    GatewayConfigValidator::validate(&config).context("Invalid configuration")?;

    let metrics_handle = if config.metrics.enabled {
        Some(metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?)
    } else {
        tracing::info!("Metrics disabled by configuration");
        None
    };

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);
    let gateway_service = Arc::new(
        GatewayService::new(&config, http_client).context("Failed to build gateway pipeline")?,
    );

    let client_ip = ClientIpResolver::new(config.proxy.trust_forwarded_headers);
    let state = AppState {
        handler: Arc::new(HttpHandler::new(gateway_service, client_ip)),
        metrics: metrics_handle,
    };
    let app = build_router(state, &config.cors, client_ip).context("Failed to build router")?;

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let shutdown = Arc::new(GracefulShutdown::new(Duration::from_secs(
        config.shutdown_timeout_secs,
    )));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.run_signal_handler().await });
    }

    tracing::info!(
        listen_addr = %addr,
        routes = config.routes.len(),
        "Gateway listening"
    );

    let stop_accepting = {
        let shutdown = shutdown.clone();
        async move {
            let reason = shutdown.wait().await;
            tracing::info!(?reason, "No longer accepting connections");
        }
    };
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(stop_accepting);

    shutdown.drain(server.into_future()).await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    tracing_setup::init_console_tracing()?;

    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        println!("ℹ️  '{config_path}' not found, validating defaults and environment only");
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = GatewayConfigValidator::validate(&config) {
        eprintln!("❌ Configuration validation failed:");
        eprintln!("{e}");
        println!();
        println!("💡 Common fixes:");
        println!("   • Set auth.jwt_secret (or GATEWAY__AUTH__JWT_SECRET)");
        println!("   • Make every route's service name a key of [services]");
        println!("   • Verify listen address format (e.g., '0.0.0.0:8080')");
        std::process::exit(1);
    }

    // Building the pipeline catches what field checks cannot, e.g. overlapping patterns.
    let http_client: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new()?);
    if let Err(e) = GatewayService::new(&config, http_client) {
        eprintln!("❌ Route table rejected:");
        eprintln!("   {e:#}");
        std::process::exit(1);
    }

    println!("✅ Configuration validation: OK");
    println!();
    println!("📋 Configuration Summary:");
    println!("   • Listen Address: {}", config.listen_addr);
    println!("   • Services: {}", config.services.len());
    println!("   • Routes: {}", config.routes.len());
    println!("   • Proxy Timeout: {}s", config.proxy.timeout_secs);
    println!("   • Metrics: {}", config.metrics.enabled);
    println!();
    println!("🎉 Configuration is valid and ready to use!");
    Ok(())
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Storefront gateway configuration
#
# Every key can be overridden from the environment, e.g.
#   GATEWAY__AUTH__JWT_SECRET=... GATEWAY__PROXY__TIMEOUT_SECS=5

listen_addr = "0.0.0.0:8080"
shutdown_timeout_secs = 10

[auth]
# Required. Tokens are HMAC-signed with this secret.
jwt_secret = "change-me"
allowed_algorithms = ["HS256"]

[proxy]
timeout_secs = 15
# Only enable behind a proxy that overwrites X-Forwarded-For / X-Real-IP.
trust_forwarded_headers = false

[logging]
level = "info"
json = true

[metrics]
enabled = true

[cors]
allowed_origins = ["*"]
# Credentials are only sent for an explicit origin list, never for "*".
allow_credentials = false
max_age_secs = 86400

# Backend services. Omitted services keep their defaults
# (catalog:8081, order:8082, cart:8083, user:8084, payment:8085,
#  inventory:8086, notification:8087).
[services.catalog]
host = "localhost"
port = 8081

# Declaring any [[routes]] replaces the built-in storefront route table.
# [[routes]]
# method = "GET"
# path = "/catalog/products/:id"
# service = "catalog"
# upstream_path = "/products/:id"
# access = "public"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'storefront-gateway serve --config {config_path}' to start the server");
    Ok(())
}
