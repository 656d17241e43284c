use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use fortnox_connect::auth::TokenManager;
use fortnox_connect::config::{self, Config, LogFormat};
use fortnox_connect::http_client::{self, ApiClient};
use fortnox_connect::routes;
use fortnox_connect::session::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Check if interactive setup is needed (no .env and missing required values)
    if config::needs_interactive_setup() {
        let interactive_config = config::run_interactive_setup()?;

        // Set environment variables from interactive config so Config::load() can use them
        for (name, value) in interactive_config.env_vars() {
            std::env::set_var(name, value);
        }
    }

    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    init_logging(&config);

    tracing::info!("🚀 Fortnox Connect starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    // Shared HTTP transport for both the token endpoint and the resource API
    let transport =
        http_client::build_transport(config.http_connect_timeout, config.http_request_timeout)?;
    tracing::info!("✅ HTTP client initialized with connection pooling");

    let token_manager = Arc::new(
        TokenManager::new(
            transport.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.redirect_uri.clone(),
            config.token_endpoint.clone(),
        )
        .context("Failed to initialize token manager")?,
    );
    tracing::info!(
        "✅ Token manager initialized (client: {}, redirect: {})",
        token_manager.client_id(),
        token_manager.redirect_uri()
    );

    let api_client = Arc::new(
        ApiClient::new(transport, config.api_base_url.clone())
            .context("Failed to initialize API client")?,
    );
    tracing::info!("✅ API client initialized ({})", api_client.api_base_url());

    let app_state = routes::AppState {
        token_manager,
        api_client,
        sessions: SessionStore::new(Duration::from_secs(config.session_idle_ttl)),
        config: Arc::new(config.clone()),
    };

    // Build the application with routes and middleware
    let app = routes::build_app(app_state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Print startup banner
    print_startup_banner(&config);

    // Start server with graceful shutdown
    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Initialize logging with the configured level and format
fn init_logging(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                  🔐 Fortnox Connect                       ║
║                                                           ║
║  OAuth2 authorization bridge and API proxy for Fortnox    ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:      http://{}:{}",
        config.server_host, config.server_port
    );
    println!(
        "  Login:       http://{}:{}/auth/login",
        config.server_host, config.server_port
    );
    println!("  Redirect:    {}", config.redirect_uri);
    println!("  API:         {}", config.api_base_url);
    println!(
        "  Scopes:      {}",
        if config.scopes.is_empty() {
            "(none)"
        } else {
            config.scopes.as_str()
        }
    );
    println!("  Session TTL: {}s", config.session_idle_ttl);
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
