use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input, Password};
use std::io::Write;

/// Fortnox Connect - OAuth2 bridge and API proxy for Fortnox
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// OAuth2 client id
    #[arg(long, env = "FORTNOX_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(long, env = "FORTNOX_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Redirect URI registered for the client
    #[arg(long, env = "FORTNOX_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Authorization endpoint the browser is sent to
    #[arg(long, env = "FORTNOX_AUTH_ENDPOINT")]
    pub auth_endpoint: Option<String>,

    /// Token endpoint for code exchange and refresh
    #[arg(long, env = "FORTNOX_TOKEN_ENDPOINT")]
    pub token_endpoint: Option<String>,

    /// Base URL of the resource API
    #[arg(long, env = "FORTNOX_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Space-separated scopes to request
    #[arg(long, env = "FORTNOX_SCOPES", default_value = "")]
    pub scopes: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Idle lifetime of a browser session in seconds
    #[arg(long, env = "SESSION_IDLE_TTL", default_value = "86400")]
    pub session_idle_ttl: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // OAuth2 client identity
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,

    // Provider endpoints
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub api_base_url: String,
    pub scopes: String,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Sessions
    pub session_idle_ttl: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

fn required(value: Option<String>, name: &str, flag: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{} is required (use --{} or set {} env var)", name, flag, name))
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        Ok(Config {
            server_host: args.host,
            server_port: args.port,

            client_id: required(args.client_id, "FORTNOX_CLIENT_ID", "client-id")?,
            client_secret: required(args.client_secret, "FORTNOX_CLIENT_SECRET", "client-secret")?,
            redirect_uri: required(args.redirect_uri, "FORTNOX_REDIRECT_URI", "redirect-uri")?,

            auth_endpoint: required(args.auth_endpoint, "FORTNOX_AUTH_ENDPOINT", "auth-endpoint")?,
            token_endpoint: required(
                args.token_endpoint,
                "FORTNOX_TOKEN_ENDPOINT",
                "token-endpoint",
            )?,
            api_base_url: required(args.api_base_url, "FORTNOX_API_BASE_URL", "api-base-url")?,
            scopes: args.scopes.trim().to_string(),

            http_connect_timeout: args.connect_timeout,
            http_request_timeout: args.http_timeout,

            session_idle_ttl: args.session_idle_ttl,

            log_level: args.log_level,
            log_format: parse_log_format(&args.log_format),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("FORTNOX_REDIRECT_URI", self.redirect_uri.as_str()),
            ("FORTNOX_AUTH_ENDPOINT", self.auth_endpoint.as_str()),
            ("FORTNOX_TOKEN_ENDPOINT", self.token_endpoint.as_str()),
            ("FORTNOX_API_BASE_URL", self.api_base_url.as_str()),
        ] {
            validate_http_url(name, value)?;
        }

        if self.http_connect_timeout == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        if self.session_idle_ttl == 0 {
            anyhow::bail!("SESSION_IDLE_TTL must be greater than zero");
        }

        Ok(())
    }
}

fn validate_http_url(name: &str, value: &str) -> Result<()> {
    let url = reqwest::Url::parse(value)
        .with_context(|| format!("{} is not a valid URL: {}", name, value))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("{} must be an http(s) URL: {}", name, value);
    }

    Ok(())
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}


// === Interactive Setup ===

/// Default provider endpoints offered during interactive setup
const DEFAULT_AUTH_ENDPOINT: &str = "https://apps.fortnox.se/oauth-v1/auth";
const DEFAULT_TOKEN_ENDPOINT: &str = "https://apps.fortnox.se/oauth-v1/token";
const DEFAULT_API_BASE_URL: &str = "https://api.fortnox.se/3";

/// Check if interactive setup is needed (no .env file and missing required values)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();

    let has_client_id = std::env::var("FORTNOX_CLIENT_ID").is_ok();
    let has_client_secret = std::env::var("FORTNOX_CLIENT_SECRET").is_ok();

    !env_file_exists && (!has_client_id || !has_client_secret)
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub api_base_url: String,
    pub scopes: String,
}

impl InteractiveConfig {
    /// Environment variables `Config::load` picks up
    pub fn env_vars(&self) -> [(&'static str, &str); 7] {
        [
            ("FORTNOX_CLIENT_ID", self.client_id.as_str()),
            ("FORTNOX_CLIENT_SECRET", self.client_secret.as_str()),
            ("FORTNOX_REDIRECT_URI", self.redirect_uri.as_str()),
            ("FORTNOX_AUTH_ENDPOINT", self.auth_endpoint.as_str()),
            ("FORTNOX_TOKEN_ENDPOINT", self.token_endpoint.as_str()),
            ("FORTNOX_API_BASE_URL", self.api_base_url.as_str()),
            ("FORTNOX_SCOPES", self.scopes.as_str()),
        ]
    }
}

fn prompt_with_default(prompt: &str, default: &str) -> Result<String> {
    Input::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()
        .with_context(|| format!("Failed to read {}", prompt))
}

/// Run interactive setup to collect required configuration
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("Fortnox Connect - First Time Setup");
    println!();
    println!("No configuration found. Enter the credentials of your Fortnox app.");
    println!();

    let client_id: String = Input::new()
        .with_prompt("Client id (FORTNOX_CLIENT_ID)")
        .interact_text()
        .context("Failed to read FORTNOX_CLIENT_ID")?;

    let client_secret: String = Password::new()
        .with_prompt("Client secret (FORTNOX_CLIENT_SECRET)")
        .interact()
        .context("Failed to read FORTNOX_CLIENT_SECRET")?;

    if client_id.trim().is_empty() || client_secret.is_empty() {
        anyhow::bail!("Client id and client secret cannot be empty");
    }

    let config = InteractiveConfig {
        client_id,
        client_secret,
        redirect_uri: prompt_with_default(
            "Redirect URI (FORTNOX_REDIRECT_URI)",
            "http://localhost:8000/auth/callback",
        )?,
        auth_endpoint: prompt_with_default(
            "Authorization endpoint (FORTNOX_AUTH_ENDPOINT)",
            DEFAULT_AUTH_ENDPOINT,
        )?,
        token_endpoint: prompt_with_default(
            "Token endpoint (FORTNOX_TOKEN_ENDPOINT)",
            DEFAULT_TOKEN_ENDPOINT,
        )?,
        api_base_url: prompt_with_default(
            "API base URL (FORTNOX_API_BASE_URL)",
            DEFAULT_API_BASE_URL,
        )?,
        scopes: prompt_with_default(
            "Scopes (FORTNOX_SCOPES)",
            "companyinformation customer invoice",
        )?,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!();
        println!("✅ Configuration saved to .env file");
    }

    println!();
    println!("✅ Setup complete! Starting server...");
    println!();

    Ok(config)
}

/// Quote a value so dotenvy reads it back verbatim
///
/// Single quotes are literal in dotenvy, but its line reader still treats a
/// backslash as an escape there. Values containing a single quote, backslash
/// or newline use double quotes with `\\`, `"`, `$` and newlines escaped.
fn quote_env_value(value: &str) -> String {
    if !value.contains(|c: char| c == '\'' || c == '\\' || c == '\n') {
        return format!("'{}'", value);
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '$' => quoted.push_str("\\$"),
            '\n' => quoted.push_str("\\n"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Render the .env file contents
fn render_env_file(config: &InteractiveConfig) -> String {
    let mut rendered = String::from(
        "# Fortnox Connect Configuration\n# Generated by interactive setup\n\n# OAuth2 client and provider endpoints (required)\n",
    );
    for (name, value) in config.env_vars() {
        rendered.push_str(&format!("{}={}\n", name, quote_env_value(value)));
    }
    rendered.push_str(
        "\n# Server settings\nSERVER_HOST=0.0.0.0\nSERVER_PORT=8000\n\n# Logging (trace, debug, info, warn, error)\nLOG_LEVEL=info\n",
    );
    rendered
}

/// Save configuration to .env file, readable only by the owner on unix
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(".env").context("Failed to create .env file")?;
    file.write_all(render_env_file(config).as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}
