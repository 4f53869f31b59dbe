mod commands;

use anyhow::Result;
use arc_swap::ArcSwap;
use clap::{Parser, Subcommand};
use mailbridge_auth::{CredentialBridge, GrantManager, flow, make_provider};
use mailbridge_calendar::{CalendarClientFactory, GoogleCalendarFactory};
use mailbridge_config::{Config, ConfigWatcher, LogFormat};
use mailbridge_proxy::AppState;
use mailbridge_store::{InMemoryTokenStore, SqliteTokenStore};
use mailbridge_types::{SessionKey, TokenKind, TokenStore};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use commands::{AccountCmd, AiCmd, CalendarCmd, CampaignCmd, EmailCmd, NewsletterCmd, Session};

#[derive(Parser, Debug)]
#[command(
    name = "mailbridge",
    about = "mailbridge: session bridge and proxy for the mail backend",
    version
)]
struct Cli {
    /// Path to the YAML configuration file (default: environment only).
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// SQLite database path (default: ~/.mailbridge/tokens.db).
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,
    /// Local profile whose tokens the command uses.
    #[arg(long, default_value = "default", global = true)]
    profile: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proxy server.
    Serve {
        /// Override the listening port (default: 8020).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },
    /// Sign in and obtain a backend token for the profile.
    Login {
        /// Identity provider for the browser flow.
        #[arg(long, default_value = "google")]
        provider: String,
        /// Skip the browser and exchange this email directly.
        #[arg(long)]
        email: Option<String>,
        /// Display name sent with `--email`.
        #[arg(long, requires = "email")]
        name: Option<String>,
    },
    /// Remove every token stored for the profile.
    Logout,
    /// Show which tokens the profile holds.
    Status,
    /// Password accounts and service health.
    #[command(subcommand)]
    Account(AccountCmd),
    /// Send and manage email.
    #[command(subcommand)]
    Email(EmailCmd),
    /// Newsletters.
    #[command(subcommand)]
    Newsletter(NewsletterCmd),
    /// AI writing helpers.
    #[command(subcommand)]
    Ai(AiCmd),
    /// Outreach dashboard.
    Dashboard {
        /// Refresh every N seconds until interrupted.
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Outreach campaigns.
    #[command(subcommand)]
    Campaign(CampaignCmd),
    /// Google Calendar, using the profile's stored Google grant.
    #[command(subcommand)]
    Calendar(CalendarCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config);

    let key = SessionKey::new(cli.profile.clone());
    match cli.command {
        Commands::Serve { port, host } => cmd_serve(cli.config, config, port, host).await,
        Commands::Login {
            provider,
            email,
            name,
        } => cmd_login(config, cli.db, &key, &provider, email, name).await,
        Commands::Logout => cmd_logout(config, cli.db, &key).await,
        Commands::Status => cmd_status(cli.db, &key).await,
        Commands::Account(cmd) => commands::account(&session(config, cli.db, key).await?, cmd).await,
        Commands::Email(cmd) => commands::email(&session(config, cli.db, key).await?, cmd).await,
        Commands::Newsletter(cmd) => {
            commands::newsletter(&session(config, cli.db, key).await?, cmd).await
        }
        Commands::Ai(cmd) => commands::ai(&session(config, cli.db, key).await?, cmd).await,
        Commands::Dashboard { watch } => {
            commands::dashboard(&session(config, cli.db, key).await?, watch).await
        }
        Commands::Campaign(cmd) => {
            commands::campaign(&session(config, cli.db, key).await?, cmd).await
        }
        Commands::Calendar(cmd) => {
            commands::calendar(&session(config, cli.db, key).await?, cmd).await
        }
    }
}

async fn session(config: Config, db: Option<PathBuf>, key: SessionKey) -> Result<Session> {
    Ok(Session::new(config, Arc::new(open_store(db).await?), key))
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    config.map_err(|e| anyhow::anyhow!("config error: {e}"))
}

/// `RUST_LOG` wins over `log.level`. Logs go to stderr so command output
/// stays pipeable.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn cmd_serve(
    config_path: Option<PathBuf>,
    config: Config,
    port: Option<u16>,
    host: Option<String>,
) -> Result<()> {
    config
        .validate_for_serve()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let handle = if let Some(path) = config_path {
        let watcher = Arc::new(
            ConfigWatcher::new(path).map_err(|e| anyhow::anyhow!("config error: {e}"))?,
        );
        let handle = watcher.arc();
        watcher.watch();
        handle
    } else {
        Arc::new(ArcSwap::from_pointee(config))
    };

    let snapshot = handle.load_full();
    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| snapshot.host.clone()),
        port.unwrap_or(snapshot.port)
    );

    let http = reqwest::Client::new();
    // Browser sessions are short-lived; the proxy keeps their tokens in memory.
    let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
    let provider = make_provider(&handle, http.clone())?;
    let bridge = Arc::new(CredentialBridge::new(provider, Arc::clone(&store)));
    let grants = Arc::new(GrantManager::new(store, http.clone(), Arc::clone(&handle)));
    let calendars: Arc<dyn CalendarClientFactory> = Arc::new(GoogleCalendarFactory::new(
        http.clone(),
        snapshot.google.api_base.clone(),
    ));
    let state = AppState::new(handle, bridge, grants, calendars, http);
    let app = mailbridge_proxy::make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, provider = %snapshot.auth.provider, "mailbridge listening");
    eprintln!("mailbridge listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn cmd_login(
    config: Config,
    db: Option<PathBuf>,
    key: &SessionKey,
    provider: &str,
    email: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let store: Arc<dyn TokenStore> = Arc::new(open_store(db).await?);
    let http = reqwest::Client::new();
    let handle = Arc::new(ArcSwap::from_pointee(config));
    let bridge = CredentialBridge::new(make_provider(&handle, http.clone())?, store);

    let outcome = if let Some(email) = email {
        flow::login_with_email(&bridge, key, &email, name.as_deref()).await
    } else {
        match provider {
            "google" => flow::login_google(&handle.load(), &http, &bridge, key).await,
            other => anyhow::bail!("browser sign-in is only available for google, not '{other}'"),
        }
    }
    .map_err(|e| anyhow::anyhow!("login failed: {e}"))?;

    eprintln!(
        "signed in as {} ({})",
        outcome.identity.display_name_or_email(),
        outcome.identity.email
    );
    if outcome.backend_token.is_none() {
        eprintln!("warning: the backend did not issue a token; mail commands will be unauthenticated");
    }
    Ok(())
}

async fn cmd_logout(config: Config, db: Option<PathBuf>, key: &SessionKey) -> Result<()> {
    let store: Arc<dyn TokenStore> = Arc::new(open_store(db).await?);
    let handle = Arc::new(ArcSwap::from_pointee(config));
    let outcome = match make_provider(&handle, reqwest::Client::new()) {
        Ok(provider) => flow::logout(&CredentialBridge::new(provider, store), key).await,
        Err(e) => {
            tracing::warn!(error = %e, "no identity provider configured, clearing local tokens only");
            store.remove_session(key).await
        }
    };
    outcome.map_err(|e| anyhow::anyhow!("logout failed: {e}"))?;
    eprintln!("{key} logged out");
    Ok(())
}

async fn cmd_status(db: Option<PathBuf>, key: &SessionKey) -> Result<()> {
    let store = open_store(db).await?;
    for kind in TokenKind::all() {
        let status = match store.load(key, *kind).await? {
            Some(token) if token.is_expired() => "expired",
            Some(_) => "present",
            None => "absent",
        };
        println!("{key} {kind}: {status}");
    }
    let others: Vec<String> = store
        .list_sessions()
        .await?
        .into_iter()
        .filter(|s| s != key)
        .map(|s| s.to_string())
        .collect();
    if !others.is_empty() {
        println!("other profiles: {}", others.join(", "));
    }
    Ok(())
}

async fn open_store(db: Option<PathBuf>) -> Result<SqliteTokenStore> {
    let path = db.unwrap_or_else(default_db_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = format!("sqlite://{}", path.display());
    SqliteTokenStore::new(&url)
        .await
        .map_err(|e| anyhow::anyhow!("database error: {e}"))
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".mailbridge").join("tokens.db")
}
