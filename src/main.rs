//! notify-relay
//!
//! A personal desktop-notification relay: accepts HTTP requests on the
//! local network and turns them into native desktop notifications,
//! optionally waiting for the user's interaction before responding.

mod cache;
mod config;
mod credentials;
mod dispatch;
mod error;
mod handlers;
mod notif_log;
mod paths;
mod properties;
mod server;
mod update;
mod watch;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "notify-relay", about = "Personal desktop-notification relay")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "notify-relay.toml")]
    config: PathBuf,

    /// Data directory override
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Directory holding the dashboard's static files
    #[arg(short, long, default_value = "www")]
    www_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new admin login; the password is hashed before it is saved
    SetLogin { username: String, password: String },
    /// Delete the stored admin login
    DeleteLogin,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let data_dir = paths::DataDir::new(cli.data_dir.clone().unwrap_or_else(paths::default_data_dir));
    data_dir.ensure()?;

    let credentials = credentials::CredentialStore::new(data_dir.credentials_file());

    match &cli.command {
        Some(Command::SetLogin { username, password }) => {
            credentials.set_login(username, password)?;
            println!("Login data saved to {}", data_dir.credentials_file().display());
            return Ok(());
        }
        Some(Command::DeleteLogin) => {
            credentials.delete_login()?;
            println!("Login data deleted");
            return Ok(());
        }
        None => {}
    }

    tracing::info!("Starting up notify-relay v{}", env!("CARGO_PKG_VERSION"));

    let config = config::SharedConfig::load_or_default(&cli.config)?;
    let _config_watch = config.spawn_watch();

    let properties = properties::PropertyStore::new(data_dir.properties_file());
    properties.init(env!("CARGO_PKG_VERSION")).await?;
    properties
        .set("version", serde_json::Value::from(env!("CARGO_PKG_VERSION")))
        .await?;
    properties
        .set(
            "lastStartup",
            serde_json::Value::from(chrono::Utc::now().timestamp_millis()),
        )
        .await?;

    credentials.init()?;
    let _credential_watch = credentials.spawn_watch();

    let notif_log = notif_log::NotificationLog::new(data_dir.notification_log_file(), config.clone());
    let cache = cache::AssetCache::new(
        data_dir.cache_manifest_file(),
        data_dir.assets_dir(),
        config.clone(),
    )
    .map_err(|e| anyhow::anyhow!(e))?;

    let default_icon = cli.www_dir.join("favicon.png");
    let dispatcher = dispatch::Dispatcher::new(
        dispatch::native_backend(),
        config.clone(),
        default_icon.exists().then_some(default_icon),
    );

    update::spawn_update_checker(config.clone(), properties.clone(), dispatcher.clone());

    let state = server::AppState {
        config: config.clone(),
        credentials,
        properties,
        notif_log,
        cache,
        dispatcher,
    };
    let app = server::build_router(state, &cli.www_dir);

    let port = config.snapshot().server.port;
    let listener = match tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await
    {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Port {} is already in use by another process - stop that process or change server.port in {}",
                port,
                cli.config.display()
            );
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("HTTP server is listening at http://127.0.0.1:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
