//! salond - real-time social messaging session daemon.

use salond::config::Config;
use salond::db::Database;
use salond::network::Gateway;
use salond::services::{LocalAccounts, NoopStorage};
use salond::state::SessionState;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(server = %config.server.name, "Starting salond");

    // SECURITY: Refuse to start with the default/weak token secret.
    // Every bearer credential is signed with it; a predictable secret
    // lets anyone mint identities.
    if salond::is_insecure_token_secret(&config.auth.token_secret) {
        if std::env::var("SALOND_ALLOW_INSECURE_TOKEN").is_ok() {
            tracing::warn!(
                "⚠️  INSECURE: Running with weak token_secret (allowed via SALOND_ALLOW_INSECURE_TOKEN)"
            );
        } else {
            error!("FATAL: Insecure token_secret detected!");
            error!("  The token_secret signs every bearer credential.");
            error!("  A weak or default secret lets anyone forge identities.");
            error!("");
            error!("  To fix, set a strong secret in config.toml:");
            error!("    [auth]");
            error!("    token_secret = \"<random-32-char-string>\"");
            error!("");
            error!("  Generate a secure secret with:");
            error!("    openssl rand -hex 32");
            error!("");
            error!("  For testing only, set SALOND_ALLOW_INSECURE_TOKEN=1 to bypass this check.");
            return Err(anyhow::anyhow!(
                "Refusing to start with insecure token_secret. See error messages above."
            ));
        }
    }

    salond::metrics::init();

    let db_path = config.database.as_ref().map(|d| d.path.as_str()).unwrap_or("salond.db");
    let db = Database::new(db_path).await?;

    if let Some(port) = config.server.metrics_port.filter(|p| *p != 0) {
        tokio::spawn(salond::http::run_http_server(port));
    }

    let accounts = LocalAccounts::new(db.clone());
    let state = SessionState::new(Arc::new(config), db, accounts, Arc::new(NoopStorage));
    let gateway = Gateway::new(state);

    tokio::select! {
        result = gateway.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
