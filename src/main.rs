//! infin8-admin - Admin Bootstrap Entry Point
//!
//! Ensures the admin account exists, then exits.

use infin8_admin::{accounts::SqliteAccountStore, config::Config, ensure_admin};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Sequential run-to-completion; a single-threaded runtime is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "infin8_admin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: secret_store={}, accounts_db={}",
        config
            .secret_store
            .address
            .as_deref()
            .unwrap_or("(not configured)"),
        config.accounts_db_path.display()
    );

    let accounts =
        SqliteAccountStore::open(&config.accounts_db_path, &config.accounts_profile_columns)
            .await?;

    let report = ensure_admin(&config, &accounts).await;
    if report.succeeded() {
        info!("Admin bootstrap complete for '{}'", report.username);
    } else {
        warn!(
            "Admin bootstrap for '{}' did not complete; see errors above",
            report.username
        );
    }

    Ok(())
}
