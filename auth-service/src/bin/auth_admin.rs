//! Administrator bootstrap: `auth-admin create-admin <login> <password>` and
//! `auth-admin delete-admin <login>`. Reads the same environment as the service.

use auth_service::{
    config::AuthConfig,
    db,
    services::{AdminService, Database, RedisService, RevocationEngine},
    utils::{Password, PasswordService},
};
use clap::{Parser, Subcommand};
use service_core::observability::logging::init_tracing;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "auth-admin", version, about = "Manage administrator accounts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a user holding the `admin` permission
    CreateAdmin {
        login: String,
        #[arg(env = "AUTH_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Remove an administrator and revoke its sessions
    DeleteAdmin { login: String },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!(error = %e, "auth-admin failed");
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let config = AuthConfig::from_env()?;

    init_tracing("auth-admin", &config.log_level, None);

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(Database::new(pool));
    let revocation = RevocationEngine::new(
        Arc::new(RedisService::new(&config.redis).await?),
        config.authorization.revocation_policy,
        config.jwt.access_expires_seconds,
        config.jwt.refresh_expires_seconds,
    );
    let admin = AdminService::new(store, revocation, PasswordService::new(&config.password)?);

    match cli.command {
        Commands::CreateAdmin { login, password } => {
            let user = admin.create_admin(&login, Password::new(password)).await?;
            println!("Created administrator '{}' ({})", user.login, user.id);
        }
        Commands::DeleteAdmin { login } => {
            let removal = admin.delete_admin(&login).await?;
            println!("Deleted administrator '{}' ({})", removal.user.login, removal.user.id);
            if removal.permission_deleted {
                println!("No administrators remain; 'admin' permission removed");
            }
        }
    }

    Ok(())
}
