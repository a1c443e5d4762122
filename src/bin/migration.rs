use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use sklad_api::{
    entities::user::Role,
    migrator::Migrator,
    services::users::{CreateUserInput, UserService},
};

#[derive(Parser)]
#[command(
    name = "sklad-migrate",
    about = "Schema migrations and first-run setup for sklad-api",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "APP__DATABASE_URL",
        default_value = "sqlite://sklad.db?mode=rwc",
        help = "Database connection URL"
    )]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Roll back the most recent migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// List applied and pending migrations
    Status,
    /// Drop every table and re-apply all migrations
    Fresh,
    /// Create an administrator account
    CreateAdmin(CreateAdminArgs),
}

#[derive(Args)]
struct CreateAdminArgs {
    #[arg(long, default_value = "admin")]
    username: String,
    #[arg(long, env = "SKLAD_ADMIN_PASSWORD")]
    password: String,
    #[arg(long, default_value = "Administrator")]
    full_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let db = connect(&cli.database_url).await?;

    match cli.command {
        Command::Up => {
            Migrator::up(&db, None).await.context("migration failed")?;
            info!("All migrations applied");
        }
        Command::Down { steps } => {
            Migrator::down(&db, Some(steps))
                .await
                .context("rollback failed")?;
            info!(steps, "Migrations rolled back");
        }
        Command::Status => print_status(&db).await?,
        Command::Fresh => {
            Migrator::fresh(&db).await.context("fresh migration failed")?;
            info!("Schema recreated from scratch");
        }
        Command::CreateAdmin(args) => create_admin(db, args).await?,
    }

    Ok(())
}

async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    info!("Connecting to database");

    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(2)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    Database::connect(options)
        .await
        .context("failed to connect to database")
}

async fn print_status(db: &DatabaseConnection) -> Result<()> {
    let applied = Migrator::get_applied_migrations(db).await?;
    let pending = Migrator::get_pending_migrations(db).await?;

    for migration in &applied {
        println!("applied  {}", migration.name());
    }
    for migration in &pending {
        println!("pending  {}", migration.name());
    }
    println!("{} applied, {} pending", applied.len(), pending.len());
    Ok(())
}

async fn create_admin(db: DatabaseConnection, args: CreateAdminArgs) -> Result<()> {
    let users = UserService::new(Arc::new(db));
    let admin = users
        .register(CreateUserInput {
            username: args.username,
            password: args.password,
            full_name: args.full_name,
            role: Some(Role::Admin),
            hourly_rate: None,
        })
        .await
        .context("failed to create administrator")?;

    println!("Administrator '{}' created (id {})", admin.username, admin.id);
    Ok(())
}
